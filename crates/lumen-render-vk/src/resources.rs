// SPDX-License-Identifier: CEPL-1.0
//! Scope-bound GPU handles. Each wrapper destroys its handle on drop, so a
//! failure halfway through building a chain releases whatever was already
//! created.

use std::sync::Arc;

use ash::vk;

use crate::device::{DeviceContext, RenderPassDesc, SwapchainDesc};
use crate::error::{PresentError, Result};

/// Shared device handle; every wrapper destroys through it.
pub type Device = Arc<dyn DeviceContext>;

pub struct Semaphore {
    device: Device,
    handle: vk::Semaphore,
}

impl Semaphore {
    pub(crate) fn new(device: &Device) -> Result<Self> {
        let handle = device
            .create_semaphore()
            .map_err(PresentError::creating("semaphore"))?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.handle);
    }
}

pub struct Fence {
    device: Device,
    handle: vk::Fence,
}

impl Fence {
    /// Slot fences start signaled so the first wait on each slot returns at once.
    pub(crate) fn new(device: &Device, signaled: bool) -> Result<Self> {
        let handle = device
            .create_fence(signaled)
            .map_err(PresentError::creating("fence"))?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.handle);
    }
}

pub(crate) struct Swapchain {
    device: Device,
    handle: vk::SwapchainKHR,
}

impl Swapchain {
    pub(crate) fn new(device: &Device, desc: &SwapchainDesc, old: vk::SwapchainKHR) -> Result<Self> {
        let handle = device
            .create_swapchain(desc, old)
            .map_err(PresentError::creating("swapchain"))?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    #[inline]
    pub(crate) fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.device.destroy_swapchain(self.handle);
    }
}

pub(crate) struct ImageView {
    device: Device,
    handle: vk::ImageView,
}

impl ImageView {
    pub(crate) fn new(
        device: &Device,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self> {
        let handle = device
            .create_image_view(image, format, aspect)
            .map_err(PresentError::creating("image view"))?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    #[inline]
    pub(crate) fn handle(&self) -> vk::ImageView {
        self.handle
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.handle);
    }
}

/// Depth image, its memory and its view.
pub(crate) struct DepthImage {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
}

impl DepthImage {
    pub(crate) fn new(device: &Device, extent: vk::Extent2D, format: vk::Format) -> Result<Self> {
        let (image, memory) = device
            .create_depth_image(extent, format)
            .map_err(PresentError::creating("depth image"))?;
        // Attachment views only need the depth aspect, stencil formats included.
        let view = match device.create_image_view(image, format, vk::ImageAspectFlags::DEPTH) {
            Ok(view) => view,
            Err(result) => {
                device.destroy_image(image, memory);
                return Err(PresentError::ResourceCreation {
                    what: "depth image view",
                    result,
                });
            }
        };
        Ok(Self {
            device: device.clone(),
            image,
            memory,
            view,
        })
    }

    #[inline]
    pub(crate) fn view(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for DepthImage {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.view);
        self.device.destroy_image(self.image, self.memory);
    }
}

pub(crate) struct RenderPass {
    device: Device,
    handle: vk::RenderPass,
}

impl RenderPass {
    pub(crate) fn new(device: &Device, desc: &RenderPassDesc) -> Result<Self> {
        let handle = device
            .create_render_pass(desc)
            .map_err(PresentError::creating("render pass"))?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    #[inline]
    pub(crate) fn handle(&self) -> vk::RenderPass {
        self.handle
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.device.destroy_render_pass(self.handle);
    }
}

pub(crate) struct Framebuffer {
    device: Device,
    handle: vk::Framebuffer,
}

impl Framebuffer {
    pub(crate) fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let handle = device
            .create_framebuffer(render_pass, attachments, extent)
            .map_err(PresentError::creating("framebuffer"))?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    #[inline]
    pub(crate) fn handle(&self) -> vk::Framebuffer {
        self.handle
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.device.destroy_framebuffer(self.handle);
    }
}
