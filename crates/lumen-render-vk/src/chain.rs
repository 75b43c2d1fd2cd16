// SPDX-License-Identifier: CEPL-1.0
//! The presentable chain: swapchain images, their color and depth views, one
//! render pass and one framebuffer per image, plus the frame-slot ring used
//! to acquire and present them.
//!
//! A chain never changes extent or format. Resizing means building a new
//! chain from a [`ReplaceToken`] of the old one and dropping the old one.

use std::marker::PhantomData;

use ash::prelude::VkResult;
use ash::vk;
use lumen_render::RenderSize;
use tracing::{debug, info, warn};

use crate::config::{ChainConfig, PresentModePreference};
use crate::device::{RenderPassDesc, Submission, SurfaceSupport, SwapchainDesc};
use crate::error::{PresentError, Result};
use crate::resources::{DepthImage, Device, Framebuffer, ImageView, RenderPass, Swapchain};
use crate::sync::{FrameSync, ImagesInFlight};
use crate::MAX_FRAMES_IN_FLIGHT;

/// How well the chain still matches its surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainStatus {
    Optimal,
    /// Usable this frame, should be rebuilt soon.
    Suboptimal,
    /// Must be rebuilt before anything else is presented.
    Stale,
}

/// Result of asking the platform for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    Image { index: u32, status: ChainStatus },
    /// No image index is valid; rebuild and skip this iteration.
    Stale,
}

/// One-shot handoff from a chain to its successor.
///
/// Borrowing the old chain keeps it (and its swapchain) alive while the new
/// one is created against it. Only the swapchain handle and the next frame
/// slot carry over.
pub struct ReplaceToken<'a> {
    swapchain: vk::SwapchainKHR,
    next_slot: usize,
    _old: PhantomData<&'a PresentableChain>,
}

pub struct PresentableChain {
    // Field order is drop order: per-image resources go before the render
    // pass and swapchain they were built from.
    sync: FrameSync,
    images_in_flight: ImagesInFlight,
    framebuffers: Vec<Framebuffer>,
    depth_images: Vec<DepthImage>,
    color_views: Vec<ImageView>,
    render_pass: RenderPass,
    swapchain: Swapchain,
    images: Vec<vk::Image>,

    device: Device,
    surface_format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    current_slot: usize,
    fence_timeout: u64,
}

impl PresentableChain {
    /// Negotiates format, present mode, extent and image count against the
    /// surface and builds every per-image resource.
    ///
    /// `previous` hands over the predecessor's swapchain so the platform can
    /// recycle it, and its slot index so slots keep cycling without a restart;
    /// the caller drops the predecessor afterwards.
    pub fn new(
        device: Device,
        window_extent: vk::Extent2D,
        config: &ChainConfig,
        fence_timeout: u64,
        previous: Option<ReplaceToken<'_>>,
    ) -> Result<Self> {
        let support: SurfaceSupport = device
            .surface_support()
            .map_err(|r| PresentError::runtime("query surface support", r))?;
        let caps = support.capabilities;

        let surface_format = choose_surface_format(&support.formats, config.preferred_format)?;
        let present_mode = choose_present_mode(&support.present_modes, config.present_mode);
        let extent = extent_from_caps(&caps, window_extent);
        let min_image_count = image_count_from_caps(&caps);
        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        let desc = SwapchainDesc {
            min_image_count,
            surface_format,
            extent,
            present_mode,
            pre_transform,
        };
        let (old, first_slot) = previous.map_or((vk::SwapchainKHR::null(), 0), |t| {
            (t.swapchain, t.next_slot % MAX_FRAMES_IN_FLIGHT)
        });
        let swapchain = Swapchain::new(&device, &desc, old)?;
        let images = device
            .swapchain_images(swapchain.handle())
            .map_err(PresentError::creating("swapchain images"))?;

        let mut color_views = Vec::with_capacity(images.len());
        for &image in &images {
            color_views.push(ImageView::new(
                &device,
                image,
                surface_format.format,
                vk::ImageAspectFlags::COLOR,
            )?);
        }

        let depth_format = pick_depth_format(&*device, &config.depth_candidates)?;
        let render_pass = RenderPass::new(
            &device,
            &render_pass_desc(surface_format.format, depth_format),
        )?;

        let mut depth_images = Vec::with_capacity(images.len());
        for _ in &images {
            depth_images.push(DepthImage::new(&device, extent, depth_format)?);
        }

        let mut framebuffers = Vec::with_capacity(images.len());
        for (color, depth) in color_views.iter().zip(&depth_images) {
            framebuffers.push(Framebuffer::new(
                &device,
                render_pass.handle(),
                &[color.handle(), depth.view()],
                extent,
            )?);
        }

        let sync = FrameSync::new(&device, MAX_FRAMES_IN_FLIGHT)?;

        info!(
            "chain ready: {}x{}, color {:?} / {:?}, depth {:?}, present {:?}, images {} (min={} max={}), replaces_previous={}",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            depth_format,
            present_mode,
            images.len(),
            caps.min_image_count,
            caps.max_image_count,
            old != vk::SwapchainKHR::null(),
        );

        Ok(Self {
            sync,
            images_in_flight: ImagesInFlight::new(images.len()),
            framebuffers,
            depth_images,
            color_views,
            render_pass,
            swapchain,
            images,
            device,
            surface_format,
            depth_format,
            present_mode,
            extent,
            current_slot: first_slot,
            fence_timeout,
        })
    }

    /// Hands this chain's swapchain to a successor under construction.
    pub fn replace_token(&self) -> ReplaceToken<'_> {
        ReplaceToken {
            swapchain: self.swapchain.handle(),
            next_slot: self.current_slot,
            _old: PhantomData,
        }
    }

    /// Waits for the current slot to retire, then asks for the next image
    /// (signaling the slot's image-available semaphore).
    ///
    /// The returned image is also free of any older slot's work, so its
    /// command buffer may be re-recorded right away.
    pub fn acquire_next_image(&mut self) -> Result<Acquired> {
        let slot = self.current_slot;
        self.wait(self.sync.in_flight(slot), "wait for frame slot")?;

        let acquired = self.device.acquire_next_image(
            self.swapchain.handle(),
            self.fence_timeout,
            self.sync.image_available(slot),
        );
        let (index, suboptimal) = match acquired {
            Ok(pair) => pair,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("acquire: chain out of date (slot {slot})");
                return Ok(Acquired::Stale);
            }
            Err(e) => return Err(PresentError::runtime("acquire next image", e)),
        };

        self.wait_for_image(index)?;
        let status = if suboptimal {
            debug!("acquire: chain suboptimal (image {index})");
            ChainStatus::Suboptimal
        } else {
            ChainStatus::Optimal
        };
        Ok(Acquired::Image { index, status })
    }

    /// Submits `cmd` for `image_index` under the current slot, presents the
    /// image and advances the slot. Whatever slot last rendered to the image
    /// is waited on first.
    pub fn submit(&mut self, cmd: vk::CommandBuffer, image_index: u32) -> Result<ChainStatus> {
        let slot = self.current_slot;
        let fence = self.sync.in_flight(slot);
        if let Some(previous) = self.images_in_flight.claim(image_index as usize, fence) {
            self.wait(previous, "wait for image in flight")?;
        }
        self.device
            .reset_fence(fence)
            .map_err(|r| PresentError::runtime("reset frame fence", r))?;

        let submission = Submission {
            command_buffer: cmd,
            wait_semaphore: self.sync.image_available(slot),
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal_semaphore: self.sync.render_finished(slot),
            fence,
        };
        self.device
            .queue_submit(&submission)
            .map_err(|r| PresentError::runtime("queue submit", r))?;

        let presented = self.device.queue_present(
            self.swapchain.handle(),
            image_index,
            self.sync.render_finished(slot),
        );
        let status = present_status(presented)
            .map_err(|r| PresentError::runtime("queue present", r))?;
        if status != ChainStatus::Optimal {
            debug!("present: chain {status:?} (image {image_index})");
        }

        self.current_slot = (slot + 1) % self.sync.slot_count();
        Ok(status)
    }

    /// True when color and depth formats both match, i.e. anything built
    /// against one chain's render pass is valid for the other.
    pub fn compare_format_compatibility(&self, other: &PresentableChain) -> bool {
        self.surface_format.format == other.surface_format.format
            && self.depth_format == other.depth_format
    }

    fn wait_for_image(&self, image_index: u32) -> Result<()> {
        if let Some(fence) = self.images_in_flight.get(image_index as usize) {
            self.wait(fence, "wait for image in flight")?;
        }
        Ok(())
    }

    fn wait(&self, fence: vk::Fence, op: &'static str) -> Result<()> {
        self.device
            .wait_for_fence(fence, self.fence_timeout)
            .map_err(|r| PresentError::runtime(op, r))
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    #[inline]
    pub fn framebuffer(&self, image_index: usize) -> vk::Framebuffer {
        self.framebuffers[image_index].handle()
    }

    #[inline]
    pub fn image_view(&self, image_index: usize) -> vk::ImageView {
        self.color_views[image_index].handle()
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.surface_format.color_space
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn extent_aspect_ratio(&self) -> f32 {
        RenderSize::new(self.extent.width, self.extent.height).aspect_ratio()
    }

    /// Frame slot the next acquire/submit pair will use.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Slot fence currently recorded against `image_index`, if any.
    #[inline]
    pub fn image_fence(&self, image_index: usize) -> Option<vk::Fence> {
        self.images_in_flight.get(image_index)
    }

    #[inline]
    pub fn sync(&self) -> &FrameSync {
        &self.sync
    }
}

impl Drop for PresentableChain {
    fn drop(&mut self) {
        debug!(
            "dropping chain {}x{} ({} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

fn present_status(result: VkResult<bool>) -> std::result::Result<ChainStatus, vk::Result> {
    match result {
        Ok(false) => Ok(ChainStatus::Optimal),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(ChainStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(ChainStatus::Stale),
        Err(e) => Err(e),
    }
}

/// Color: cleared, stored, handed to presentation. Depth: cleared, discarded.
fn render_pass_desc(color: vk::Format, depth: vk::Format) -> RenderPassDesc {
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    RenderPassDesc {
        color: vk::AttachmentDescription {
            format: color,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        },
        depth: vk::AttachmentDescription {
            format: depth,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
        dependency: vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: stages,
            src_access_mask: vk::AccessFlags::empty(),
            dst_stage_mask: stages,
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ..Default::default()
        },
    }
}

/// Preferred pair if offered, otherwise the first one the surface lists.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> Result<vk::SurfaceFormatKHR> {
    let first = *formats.first().ok_or(PresentError::NoSurfaceFormats)?;
    // A lone UNDEFINED entry means the surface takes anything.
    if formats.len() == 1 && first.format == vk::Format::UNDEFINED {
        return Ok(preferred);
    }
    if let Some(&f) = formats
        .iter()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
    {
        return Ok(f);
    }
    warn!(
        "preferred surface format {:?}/{:?} unavailable, using {:?}/{:?}",
        preferred.format, preferred.color_space, first.format, first.color_space
    );
    Ok(first)
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preference: PresentModePreference,
) -> vk::PresentModeKHR {
    let order: &[vk::PresentModeKHR] = match preference {
        PresentModePreference::Mailbox => &[vk::PresentModeKHR::MAILBOX],
        PresentModePreference::Immediate => {
            &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]
        }
        PresentModePreference::Fifo => &[],
    };
    match order.iter().copied().find(|m| modes.contains(m)) {
        Some(mode) => mode,
        None => {
            if preference != PresentModePreference::Fifo {
                warn!("present mode {preference:?} unavailable, falling back to FIFO");
            }
            vk::PresentModeKHR::FIFO
        }
    }
}

/// The surface's current extent, unless it lets the client decide
/// (`u32::MAX`), in which case `want` clamped to the supported range.
pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded).
pub fn image_count_from_caps(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

pub fn pick_depth_format(
    device: &dyn crate::DeviceContext,
    candidates: &[vk::Format],
) -> Result<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&f| device.supports_depth_attachment(f))
        .ok_or_else(|| PresentError::NoDepthFormat(candidates.to_vec()))
}
