// SPDX-License-Identifier: CEPL-1.0
//! A scripted stand-in for the GPU.
//!
//! The queue is in order and never makes progress on its own: a submission
//! completes only when a fence covering it is waited on, or on `wait_idle`.
//! That makes every missing wait visible as a recorded violation instead of
//! a race.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use ash::prelude::VkResult;
use lumen_render::{RenderSize, WindowSurface};
use lumen_render_vk::vk::{self, Handle};
use lumen_render_vk::{
    ChainConfig, Device, DeviceContext, PresentModePreference, RenderPassBegin, RenderPassDesc,
    RendererConfig, Submission, SurfaceSupport, SwapchainDesc,
};

/// Scripted result of the nth acquire or present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Suboptimal,
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    CreateSwapchain {
        swapchain: vk::SwapchainKHR,
        old: vk::SwapchainKHR,
        extent: vk::Extent2D,
    },
    Acquire {
        swapchain: vk::SwapchainKHR,
        index: Option<u32>,
    },
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    Submit {
        cmd: vk::CommandBuffer,
        fence: vk::Fence,
    },
    Present {
        swapchain: vk::SwapchainKHR,
        index: u32,
    },
    BeginRenderPass {
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    },
    WaitIdle,
}

struct SubmitRecord {
    cmd: vk::CommandBuffer,
    fence: vk::Fence,
    done: bool,
}

struct State {
    next_handle: u64,
    live: HashMap<u64, &'static str>,

    formats: Vec<vk::SurfaceFormatKHR>,
    present_modes: Vec<vk::PresentModeKHR>,
    depth_supported: Vec<vk::Format>,
    capabilities: vk::SurfaceCapabilitiesKHR,

    swapchain_images: HashMap<vk::SwapchainKHR, Vec<vk::Image>>,
    next_image: HashMap<vk::SwapchainKHR, u32>,
    framebuffers: Vec<(vk::Framebuffer, Vec<vk::ImageView>)>,

    acquire_calls: usize,
    present_calls: usize,
    acquire_script: HashMap<usize, Outcome>,
    acquire_indices: VecDeque<u32>,
    present_script: HashMap<usize, Outcome>,

    fences_signaled: HashMap<vk::Fence, bool>,
    semaphores_signaled: HashSet<vk::Semaphore>,
    recording: HashSet<vk::CommandBuffer>,
    submissions: Vec<SubmitRecord>,

    events: Vec<Event>,
    violations: Vec<String>,
}

impl State {
    fn handle(&mut self, kind: &'static str) -> u64 {
        let raw = self.next_handle;
        self.next_handle += 1;
        self.live.insert(raw, kind);
        raw
    }

    fn release(&mut self, raw: u64, kind: &'static str) {
        match self.live.remove(&raw) {
            Some(k) if k == kind => {}
            Some(k) => self.violations.push(format!("destroyed {k} {raw:#x} as {kind}")),
            None => self.violations.push(format!("destroyed unknown {kind} {raw:#x}")),
        }
    }

    fn cmd_pending(&self, cmd: vk::CommandBuffer) -> bool {
        self.submissions.iter().any(|s| !s.done && s.cmd == cmd)
    }

    fn fence_pending(&self, fence: vk::Fence) -> bool {
        self.submissions.iter().any(|s| !s.done && s.fence == fence)
    }

    fn complete_through(&mut self, last: usize) {
        for s in self.submissions.iter_mut().take(last + 1) {
            if !s.done {
                s.done = true;
                self.fences_signaled.insert(s.fence, true);
            }
        }
    }
}

pub struct FakeDevice {
    state: Mutex<State>,
}

impl FakeDevice {
    /// B8G8R8A8_SRGB surface, MAILBOX and FIFO, D32_SFLOAT depth, three
    /// images, extent chosen by the window.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_handle: 0x1000,
                live: HashMap::new(),
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                depth_supported: vec![vk::Format::D32_SFLOAT],
                capabilities: vk::SurfaceCapabilitiesKHR {
                    min_image_count: 2,
                    max_image_count: 3,
                    current_extent: vk::Extent2D {
                        width: u32::MAX,
                        height: u32::MAX,
                    },
                    min_image_extent: vk::Extent2D {
                        width: 1,
                        height: 1,
                    },
                    max_image_extent: vk::Extent2D {
                        width: 4096,
                        height: 4096,
                    },
                    max_image_array_layers: 1,
                    supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                    current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                    ..Default::default()
                },
                swapchain_images: HashMap::new(),
                next_image: HashMap::new(),
                framebuffers: Vec::new(),
                acquire_calls: 0,
                present_calls: 0,
                acquire_script: HashMap::new(),
                acquire_indices: VecDeque::new(),
                present_script: HashMap::new(),
                fences_signaled: HashMap::new(),
                semaphores_signaled: HashSet::new(),
                recording: HashSet::new(),
                submissions: Vec::new(),
                events: Vec::new(),
                violations: Vec::new(),
            }),
        }
    }

    pub fn shared() -> (Arc<FakeDevice>, Device) {
        let fake = Arc::new(FakeDevice::new());
        let device: Device = fake.clone();
        (fake, device)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// The `n`th acquire (1-based, counted across chains) reports `outcome`.
    pub fn script_acquire(&self, n: usize, outcome: Outcome) {
        self.state().acquire_script.insert(n, outcome);
    }

    /// Image indices handed out by successful acquires, in order, before
    /// falling back to round-robin. Lets one image come back under a
    /// different slot while its previous frame is still queued.
    pub fn script_acquire_indices(&self, indices: &[u32]) {
        self.state().acquire_indices.extend(indices.iter().copied());
    }

    /// The `n`th present (1-based, counted across chains) reports `outcome`.
    pub fn script_present(&self, n: usize, outcome: Outcome) {
        self.state().present_script.insert(n, outcome);
    }

    pub fn set_formats(&self, formats: Vec<vk::SurfaceFormatKHR>) {
        self.state().formats = formats;
    }

    pub fn set_present_modes(&self, modes: Vec<vk::PresentModeKHR>) {
        self.state().present_modes = modes;
    }

    pub fn set_depth_support(&self, formats: Vec<vk::Format>) {
        self.state().depth_supported = formats;
    }

    pub fn set_image_count_range(&self, min: u32, max: u32) {
        let mut s = self.state();
        s.capabilities.min_image_count = min;
        s.capabilities.max_image_count = max;
    }

    /// Pin the surface extent instead of letting the window decide.
    pub fn set_current_extent(&self, extent: vk::Extent2D) {
        self.state().capabilities.current_extent = extent;
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn violations(&self) -> Vec<String> {
        self.state().violations.clone()
    }

    pub fn live_handles(&self) -> usize {
        self.state().live.len()
    }

    pub fn live_of(&self, kind: &str) -> usize {
        self.state().live.values().filter(|k| **k == kind).count()
    }

    pub fn swapchains_created(&self) -> Vec<(vk::SwapchainKHR, vk::SwapchainKHR)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::CreateSwapchain { swapchain, old, .. } => Some((swapchain, old)),
                _ => None,
            })
            .collect()
    }

    pub fn submits(&self) -> usize {
        self.state().submissions.len()
    }

    pub fn framebuffer_attachments(&self) -> Vec<(vk::Framebuffer, Vec<vk::ImageView>)> {
        self.state().framebuffers.clone()
    }

    pub fn assert_clean(&self) {
        let v = self.violations();
        assert!(v.is_empty(), "protocol violations: {v:#?}");
    }
}

impl DeviceContext for FakeDevice {
    fn surface_support(&self) -> VkResult<SurfaceSupport> {
        let s = self.state();
        Ok(SurfaceSupport {
            capabilities: s.capabilities,
            formats: s.formats.clone(),
            present_modes: s.present_modes.clone(),
        })
    }

    fn supports_depth_attachment(&self, format: vk::Format) -> bool {
        self.state().depth_supported.contains(&format)
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old: vk::SwapchainKHR,
    ) -> VkResult<vk::SwapchainKHR> {
        let mut s = self.state();
        if old != vk::SwapchainKHR::null() && !s.live.contains_key(&old.as_raw()) {
            s.violations.push(format!("old swapchain {old:?} already destroyed"));
        }
        let swapchain = vk::SwapchainKHR::from_raw(s.handle("swapchain"));
        let images = (0..desc.min_image_count)
            .map(|_| {
                // Owned by the swapchain, not tracked as live handles.
                let raw = s.next_handle;
                s.next_handle += 1;
                vk::Image::from_raw(raw)
            })
            .collect();
        s.swapchain_images.insert(swapchain, images);
        s.events.push(Event::CreateSwapchain {
            swapchain,
            old,
            extent: desc.extent,
        });
        Ok(swapchain)
    }

    fn swapchain_images(
        &self,
        swapchain: vk::SwapchainKHR,
    ) -> VkResult<Vec<vk::Image>> {
        self.state()
            .swapchain_images
            .get(&swapchain)
            .cloned()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut s = self.state();
        s.swapchain_images.remove(&swapchain);
        s.release(swapchain.as_raw(), "swapchain");
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView> {
        Ok(vk::ImageView::from_raw(self.state().handle("image view")))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state().release(view.as_raw(), "image view");
    }

    fn create_depth_image(
        &self,
        _extent: vk::Extent2D,
        _format: vk::Format,
    ) -> VkResult<(vk::Image, vk::DeviceMemory)> {
        let mut s = self.state();
        let image = vk::Image::from_raw(s.handle("image"));
        let memory = vk::DeviceMemory::from_raw(s.handle("memory"));
        Ok((image, memory))
    }

    fn destroy_image(&self, image: vk::Image, memory: vk::DeviceMemory) {
        let mut s = self.state();
        s.release(image.as_raw(), "image");
        s.release(memory.as_raw(), "memory");
    }

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> VkResult<vk::RenderPass> {
        Ok(vk::RenderPass::from_raw(self.state().handle("render pass")))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state().release(render_pass.as_raw(), "render pass");
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        _extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let mut s = self.state();
        let fb = vk::Framebuffer::from_raw(s.handle("framebuffer"));
        s.framebuffers.push((fb, attachments.to_vec()));
        Ok(fb)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state().release(framebuffer.as_raw(), "framebuffer");
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.state().handle("semaphore")))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut s = self.state();
        s.semaphores_signaled.remove(&semaphore);
        s.release(semaphore.as_raw(), "semaphore");
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut s = self.state();
        let fence = vk::Fence::from_raw(s.handle("fence"));
        s.fences_signaled.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut s = self.state();
        if s.fence_pending(fence) {
            s.violations.push(format!("destroyed fence {fence:?} with work pending"));
        }
        s.fences_signaled.remove(&fence);
        s.release(fence.as_raw(), "fence");
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> VkResult<()> {
        let mut s = self.state();
        s.events.push(Event::WaitFence(fence));
        if s.fences_signaled.get(&fence).copied().unwrap_or(false) {
            return Ok(());
        }
        match s.submissions.iter().rposition(|r| !r.done && r.fence == fence) {
            Some(last) => {
                s.complete_through(last);
                Ok(())
            }
            None => {
                s.violations
                    .push(format!("waited on reset fence {fence:?} that was never submitted"));
                Err(vk::Result::TIMEOUT)
            }
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut s = self.state();
        if s.fence_pending(fence) {
            s.violations.push(format!("reset fence {fence:?} with work pending"));
        }
        s.events.push(Event::ResetFence(fence));
        s.fences_signaled.insert(fence, false);
        Ok(())
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut s = self.state();
        s.acquire_calls += 1;
        let call = s.acquire_calls;
        let outcome = s.acquire_script.get(&call).copied();
        if outcome == Some(Outcome::OutOfDate) {
            s.events.push(Event::Acquire {
                swapchain,
                index: None,
            });
            return Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        }
        if !s.semaphores_signaled.insert(signal) {
            s.violations
                .push(format!("acquire signaled semaphore {signal:?} that was already signaled"));
        }
        let count = s.swapchain_images.get(&swapchain).map_or(0, Vec::len) as u32;
        if count == 0 {
            s.violations.push(format!("acquire on unknown swapchain {swapchain:?}"));
            return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        }
        let scripted = s.acquire_indices.pop_front();
        let index = match scripted {
            Some(index) if index < count => index,
            Some(index) => {
                s.violations
                    .push(format!("scripted image {index} out of range for {count} images"));
                return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
            }
            None => {
                let next = s.next_image.entry(swapchain).or_insert(0);
                let index = *next % count;
                *next += 1;
                index
            }
        };
        s.events.push(Event::Acquire {
            swapchain,
            index: Some(index),
        });
        Ok((index, outcome == Some(Outcome::Suboptimal)))
    }

    fn queue_submit(&self, submission: &Submission) -> VkResult<()> {
        let mut s = self.state();
        let cmd = submission.command_buffer;
        if s.cmd_pending(cmd) {
            s.violations.push(format!("resubmitted pending command buffer {cmd:?}"));
        }
        if s.recording.contains(&cmd) {
            s.violations.push(format!("submitted command buffer {cmd:?} still recording"));
        }
        if s.fences_signaled.get(&submission.fence).copied().unwrap_or(false) {
            s.violations
                .push(format!("submitted with signaled fence {:?}", submission.fence));
        }
        if !s.semaphores_signaled.remove(&submission.wait_semaphore) {
            s.violations.push(format!(
                "submit waits on unsignaled semaphore {:?}",
                submission.wait_semaphore
            ));
        }
        if !s.semaphores_signaled.insert(submission.signal_semaphore) {
            s.violations.push(format!(
                "submit signals already signaled semaphore {:?}",
                submission.signal_semaphore
            ));
        }
        s.submissions.push(SubmitRecord {
            cmd,
            fence: submission.fence,
            done: false,
        });
        s.events.push(Event::Submit {
            cmd,
            fence: submission.fence,
        });
        Ok(())
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut s = self.state();
        s.present_calls += 1;
        let call = s.present_calls;
        if !s.semaphores_signaled.remove(&wait) {
            s.violations
                .push(format!("present waits on unsignaled semaphore {wait:?}"));
        }
        s.events.push(Event::Present {
            swapchain,
            index: image_index,
        });
        match s.present_script.get(&call) {
            Some(Outcome::OutOfDate) => Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
            Some(Outcome::Suboptimal) => Ok(true),
            None => Ok(false),
        }
    }

    fn wait_idle(&self) -> VkResult<()> {
        let mut s = self.state();
        s.events.push(Event::WaitIdle);
        if !s.submissions.is_empty() {
            let last = s.submissions.len() - 1;
            s.complete_through(last);
        }
        Ok(())
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut s = self.state();
        Ok((0..count)
            .map(|_| vk::CommandBuffer::from_raw(s.handle("command buffer")))
            .collect())
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        let mut s = self.state();
        for &cmd in buffers {
            if s.cmd_pending(cmd) {
                s.violations.push(format!("freed pending command buffer {cmd:?}"));
            }
            s.release(cmd.as_raw(), "command buffer");
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut s = self.state();
        if s.cmd_pending(cmd) {
            s.violations.push(format!("re-recorded pending command buffer {cmd:?}"));
        }
        if !s.recording.insert(cmd) {
            s.violations.push(format!("began command buffer {cmd:?} twice"));
        }
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut s = self.state();
        if !s.recording.remove(&cmd) {
            s.violations.push(format!("ended command buffer {cmd:?} not recording"));
        }
        Ok(())
    }

    fn cmd_begin_render_pass(&self, _cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        self.state().events.push(Event::BeginRenderPass {
            framebuffer: begin.framebuffer,
            extent: begin.extent,
        });
    }

    fn cmd_set_viewport_scissor(&self, _cmd: vk::CommandBuffer, _extent: vk::Extent2D) {}

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {}
}

/// Window whose extent changes only when events are pumped.
pub struct FakeWindow {
    pub size: RenderSize,
    pub resized: bool,
    pub queued: VecDeque<RenderSize>,
    pub waits: usize,
}

impl FakeWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: RenderSize::new(width, height),
            resized: false,
            queued: VecDeque::new(),
            waits: 0,
        }
    }

    /// Resize as the platform would report it: new extent plus the flag.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = RenderSize::new(width, height);
        self.resized = true;
    }

    /// Extents delivered one per `wait_events` call.
    pub fn queue_sizes(&mut self, sizes: &[(u32, u32)]) {
        self.queued
            .extend(sizes.iter().map(|&(w, h)| RenderSize::new(w, h)));
    }
}

impl WindowSurface for FakeWindow {
    fn extent(&self) -> RenderSize {
        self.size
    }

    fn was_resized(&self) -> bool {
        self.resized
    }

    fn reset_resized_flag(&mut self) {
        self.resized = false;
    }

    fn wait_events(&mut self) {
        self.waits += 1;
        match self.queued.pop_front() {
            Some(size) => {
                self.size = size;
                self.resized = true;
            }
            None => panic!("wait_events with no queued events would block forever"),
        }
    }
}

pub fn test_config() -> RendererConfig {
    RendererConfig {
        fence_timeout: 1_000_000_000,
        chain: ChainConfig {
            present_mode: PresentModePreference::Mailbox,
            ..ChainConfig::default()
        },
        ..RendererConfig::default()
    }
}
