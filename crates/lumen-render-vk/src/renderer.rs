// SPDX-License-Identifier: CEPL-1.0
//! Frame orchestration.
//!
//! ```text
//! IDLE --begin_frame--> RECORDING --end_render_pass, end_frame--> SUBMITTED --> IDLE
//! ```
//!
//! Command buffers are per presentable image and reused every time that
//! image comes around; synchronization objects are per frame slot and live
//! in the chain. Only one frame may be open at a time.

use ash::vk;
use bitflags::bitflags;
use lumen_render::{RenderSize, WindowSurface};
use tracing::{debug, info, warn};

use crate::chain::{Acquired, ChainStatus, PresentableChain};
use crate::config::RendererConfig;
use crate::device::RenderPassBegin;
use crate::error::{PresentError, Result};
use crate::resources::Device;

bitflags! {
    /// Why a chain rebuild was triggered.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RebuildReasons: u8 {
        const OUT_OF_DATE = 1 << 0;
        const SUBOPTIMAL = 1 << 1;
        const WINDOW_RESIZED = 1 << 2;
    }
}

impl RebuildReasons {
    fn after_present(status: ChainStatus, window_resized: bool) -> Self {
        let mut reasons = match status {
            ChainStatus::Optimal => RebuildReasons::empty(),
            ChainStatus::Suboptimal => RebuildReasons::SUBOPTIMAL,
            ChainStatus::Stale => RebuildReasons::OUT_OF_DATE,
        };
        if window_resized {
            reasons |= RebuildReasons::WINDOW_RESIZED;
        }
        reasons
    }
}

/// What a render-pass client gets for the frame being recorded.
#[derive(Clone, Copy, Debug)]
pub struct FrameContext {
    /// Recording, with the chain's render pass active.
    pub command_buffer: vk::CommandBuffer,
    pub image_index: u32,
    /// Frame slot, for resources double-buffered alongside the frames.
    pub frame_index: usize,
    /// Count of frames submitted before this one.
    pub frame_number: u64,
    pub extent: vk::Extent2D,
    pub render_pass: vk::RenderPass,
}

/// Anything that records draw work inside the chain's render pass.
pub trait RenderPassClient {
    fn record(&mut self, frame: &FrameContext);
}

pub struct Renderer {
    command_buffers: Vec<vk::CommandBuffer>,
    chain: PresentableChain,
    device: Device,
    config: RendererConfig,

    current_image: u32,
    current_slot: usize,
    frame_started: bool,
    frame_number: u64,
    rebuild_count: u64,
}

impl Renderer {
    /// Builds the first chain (waiting out a minimized window) and one
    /// command buffer per presentable image.
    pub fn new(
        device: Device,
        window: &mut dyn WindowSurface,
        config: RendererConfig,
    ) -> Result<Self> {
        let size = wait_for_drawable(window);
        let chain = PresentableChain::new(
            device.clone(),
            to_extent(size),
            &config.chain,
            config.fence_timeout,
            None,
        )?;
        let command_buffers = device
            .allocate_command_buffers(chain.image_count() as u32)
            .map_err(PresentError::creating("command buffers"))?;

        Ok(Self {
            command_buffers,
            chain,
            device,
            config,
            current_image: 0,
            current_slot: 0,
            frame_started: false,
            frame_number: 0,
            rebuild_count: 0,
        })
    }

    /// Acquires the next image and starts recording into its command buffer.
    ///
    /// `Ok(None)` means the chain was stale and has been rebuilt; skip this
    /// iteration.
    pub fn begin_frame(&mut self, window: &mut dyn WindowSurface) -> Result<Option<vk::CommandBuffer>> {
        assert!(
            !self.frame_started,
            "can't call begin_frame while a frame is already in progress"
        );

        let index = match self.chain.acquire_next_image()? {
            Acquired::Stale => {
                self.rebuild_chain(window, RebuildReasons::OUT_OF_DATE)?;
                return Ok(None);
            }
            Acquired::Image { index, status } => {
                if status == ChainStatus::Suboptimal {
                    debug!("suboptimal acquire; rebuilding after this frame's present");
                }
                index
            }
        };

        let cmd = self.command_buffers[index as usize];
        self.device
            .begin_command_buffer(cmd)
            .map_err(PresentError::creating("command buffer recording"))?;

        self.current_image = index;
        self.current_slot = self.chain.current_slot();
        self.frame_started = true;
        Ok(Some(cmd))
    }

    /// Begins the chain's render pass on the current image's framebuffer and
    /// sets a full-extent dynamic viewport and scissor.
    pub fn begin_render_pass(&mut self, cmd: vk::CommandBuffer) {
        self.assert_current(cmd, "begin_render_pass");
        let extent = self.chain.extent();
        let begin = RenderPassBegin {
            render_pass: self.chain.render_pass(),
            framebuffer: self.chain.framebuffer(self.current_image as usize),
            extent,
            clear_color: self.config.clear_color,
            clear_depth: self.config.clear_depth,
            clear_stencil: self.config.clear_stencil,
        };
        self.device.cmd_begin_render_pass(cmd, &begin);
        self.device.cmd_set_viewport_scissor(cmd, extent);
    }

    pub fn end_render_pass(&mut self, cmd: vk::CommandBuffer) {
        self.assert_current(cmd, "end_render_pass");
        self.device.cmd_end_render_pass(cmd);
    }

    /// Ends recording, submits and presents. A stale or suboptimal present,
    /// or a window resize, rebuilds the chain after the submission, so the
    /// frame just recorded is never discarded.
    pub fn end_frame(&mut self, window: &mut dyn WindowSurface) -> Result<()> {
        assert!(
            self.frame_started,
            "can't call end_frame while no frame is in progress"
        );
        let cmd = self.command_buffers[self.current_image as usize];
        self.device
            .end_command_buffer(cmd)
            .map_err(PresentError::creating("command buffer recording"))?;
        self.frame_started = false;

        let status = self.chain.submit(cmd, self.current_image)?;
        self.frame_number += 1;

        let reasons = RebuildReasons::after_present(status, window.was_resized());
        if !reasons.is_empty() {
            self.rebuild_chain(window, reasons)?;
        }
        Ok(())
    }

    /// One full iteration: begin frame, begin render pass, every client in
    /// order, end render pass, end frame. Returns whether a frame was
    /// submitted.
    pub fn draw_frame(
        &mut self,
        window: &mut dyn WindowSurface,
        clients: &mut [&mut dyn RenderPassClient],
    ) -> Result<bool> {
        let Some(cmd) = self.begin_frame(window)? else {
            return Ok(false);
        };
        self.begin_render_pass(cmd);

        let frame = FrameContext {
            command_buffer: cmd,
            image_index: self.current_image,
            frame_index: self.current_slot,
            frame_number: self.frame_number,
            extent: self.chain.extent(),
            render_pass: self.chain.render_pass(),
        };
        for client in clients.iter_mut() {
            client.record(&frame);
        }

        self.end_render_pass(cmd);
        self.end_frame(window)?;
        Ok(true)
    }

    /// Blocks until every submitted frame has retired.
    pub fn wait_idle(&self) -> Result<()> {
        self.device
            .wait_idle()
            .map_err(|r| PresentError::runtime("wait idle", r))
    }

    fn rebuild_chain(&mut self, window: &mut dyn WindowSurface, reasons: RebuildReasons) -> Result<()> {
        let size = wait_for_drawable(window);
        self.wait_idle()?;

        let next = PresentableChain::new(
            self.device.clone(),
            to_extent(size),
            &self.config.chain,
            self.config.fence_timeout,
            Some(self.chain.replace_token()),
        )?;
        if !self.chain.compare_format_compatibility(&next) {
            return Err(PresentError::FormatMismatch {
                old_color: self.chain.color_format(),
                new_color: next.color_format(),
                old_depth: self.chain.depth_format(),
                new_depth: next.depth_format(),
            });
        }
        let old_image_count = self.chain.image_count();
        self.chain = next;

        if self.command_buffers.len() != self.chain.image_count() {
            debug!(
                "image count changed {} -> {}; reallocating command buffers",
                old_image_count,
                self.chain.image_count()
            );
            self.device.free_command_buffers(&self.command_buffers);
            self.command_buffers.clear();
            self.command_buffers = self
                .device
                .allocate_command_buffers(self.chain.image_count() as u32)
                .map_err(PresentError::creating("command buffers"))?;
        }

        self.rebuild_count += 1;
        info!(
            "chain rebuilt ({:?}) -> {}x{}, {} images",
            reasons,
            self.chain.extent().width,
            self.chain.extent().height,
            self.chain.image_count()
        );
        Ok(())
    }

    fn assert_current(&self, cmd: vk::CommandBuffer, op: &str) {
        assert!(
            self.frame_started,
            "can't call {op} while no frame is in progress"
        );
        assert!(
            cmd == self.command_buffers[self.current_image as usize],
            "can't call {op} on a command buffer from a different frame"
        );
    }

    #[inline]
    pub fn is_frame_in_progress(&self) -> bool {
        self.frame_started
    }

    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        assert!(
            self.frame_started,
            "cannot get command buffer when frame is not in progress"
        );
        self.command_buffers[self.current_image as usize]
    }

    /// Frame slot of the open frame, in `0..MAX_FRAMES_IN_FLIGHT`.
    pub fn frame_index(&self) -> usize {
        assert!(
            self.frame_started,
            "cannot get frame index when frame is not in progress"
        );
        self.current_slot
    }

    pub fn image_index(&self) -> u32 {
        assert!(
            self.frame_started,
            "cannot get image index when frame is not in progress"
        );
        self.current_image
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.chain.render_pass()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.chain.extent()
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.chain.extent_aspect_ratio()
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.chain.image_count()
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.chain.color_format()
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.chain.depth_format()
    }

    #[inline]
    pub fn chain(&self) -> &PresentableChain {
        &self.chain
    }

    /// Frames submitted so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Chain rebuilds so far, not counting the initial build.
    #[inline]
    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            warn!("wait idle on renderer drop: {e}");
        }
        self.device.free_command_buffers(&self.command_buffers);
    }
}

/// Current window extent, blocking on platform events while it is zero.
///
/// Clears the resize flag once the extent is known; any resize that happened
/// during the wait is already reflected in the returned size.
fn wait_for_drawable(window: &mut dyn WindowSurface) -> RenderSize {
    let mut size = window.extent();
    if size.is_zero() {
        warn!("window extent is {}x{}; waiting for it to be restored", size.width, size.height);
    }
    while size.is_zero() {
        window.wait_events();
        size = window.extent();
    }
    window.reset_resized_flag();
    size
}

fn to_extent(size: RenderSize) -> vk::Extent2D {
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}
