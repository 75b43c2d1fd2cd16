// SPDX-License-Identifier: CEPL-1.0
use lumen_core::Timer;
use lumen_render_vk::{vk, FrameContext, RenderPassClient};

/// Clears a breathing, color-cycling rectangle in the middle of the frame.
/// Needs no pipeline: `vkCmdClearAttachments` works inside the render pass.
pub struct PulsingRect {
    device: ash::Device,
    timer: Timer,
}

impl PulsingRect {
    pub fn new(device: ash::Device) -> Self {
        Self {
            device,
            timer: Timer::new(),
        }
    }
}

impl RenderPassClient for PulsingRect {
    fn record(&mut self, frame: &FrameContext) {
        let t = self.timer.elapsed_secs();
        let attachment = vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: pulse_color(t),
                },
            },
        };
        let rect = vk::ClearRect {
            rect: pulse_rect(frame.extent, t),
            base_array_layer: 0,
            layer_count: 1,
        };
        // SAFETY: the command buffer is recording inside the render pass
        // whose attachment 0 is color, and the rect lies within its extent.
        unsafe {
            self.device
                .cmd_clear_attachments(frame.command_buffer, &[attachment], &[rect]);
        }
    }
}

/// Centered rect whose sides swing between 25% and 75% of the extent.
fn pulse_rect(extent: vk::Extent2D, t: f32) -> vk::Rect2D {
    let scale = 0.5 + 0.25 * t.sin();
    let width = ((extent.width as f32 * scale) as u32).clamp(1, extent.width.max(1));
    let height = ((extent.height as f32 * scale) as u32).clamp(1, extent.height.max(1));
    vk::Rect2D {
        offset: vk::Offset2D {
            x: (extent.width.saturating_sub(width) / 2) as i32,
            y: (extent.height.saturating_sub(height) / 2) as i32,
        },
        extent: vk::Extent2D { width, height },
    }
}

fn pulse_color(t: f32) -> [f32; 4] {
    let phase = |offset: f32| 0.5 + 0.5 * (t + offset).sin();
    [phase(0.0), phase(2.094), phase(4.189), 1.0]
}
