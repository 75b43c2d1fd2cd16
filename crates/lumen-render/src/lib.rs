// SPDX-License-Identifier: CEPL-1.0
pub use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Drawable size in physical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero dimension; nothing can be presented to it.
    pub const fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height, or 1.0 for a degenerate size.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

/// What the frame core needs from the platform window.
///
/// The resized flag is sticky: it stays set until `reset_resized_flag`.
pub trait WindowSurface {
    fn extent(&self) -> RenderSize;
    fn was_resized(&self) -> bool;
    fn reset_resized_flag(&mut self);

    /// Blocks until the platform delivers at least one event.
    /// Only used while the window reports a zero extent.
    fn wait_events(&mut self);
}
