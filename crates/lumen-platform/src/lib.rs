// SPDX-License-Identifier: CEPL-1.0
//! winit-backed window for the frame core.
//!
//! The event loop is pumped rather than run: the application drives frames
//! from its own loop and the renderer may block inside [`WindowSurface::wait_events`]
//! while the window is minimized.
#![deny(unsafe_op_in_unsafe_fn)]

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use lumen_render::{RenderSize, WindowSurface};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

pub use winit;

#[derive(Clone, Debug)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "lumen".to_owned(),
            width: 800,
            height: 600,
        }
    }
}

/// Extent and resize bookkeeping, fed from window events.
#[derive(Debug, Default)]
struct SizeTracker {
    size: RenderSize,
    last_visible: RenderSize,
    resized: bool,
}

impl SizeTracker {
    fn set_initial(&mut self, width: u32, height: u32) {
        self.size = RenderSize::new(width, height);
        if !self.size.is_zero() {
            self.last_visible = self.size;
        }
    }

    fn resized_to(&mut self, width: u32, height: u32) {
        self.set_initial(width, height);
        self.resized = true;
    }

    /// A window closed while minimized still has to let a pending rebuild
    /// finish, so it reports the last size it was visible at.
    fn restore_visible(&mut self) {
        if self.size.is_zero() && !self.last_visible.is_zero() {
            self.size = self.last_visible;
            self.resized = true;
        }
    }
}

struct Handler {
    config: WindowConfig,
    window: Option<Window>,
    sizes: SizeTracker,
    close_requested: bool,
    create_error: Option<String>,
}

impl ApplicationHandler for Handler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.create_error.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let size = window.inner_size();
                self.sizes.set_initial(size.width, size.height);
                info!("window created: {}x{}", size.width, size.height);
                self.window = Some(window);
            }
            Err(e) => {
                error!("create_window failed: {e}");
                self.create_error = Some(e.to_string());
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }
        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
                self.sizes.restore_visible();
            }
            WindowEvent::Resized(size) => {
                debug!("Resized → {}x{}", size.width, size.height);
                self.sizes.resized_to(size.width, size.height);
            }
            _ => {}
        }
    }
}

/// Owns the event loop and the single window.
pub struct PlatformWindow {
    event_loop: EventLoop<()>,
    handler: Handler,
}

impl PlatformWindow {
    /// Opens the window, pumping the event loop until it exists.
    pub fn new(config: WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new().context("creating event loop")?;
        let mut this = Self {
            event_loop,
            handler: Handler {
                config,
                window: None,
                sizes: SizeTracker::default(),
                close_requested: false,
                create_error: None,
            },
        };
        while this.handler.window.is_none() {
            if let Some(e) = this.handler.create_error.take() {
                return Err(anyhow!("creating window: {e}"));
            }
            if !this.pump() {
                return Err(anyhow!("event loop exited before the window was created"));
            }
        }
        Ok(this)
    }

    /// Handles pending events without blocking. False once the window
    /// should close.
    pub fn pump(&mut self) -> bool {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.handler);
        !matches!(status, PumpStatus::Exit(_)) && !self.handler.close_requested
    }

    pub fn window(&self) -> Result<&Window> {
        self.handler
            .window
            .as_ref()
            .ok_or_else(|| anyhow!("window not created"))
    }

    pub fn close_requested(&self) -> bool {
        self.handler.close_requested
    }
}

impl WindowSurface for PlatformWindow {
    fn extent(&self) -> RenderSize {
        self.handler.sizes.size
    }

    fn was_resized(&self) -> bool {
        self.handler.sizes.resized
    }

    fn reset_resized_flag(&mut self) {
        self.handler.sizes.resized = false;
    }

    fn wait_events(&mut self) {
        if self.handler.close_requested {
            return;
        }
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(None, &mut self.handler) {
            debug!("event loop exit ({code}) while waiting");
            self.handler.close_requested = true;
            self.handler.sizes.restore_visible();
        }
    }
}
