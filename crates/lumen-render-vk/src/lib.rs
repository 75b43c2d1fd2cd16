// SPDX-License-Identifier: CEPL-1.0
//! Frame-presentation core on top of ash.
//!
//! The [`Renderer`] drives acquire → record → submit → present once per
//! iteration against a [`PresentableChain`], pipelining up to
//! [`MAX_FRAMES_IN_FLIGHT`] frames through the [`FrameSync`] ring. All GPU
//! access goes through the [`DeviceContext`] trait; [`VulkanContext`] is the
//! ash implementation.
#![deny(unsafe_op_in_unsafe_fn)]

mod chain;
mod config;
mod context;
mod device;
mod error;
mod renderer;
mod resources;
mod sync;

pub use ash::vk;

pub use chain::{
    choose_present_mode, choose_surface_format, extent_from_caps, image_count_from_caps,
    pick_depth_format, Acquired, ChainStatus, PresentableChain, ReplaceToken,
};
pub use config::{ChainConfig, PresentModePreference, RendererConfig};
pub use context::VulkanContext;
pub use device::{
    DeviceContext, RenderPassBegin, RenderPassDesc, Submission, SurfaceSupport, SwapchainDesc,
};
pub use error::{PresentError, Result};
pub use renderer::{FrameContext, RebuildReasons, RenderPassClient, Renderer};
pub use resources::Device;
pub use sync::{FrameSync, ImagesInFlight};

/// Pipelining depth: how many frames may be queued ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
