// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentModePreference {
    /// Low-latency, no tearing; falls back to FIFO.
    #[default]
    Mailbox,
    /// Plain vsync. Always available.
    Fifo,
    /// No vsync; tries MAILBOX before falling back to FIFO.
    Immediate,
}

/// Negotiation preferences for building a [`PresentableChain`](crate::PresentableChain).
#[derive(Clone, Debug)]
pub struct ChainConfig {
    pub preferred_format: vk::SurfaceFormatKHR,
    pub present_mode: PresentModePreference,
    /// Depth formats in order of preference.
    pub depth_candidates: Vec<vk::Format>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            preferred_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: PresentModePreference::Mailbox,
            depth_candidates: vec![
                vk::Format::D32_SFLOAT,
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D24_UNORM_S8_UINT,
            ],
        }
    }
}

#[derive(Clone, Debug)]
pub struct RendererConfig {
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u32,
    /// Nanoseconds. A fence wait that runs out is treated as device loss.
    pub fence_timeout: u64,
    pub chain: ChainConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.01, 0.01, 0.01, 1.0],
            clear_depth: 1.0,
            clear_stencil: 0,
            fence_timeout: u64::MAX,
            chain: ChainConfig::default(),
        }
    }
}
