// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Fatal conditions of the presentation core.
///
/// Stale and suboptimal chains are not errors; they are reported as
/// [`ChainStatus`](crate::ChainStatus) and handled by rebuilding.
#[derive(Debug, Error)]
pub enum PresentError {
    #[error("failed to create {what}: {result}")]
    ResourceCreation {
        what: &'static str,
        result: vk::Result,
    },

    #[error(
        "presentable chain formats changed across rebuild \
         (color {old_color:?} -> {new_color:?}, depth {old_depth:?} -> {new_depth:?})"
    )]
    FormatMismatch {
        old_color: vk::Format,
        new_color: vk::Format,
        old_depth: vk::Format,
        new_depth: vk::Format,
    },

    #[error("timed out waiting for frame fence; treating the device as lost")]
    FenceTimeout,

    #[error("device lost during {op}")]
    DeviceLost { op: &'static str },

    #[error("{op} failed: {result}")]
    Vulkan {
        op: &'static str,
        result: vk::Result,
    },

    #[error("surface reports no color formats")]
    NoSurfaceFormats,

    #[error("no depth format among {0:?} supports depth attachments")]
    NoDepthFormat(Vec<vk::Format>),

    #[error("surface: {0}")]
    Surface(String),

    #[error("failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("no physical device with graphics and present support")]
    NoSuitableDevice,
}

pub type Result<T> = std::result::Result<T, PresentError>;

impl PresentError {
    /// Maps a driver result from a runtime operation (not a creation call).
    pub(crate) fn runtime(op: &'static str, result: vk::Result) -> Self {
        match result {
            vk::Result::TIMEOUT => PresentError::FenceTimeout,
            vk::Result::ERROR_DEVICE_LOST => PresentError::DeviceLost { op },
            result => PresentError::Vulkan { op, result },
        }
    }

    pub(crate) fn creating(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| PresentError::ResourceCreation { what, result }
    }
}
