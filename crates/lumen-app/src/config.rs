// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use lumen_platform::WindowConfig;
use lumen_render_vk::{ChainConfig, PresentModePreference, RendererConfig};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize, Default)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowCfg {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub present_mode: PresentModeCfg,
    /// Absent means wait forever.
    #[serde(default)]
    pub fence_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    #[default]
    Mailbox,
    Fifo,
    Immediate,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: default_width(),
            height: default_height(),
            title: default_title(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            present_mode: PresentModeCfg::Mailbox,
            fence_timeout_ms: None,
        }
    }
}

fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    600
}
fn default_title() -> String {
    "lumen".to_owned()
}
fn default_clear() -> [f32; 4] {
    [0.01, 0.01, 0.01, 1.0]
}

/// Missing file means defaults; an unreadable or malformed one is an error.
pub fn load_cfg(path: &Path) -> Result<AppCfg> {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).with_context(|| format!("parsing {}", path.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("{} not found, using defaults", path.display());
            Ok(AppCfg::default())
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

pub fn parse_cfg(s: &str) -> Result<AppCfg> {
    Ok(toml::from_str::<AppCfg>(s)?)
}

impl AppCfg {
    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
        }
    }

    pub fn renderer_config(&self) -> RendererConfig {
        let present_mode = match self.render.present_mode {
            PresentModeCfg::Mailbox => PresentModePreference::Mailbox,
            PresentModeCfg::Fifo => PresentModePreference::Fifo,
            PresentModeCfg::Immediate => PresentModePreference::Immediate,
        };
        RendererConfig {
            clear_color: self.render.clear_color,
            fence_timeout: self
                .render
                .fence_timeout_ms
                .map_or(u64::MAX, |ms| ms.saturating_mul(1_000_000)),
            chain: ChainConfig {
                present_mode,
                ..ChainConfig::default()
            },
            ..RendererConfig::default()
        }
    }
}
