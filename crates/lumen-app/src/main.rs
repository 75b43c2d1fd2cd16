// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lumen_core::{init_tracing, Timer};
use lumen_platform::PlatformWindow;
use lumen_render::WindowSurface;
use lumen_render_vk::{Device, Renderer, VulkanContext};
use tracing::{error, info};

mod config;
mod demo;

use config::load_cfg;
use demo::PulsingRect;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config
    #[arg(long, default_value = "lumen.toml")]
    config: PathBuf,
    /// Exit after this many presented frames (0 runs until the window closes)
    #[arg(long, default_value_t = 0)]
    frames: u64,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        error!("fatal: {e:#}");
        return Err(e);
    }
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let cfg = load_cfg(&args.config)?;
    let mut window = PlatformWindow::new(cfg.window_config())?;

    let context = {
        let w = window.window()?;
        Arc::new(VulkanContext::new(w, w).context("initializing Vulkan")?)
    };
    let mut demo = PulsingRect::new(context.device().clone());
    let device: Device = context.clone();
    let mut renderer = Renderer::new(device, &mut window, cfg.renderer_config())
        .context("creating renderer")?;
    info!(
        "renderer ready: {}x{} (aspect {:.3}), {} images, color {:?} / {:?}, depth {:?}",
        renderer.extent().width,
        renderer.extent().height,
        renderer.aspect_ratio(),
        renderer.image_count(),
        renderer.color_format(),
        renderer.chain().color_space(),
        renderer.depth_format()
    );

    let mut fps_timer = Timer::new();
    let mut frames = 0u32;
    let mut since_report = 0.0f32;
    while window.pump() {
        if renderer.draw_frame(&mut window, &mut [&mut demo])? {
            frames = frames.saturating_add(1);
        }
        if args.frames > 0 && renderer.frame_number() >= args.frames {
            info!("presented {} frames, stopping", args.frames);
            break;
        }

        since_report += fps_timer.tick().as_secs_f32();
        if since_report >= 1.0 {
            info!(
                "fps ~ {} ({}x{})",
                frames,
                window.extent().width,
                window.extent().height
            );
            frames = 0;
            since_report = 0.0;
        }
    }

    renderer.wait_idle()?;
    info!(
        "exiting after {} frames and {} rebuilds (closed by user: {})",
        renderer.frame_number(),
        renderer.rebuild_count(),
        window.close_requested()
    );
    Ok(())
}
