// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{error, info, warn};
use vkswap_core::init_tracing;
use vkswap_present::{PresentError, Presenter, PresenterConfig, VideoFormat, VideoFrame, VideoInfo};
use vkswap_vk::{VkDevice, WindowSurface};

use vkswap_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Presenter settings plus an optional [player] table
    #[arg(long, default_value = "vkswap.toml")]
    config: PathBuf,
    /// Frame format: rgba | rgb | bgra | bgr (first supported when omitted)
    #[arg(long)]
    format: Option<VideoFormat>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Frames generated per second
    #[arg(long)]
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
struct PlayerCfg {
    width: u32,
    height: u32,
    fps: u32,
}

impl Default for PlayerCfg {
    fn default() -> Self {
        PlayerCfg {
            width: 640,
            height: 360,
            fps: 30,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct PlayerFile {
    #[serde(default)]
    player: PlayerCfg,
}

fn load_player_cfg(path: &Path, args: &Args) -> Result<PlayerCfg> {
    let mut cfg = match fs::read_to_string(path) {
        Ok(s) => toml::from_str::<PlayerFile>(&s)
            .with_context(|| format!("parsing {}", path.display()))?
            .player,
        Err(_) => PlayerCfg::default(),
    };
    if let Some(w) = args.width {
        cfg.width = w;
    }
    if let Some(h) = args.height {
        cfg.height = h;
    }
    if let Some(f) = args.fps {
        cfg.fps = f;
    }
    if cfg.width == 0 || cfg.height == 0 {
        return Err(anyhow!("frame size {}x{} is empty", cfg.width, cfg.height));
    }
    Ok(cfg)
}

/// Moving colour bars over a horizontal gradient.
fn test_pattern(format: VideoFormat, width: u32, height: u32, tick: u64) -> VideoFrame {
    const BARS: [[u8; 3]; 6] = [
        [255, 255, 255],
        [255, 255, 0],
        [0, 255, 255],
        [0, 255, 0],
        [255, 0, 255],
        [255, 0, 0],
    ];
    let shift = (tick * 4) as u32;
    let mut px: Vec<[u8; 4]> = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            let [r, g, b] = if y < height * 2 / 3 {
                BARS[(((x + shift) % width) * BARS.len() as u32 / width) as usize]
            } else {
                let v = (x * 255 / width.max(1)) as u8;
                [v, v, v]
            };
            px.push(match format {
                VideoFormat::Rgba | VideoFormat::Rgb => [r, g, b, 255],
                VideoFormat::Bgra | VideoFormat::Bgr => [b, g, r, 255],
            });
        }
    }

    let bpp = format.bytes_per_pixel();
    let data: Vec<u8> = if bpp == 4 {
        bytemuck::cast_slice(&px).to_vec()
    } else {
        px.iter().flat_map(|p| p[..bpp].iter().copied()).collect()
    };
    VideoFrame::packed(
        VideoInfo::new(format, width, height),
        width as usize * bpp,
        data,
    )
}

type VkPresenter = Presenter<VkDevice, WindowSurface<Window>>;

struct App {
    presenter_cfg: PresenterConfig,
    player: PlayerCfg,
    requested_format: Option<VideoFormat>,

    window: Option<Arc<Window>>,
    surface: Option<Arc<WindowSurface<Window>>>,
    presenter: Option<VkPresenter>,
    format: Option<VideoFormat>,

    exiting: bool,
    tick: u64,
    frames: u32,
    last_fps_instant: Instant,
    next_frame_deadline: Option<Instant>,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("vkswap")
            .with_inner_size(PhysicalSize::new(self.player.width, self.player.height));
        let window = Arc::new(event_loop.create_window(attrs).context("create_window")?);

        let device = Arc::new(VkDevice::new(&*window)?);
        let surface = Arc::new(WindowSurface::new(Arc::clone(&device), Arc::clone(&window)));
        let presenter =
            Presenter::with_config(device, Arc::clone(&surface), self.presenter_cfg)?;

        let supported = presenter.query_supported_formats()?;
        info!(
            "supported formats: {}",
            supported
                .iter()
                .map(|s| s.format.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let format = match self.requested_format {
            Some(f) if supported.iter().any(|s| s.format == f) => f,
            Some(f) => return Err(anyhow!("surface cannot present {f}")),
            None => supported
                .first()
                .map(|s| s.format)
                .ok_or_else(|| anyhow!("surface offers no presentable format"))?,
        };
        if let Some(max) = supported.iter().find(|s| s.format == format) {
            if self.player.width > max.max_width || self.player.height > max.max_height {
                warn!(
                    "frame size {}x{} exceeds device limit {}x{}",
                    self.player.width, self.player.height, max.max_width, max.max_height
                );
            }
        }
        presenter.set_format(format)?;
        if let Some(chain) = presenter.chain_info() {
            info!(
                "presenting {format} {}x{} frames on a {}x{} {} chain ({} images)",
                self.player.width,
                self.player.height,
                chain.extent.width,
                chain.extent.height,
                chain.present_mode.name(),
                chain.image_count
            );
        }

        self.window = Some(window);
        self.surface = Some(surface);
        self.presenter = Some(presenter);
        self.format = Some(format);
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        if let Some(p) = &self.presenter {
            info!("{:?}", p.stats());
        }
        self.presenter = None;
        self.surface = None;
        self.window = None;
        event_loop.exit();
    }

    fn present_next(&mut self) -> Result<(), PresentError> {
        let (Some(presenter), Some(format)) = (&self.presenter, self.format) else {
            return Ok(());
        };
        let frame = test_pattern(format, self.player.width, self.player.height, self.tick);
        presenter.present(Some(Arc::new(frame)))?;
        self.tick = self.tick.wrapping_add(1);
        self.frames = self.frames.saturating_add(1);
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                error!("presenter init failed: {e:#}");
                self.shutdown(event_loop);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                if let Some(s) = &self.surface {
                    s.notify_close();
                }
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(size) => {
                info!("Resized → {}x{}", size.width, size.height);
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if let Some(s) = &self.surface {
                    s.notify_redraw();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        let now = Instant::now();
        let frame_dt = Duration::from_nanos(1_000_000_000u64 / self.player.fps.max(1) as u64);
        let due = match self.next_frame_deadline {
            None => true,
            Some(t) => now >= t,
        };

        if due {
            let next = now + frame_dt;
            self.next_frame_deadline = Some(next);
            match self.present_next() {
                Ok(()) => {}
                Err(PresentError::SurfaceLost(reason)) => {
                    info!("stopping: {reason}");
                    self.shutdown(event_loop);
                    return;
                }
                Err(e) => error!("present error: {e}"),
            }
            event_loop.set_control_flow(ControlFlow::WaitUntil(next));
        } else if let Some(t) = self.next_frame_deadline {
            event_loop.set_control_flow(ControlFlow::WaitUntil(t));
        }

        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let presenter_cfg = PresenterConfig::load(&args.config)?.with_env_overrides()?;
    let player = load_player_cfg(&args.config, &args)?;
    info!("{presenter_cfg:?}, {player:?}");

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App {
        presenter_cfg,
        player,
        requested_format: args.format,
        window: None,
        surface: None,
        presenter: None,
        format: None,
        exiting: false,
        tick: 0,
        frames: 0,
        last_fps_instant: Instant::now(),
        next_frame_deadline: None,
    };

    event_loop.run_app(&mut app)?;
    Ok(())
}
