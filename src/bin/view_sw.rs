use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use glam::Vec3;
use minifb::{Key, Scale, Window, WindowOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

use woof_renderer::{
    config::RenderConfig,
    math::{FRACUNIT, Fixed},
    renderer::{Renderer, Software},
    wad::Wad,
    world::{
        Camera, Level, TextureBank,
        camera::VIEW_HEIGHT,
        demo::{add_demo_assets, demo_bank, demo_level_for},
        setup::interpolate,
    },
};

const TIC: Duration = Duration::from_nanos(1_000_000_000 / 35);
const MOVE_SPEED: f32 = 8.0;
const TURN_SPEED: f32 = 0.06;

/// Walk the demo level with the software renderer.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// IWAD/PWAD whose textures, flats, palette and voxels are loaded.
    #[arg(long)]
    wad: Option<PathBuf>,
    /// Renderer options (TOML).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    width: Option<usize>,
    #[arg(long)]
    height: Option<usize>,
}

fn load_bank(path: Option<&PathBuf>) -> anyhow::Result<TextureBank> {
    let Some(path) = path else {
        return Ok(demo_bank());
    };
    let wad = Wad::from_file(path).with_context(|| format!("reading {}", path.display()))?;
    let mut bank = TextureBank::from_wad(&wad).with_context(|| format!("loading graphics from {}", path.display()))?;
    add_demo_assets(&mut bank);
    Ok(bank)
}

/// Run the lift in room B for one tic.
fn lift_tic(level: &mut Level, tic: u32) {
    let Some(sec) = level.sectors.get_mut(1) else { return };
    let phase = (tic % 64) as Fixed;
    let rise = if phase < 32 { phase } else { 64 - phase };
    sec.old_floorheight = sec.floorheight;
    sec.floorheight = (24 + rise) * FRACUNIT;
    sec.floor_moving = sec.floorheight != sec.old_floorheight;
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut cfg = RenderConfig::load(args.config.as_deref())?;
    if let Some(w) = args.width {
        cfg.screen_width = w;
    }
    if let Some(h) = args.height {
        cfg.screen_height = h;
    }
    let uncapped = cfg.uncapped;

    let bank = load_bank(args.wad.as_ref())?;
    let mut level = demo_level_for(&bank);
    let mut renderer = Software::new(cfg);
    renderer.setup_level(&mut level);
    let (w, h) = (renderer.width(), renderer.height());

    let mut camera = Camera::new(Vec3::new(128.0, 256.0, VIEW_HEIGHT), 0.0);
    let mut win = Window::new(
        "woof_renderer",
        w,
        h,
        WindowOptions { scale: Scale::X4, ..WindowOptions::default() },
    )?;

    // ────────────────── benchmarking state ──────────────────────────────
    let mut acc_time = Duration::ZERO;
    let mut acc_frames = 0usize;
    let mut last_print = Instant::now();

    let mut tic = 0u32;
    let mut last_tic = Instant::now();

    while win.is_open() && !win.is_key_down(Key::Escape) {
        while last_tic.elapsed() >= TIC {
            last_tic += TIC;
            tic = tic.wrapping_add(1);

            let mut forward = 0.0;
            let mut side = 0.0;
            if win.is_key_down(Key::Up) || win.is_key_down(Key::W) {
                forward += MOVE_SPEED;
            }
            if win.is_key_down(Key::Down) || win.is_key_down(Key::S) {
                forward -= MOVE_SPEED;
            }
            if win.is_key_down(Key::A) {
                side -= MOVE_SPEED;
            }
            if win.is_key_down(Key::D) {
                side += MOVE_SPEED;
            }
            if win.is_key_down(Key::Left) {
                camera.turn(TURN_SPEED);
            }
            if win.is_key_down(Key::Right) {
                camera.turn(-TURN_SPEED);
            }
            camera.step(forward, side);
            lift_tic(&mut level, tic);
        }

        let t0 = Instant::now();
        let frac = (last_tic.elapsed().as_secs_f64() / TIC.as_secs_f64() * FRACUNIT as f64) as Fixed;
        interpolate(&mut level, frac.min(FRACUNIT), uncapped);
        let view = camera.player_view(&level);

        renderer.begin_frame(w, h);
        renderer.render_player_view(&level, &view, &bank, || win.update());
        let mut shown = Ok(());
        renderer.end_frame(|fb, w, h| shown = win.update_with_buffer(fb, w, h));
        shown?;

        acc_time += t0.elapsed();
        acc_frames += 1;
        if last_print.elapsed() >= Duration::from_secs(3) {
            let avg_ms = acc_time.as_secs_f64() * 1000.0 / acc_frames as f64;
            info!(avg_ms = format_args!("{avg_ms:.2}"), fps = format_args!("{:.1}", 1000.0 / avg_ms), "render time");
            acc_time = Duration::ZERO;
            acc_frames = 0;
            last_print = Instant::now();
        }
    }
    Ok(())
}
