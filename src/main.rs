mod aabb;
mod config;
mod device;
mod error;
mod geometry;
mod kernel;
mod layout;
mod merge;
mod rendering;
mod scene;
#[cfg(test)]
mod tests;
mod texture;
mod tiles;
mod utils;

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use image::ImageFormat;

use crate::config::{parse_args, RenderConfig};
use crate::device::{ComputeDevice, CpuDevice, DeviceSession};
use crate::error::RenderError;
use crate::layout::{log_layout_sizes, SceneBuffers};
use crate::merge::FrameBuffer;
use crate::scene::{load_scene, log_scene_info};
use crate::tiles::{RenderSettings, TileScheduler};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(error) = run(args.iter().map(String::as_str)) {
        log::error!("{error}");
        std::process::exit(1);
    }
}

fn run<'a>(args: impl IntoIterator<Item = &'a str>) -> Result<(), RenderError> {
    let config = parse_args(args)?;
    let scene = load_scene(&config.input)?;
    log_scene_info(&scene);
    log_layout_sizes();

    let settings = RenderSettings {
        aa_level: config.samples,
        test_mode: config.test_mode,
        block_size: config.block_size,
        show_progress: true,
    };
    let scheduler = TileScheduler::new(config.width, config.height, settings);
    let buffers = SceneBuffers::from_scene(&scene);
    let mut session = DeviceSession::open(CpuDevice::new(0)?, &buffers, config.width, config.height)?;
    log::info!(
        "rendering {} at {}x{}, {} sample(s) per axis, {} blocks on {}",
        config.input.display(),
        config.width,
        config.height,
        config.samples,
        scheduler.grid().total_blocks(),
        session.device().name()
    );

    let mut frame = FrameBuffer::new(config.width, config.height);
    let mut first_time = Duration::ZERO;
    let mut total_time = Duration::ZERO;
    let mut samples_rendered = 0;
    for run in 0..config.runs {
        let start = Instant::now();
        let stats = scheduler.render(&scene, &mut session, &mut frame)?;
        let elapsed = start.elapsed();
        samples_rendered += stats.samples;
        log::debug!(
            "run {}: {} blocks, {} pixels written",
            run + 1,
            stats.blocks,
            stats.pixels_written
        );
        if run == 0 {
            first_time = elapsed;
        } else {
            total_time += elapsed;
        }
    }
    drop(session);
    report_timings(&config, first_time, total_time, samples_rendered);

    let output = config.output_path();
    dump_rendered_to_bmp(&frame, &output)?;
    log::info!("wrote {}", output.display());
    Ok(())
}

fn report_timings(config: &RenderConfig, first_time: Duration, total_time: Duration, samples: u64) {
    log::info!("first run time: {:.1}ms", first_time.as_secs_f64() * 1000.0);
    if config.runs > 1 {
        let average = total_time / (config.runs - 1);
        log::info!(
            "average time of {} further runs: {:.1}ms",
            config.runs - 1,
            average.as_secs_f64() * 1000.0
        );
    }
    log::info!("samples rendered: {samples}");
}

fn dump_rendered_to_bmp(frame: &FrameBuffer, path: &Path) -> Result<(), RenderError> {
    log::debug!(
        "encoding {}x{} frame, {} pixels set",
        frame.width(),
        frame.height(),
        frame.pixels().iter().filter(|pixel| **pixel != 0).count()
    );
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    frame.to_rgb_image().save_with_format(path, ImageFormat::Bmp)?;
    Ok(())
}
