//! `volview bench`: drive the renderer over a synthetic dataset.
//!
//! Tiles are generated on the fly after an artificial latency, so cache sizing,
//! budgets and loader threads can be tuned without real data. The view pans a
//! little every frame and steps through timepoints, like an interactive session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Args;
use tracing::{debug, info};
use volview::cache::{LoadError, TileLoader, VolatileCache};
use volview::config::{format_size, ViewerConfig};
use volview::coord::{DatasetLayout, TileCoord};
use volview::render::{
    FrameOutcome, FrameReport, FrameRequest, FrameSlot, FrameTermination,
    MultiResolutionRenderer, SliceProjector, U16Block, ViewTransform,
};

use crate::error::CliError;

/// Arguments for the bench command.
#[derive(Debug, Args)]
pub struct BenchArgs {
    /// Dataset width and height in voxels (level 0)
    #[arg(long, default_value_t = 4096)]
    pub size: u64,

    /// Cell edge length in voxels
    #[arg(long, default_value_t = 64)]
    pub cell: u32,

    /// Pyramid levels
    #[arg(long, default_value_t = 5)]
    pub levels: usize,

    /// Timepoints in the dataset
    #[arg(long, default_value_t = 4)]
    pub timepoints: u32,

    /// Artificial latency per tile load in milliseconds
    #[arg(long, default_value_t = 5)]
    pub latency_ms: u64,

    /// Frames to render
    #[arg(long, default_value_t = 200)]
    pub frames: usize,

    /// Frames spent on each timepoint
    #[arg(long, default_value_t = 50)]
    pub frames_per_timepoint: usize,

    /// Screen width in pixels
    #[arg(long, default_value_t = 1024)]
    pub width: u32,

    /// Screen height in pixels
    #[arg(long, default_value_t = 768)]
    pub height: u32,

    /// Zoom in screen pixels per voxel
    #[arg(long, default_value_t = 0.5)]
    pub zoom: f64,

    /// Pan per frame in screen pixels
    #[arg(long, default_value_t = 6.0)]
    pub pan: f64,

    /// Print metrics as JSON
    #[arg(long)]
    pub json: bool,
}

/// Loader producing a gradient after a fixed delay.
struct SyntheticLoader {
    layout: DatasetLayout,
    latency: Duration,
}

impl TileLoader<U16Block> for SyntheticLoader {
    fn load(&self, coord: &TileCoord) -> Result<U16Block, LoadError> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        let grid = self
            .layout
            .level(coord.level)
            .ok_or_else(|| LoadError::Unavailable(format!("no level {}", coord.level)))?;
        let interval = grid.cell_interval(coord.cell);
        let [sx, sy, sz] = interval.size;
        let f = grid.factors();

        let mut data = Vec::with_capacity(sx as usize * sy as usize * sz as usize);
        for z in 0..sz as u64 {
            for y in 0..sy as u64 {
                for x in 0..sx as u64 {
                    let gx = (interval.min[0] + x) as f64 * f[0];
                    let gy = (interval.min[1] + y) as f64 * f[1];
                    let gz = (interval.min[2] + z) as f64 * f[2];
                    let value = (gx + gy + 16.0 * gz) as u64 * 8 + coord.timepoint as u64 * 4096;
                    data.push((value % u16::MAX as u64) as u16);
                }
            }
        }
        U16Block::new(interval.size, data)
    }
}

/// Per-frame outcome counts.
#[derive(Debug, Default)]
struct Tally {
    completed: usize,
    budget_exceeded: usize,
    io_capped: usize,
    cancelled: usize,
    invalid_tiles: usize,
    slowest: Duration,
}

impl Tally {
    fn record(&mut self, report: &FrameReport) {
        match (report.outcome, report.termination) {
            (FrameOutcome::Cancelled, _) => self.cancelled += 1,
            (_, Some(FrameTermination::Completed)) => self.completed += 1,
            (_, Some(FrameTermination::BudgetExceeded)) => self.budget_exceeded += 1,
            (_, Some(FrameTermination::IoCapped)) => self.io_capped += 1,
            (FrameOutcome::Done, None) => {}
        }
        self.invalid_tiles += report.invalid_tiles;
        self.slowest = self.slowest.max(report.render_time);
    }
}

/// Run the benchmark.
pub fn run(args: BenchArgs, config: ViewerConfig) -> Result<(), CliError> {
    config.validate()?;
    if args.frames_per_timepoint == 0 {
        return Err(CliError::Config("--frames-per-timepoint must be at least 1".to_string()));
    }

    let layout = DatasetLayout::pyramid(
        args.timepoints,
        1,
        [args.size, args.size, 1],
        [args.cell, args.cell, 1],
        args.levels,
        2,
    )?;
    let loader = SyntheticLoader {
        layout: layout.clone(),
        latency: Duration::from_millis(args.latency_ms),
    };

    let cache = Arc::new(VolatileCache::new(layout, loader, config.cache.clone())?);
    let slot = Arc::new(FrameSlot::new());
    let renderer = MultiResolutionRenderer::new(
        Arc::clone(&cache),
        Arc::new(SliceProjector::default()),
        slot.clone(),
        config.render.clone(),
    )?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    if !args.json {
        println!(
            "Synthetic dataset: {0}x{0} voxels, {1}x{1} cells, {2} levels, {3} timepoints",
            args.size, args.cell, args.levels, args.timepoints
        );
        println!(
            "Cache: max_tiles={}, max_bytes={}, {} loader threads",
            config
                .cache
                .max_tiles
                .map_or("none".to_string(), |n| n.to_string()),
            config.cache.max_bytes.map_or("none".to_string(), format_size),
            cache.loader_threads()
        );
        println!("Rendering {} frames (Ctrl+C to stop early)...", args.frames);
    }

    info!(frames = args.frames, latency_ms = args.latency_ms, "Benchmark started");
    let start = Instant::now();
    let mut tally = Tally::default();
    let mut rendered = 0;

    for frame in 0..args.frames {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let timepoint = ((frame / args.frames_per_timepoint) as u32) % args.timepoints.max(1);
        let transform =
            ViewTransform::new(args.zoom).with_translation(-(frame as f64) * args.pan, 0.0);
        let request = FrameRequest::new(timepoint, 0, transform, args.width, args.height);

        let report = renderer.render(request)?;
        debug!(
            frame,
            outcome = ?report.outcome,
            termination = ?report.termination,
            scale = ?report.screen_scale,
            level = ?report.level,
            invalid = report.invalid_tiles,
            render_us = report.render_time.as_micros() as u64,
            "Bench frame"
        );
        tally.record(&report);
        rendered += 1;
    }

    let elapsed = start.elapsed();
    let cache_snapshot = cache.metrics().snapshot();
    let render_snapshot = renderer.metrics().snapshot();
    info!(rendered, elapsed_ms = elapsed.as_millis() as u64, "Benchmark finished");

    if args.json {
        let output = serde_json::json!({
            "frames": rendered,
            "elapsed_ms": elapsed.as_millis() as u64,
            "completed": tally.completed,
            "budget_exceeded": tally.budget_exceeded,
            "io_capped": tally.io_capped,
            "cancelled": tally.cancelled,
            "invalid_tiles": tally.invalid_tiles,
            "slowest_frame_ms": tally.slowest.as_secs_f64() * 1000.0,
            "cache": cache_snapshot,
            "render": render_snapshot,
        });
        let text =
            serde_json::to_string_pretty(&output).map_err(|e| CliError::Output(e.to_string()))?;
        println!("{}", text);
    } else {
        println!();
        println!("Rendered {} frames in {:.2}s", rendered, elapsed.as_secs_f64());
        println!(
            "  completed: {}, budget stops: {}, I/O capped: {}, cancelled: {}",
            tally.completed, tally.budget_exceeded, tally.io_capped, tally.cancelled
        );
        println!(
            "  pending tiles painted around: {}, slowest frame: {:.1} ms",
            tally.invalid_tiles,
            tally.slowest.as_secs_f64() * 1000.0
        );
        println!();
        println!("{}", render_snapshot);
        println!("{}", cache_snapshot);
    }

    Ok(())
}
