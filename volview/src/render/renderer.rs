//! Time-budgeted progressive renderer.
//!
//! Each frame walks the configured screen scales from coarsest to finest:
//!
//! ```text
//! SelectLevels ──► PaintCoarse ──► PaintRefine* ──► Done (publish)
//!       │               │               │
//!       └───────────────┴───────────────┴──► Cancelled (newer frame requested)
//! ```
//!
//! - The coarse pass loads its tiles synchronously the first time a request is
//!   painted, so something is always on screen. Every other pass only queues
//!   background loads and paints what is already valid, falling back to coarser
//!   pyramid levels for the rest.
//! - Refinement stops at the finest allowed scale, when the quality budget is
//!   spent, or after the coarse pass while sustained slow I/O caps refinement.
//! - A pass whose tiles are all valid is skipped while budget remains.
//! - A newer frame request cancels the current one at the next scale boundary;
//!   a cancelled frame never publishes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::budget::IoBackoff;
use super::projector::{PassView, Projector, TileSet};
use super::request::FrameRequest;
use super::screen::{RenderTarget, ScreenBuffers, ScreenImage};
use super::settings::RenderSettings;
use crate::cache::{CacheHints, LoadingStrategy, RepaintCallback, TileData, VolatileCache};
use crate::config::ConfigError;
use crate::telemetry::RenderMetrics;

/// Errors creating a renderer or starting a frame.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build render thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The frame request cannot be rendered.
    #[error("Invalid frame request: {0}")]
    InvalidRequest(String),
}

/// How a frame ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was published.
    Done,
    /// A newer request superseded the frame before it was published.
    Cancelled,
}

/// Why refinement stopped in a published frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTermination {
    /// The finest allowed scale was painted.
    Completed,
    /// The quality budget ran out before the finest scale.
    BudgetExceeded,
    /// Slow I/O capped refinement at the coarsest scale.
    IoCapped,
}

/// Summary of one rendered (or cancelled) frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub outcome: FrameOutcome,
    /// `None` for cancelled frames.
    pub termination: Option<FrameTermination>,
    /// Wall-clock time of the frame.
    pub render_time: Duration,
    /// Time spent in blocking loads.
    pub io_time: Duration,
    /// Screen scale index of the published pass.
    pub scale_index: Option<usize>,
    /// Screen scale of the published pass.
    pub screen_scale: Option<f64>,
    /// Pyramid level of the published pass.
    pub level: Option<u8>,
    /// Tiles of the published pass that were still pending when painted.
    pub invalid_tiles: usize,
    pub passes_painted: usize,
    pub passes_skipped: usize,
}

impl FrameReport {
    fn cancelled(start: Instant, io_time: Duration, painted: usize, skipped: usize) -> Self {
        Self {
            outcome: FrameOutcome::Cancelled,
            termination: None,
            render_time: start.elapsed(),
            io_time,
            scale_index: None,
            screen_scale: None,
            level: None,
            invalid_tiles: 0,
            passes_painted: painted,
            passes_skipped: skipped,
        }
    }

    /// Whether the frame was published.
    pub fn is_published(&self) -> bool {
        self.outcome == FrameOutcome::Done
    }
}

/// State carried between frames; locked for the whole frame.
struct FrameState {
    buffers: ScreenBuffers,
    backoff: IoBackoff,
    last_request: Option<FrameRequest>,
    /// Scale index the next repaint of `last_request` starts from
    resume_scale: Option<usize>,
}

struct PaintedPass {
    scale_index: usize,
    level: u8,
    image: Arc<ScreenImage>,
    invalid: usize,
}

struct Gathered<P> {
    tiles: TileSet<P>,
    invalid: usize,
}

/// Progressive multi-resolution renderer over a [`VolatileCache`].
pub struct MultiResolutionRenderer<P: TileData> {
    cache: Arc<VolatileCache<P>>,
    projector: Arc<dyn Projector<P>>,
    target: Arc<dyn RenderTarget>,
    settings: RenderSettings,
    pool: rayon::ThreadPool,
    metrics: Arc<RenderMetrics>,
    generation: AtomicU64,
    state: Mutex<FrameState>,
    publish_lock: Mutex<()>,
    repaint: RwLock<Option<RepaintCallback>>,
}

impl<P: TileData> MultiResolutionRenderer<P> {
    /// Create a renderer. Invalid settings are rejected here.
    pub fn new(
        cache: Arc<VolatileCache<P>>,
        projector: Arc<dyn Projector<P>>,
        target: Arc<dyn RenderTarget>,
        settings: RenderSettings,
    ) -> Result<Self, RenderError> {
        settings.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.rendering_threads)
            .thread_name(|i| format!("volview-render-{}", i))
            .build()?;

        info!(
            scales = ?settings.screen_scales,
            quality_budget_ms = settings.quality_budget.as_millis() as u64,
            io_budget_ms = settings.io_budget.as_millis() as u64,
            rendering_threads = settings.rendering_threads,
            "Renderer created"
        );

        let state = FrameState {
            buffers: ScreenBuffers::new(settings.screen_scales.len(), settings.double_buffered),
            backoff: IoBackoff::new(settings.io_budget, settings.bad_io_frame_block_frames),
            last_request: None,
            resume_scale: None,
        };

        Ok(Self {
            cache,
            projector,
            target,
            settings,
            pool,
            metrics: Arc::new(RenderMetrics::new()),
            generation: AtomicU64::new(0),
            state: Mutex::new(state),
            publish_lock: Mutex::new(()),
            repaint: RwLock::new(None),
        })
    }

    /// Register the callback used to ask for another frame when refinement
    /// stopped on budget with more detail available.
    pub fn set_repaint_callback(&self, callback: RepaintCallback) {
        *self.repaint.write() = Some(callback);
    }

    /// Cancel the frame in progress, if any, at its next scale boundary.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether slow I/O currently caps refinement.
    pub fn is_io_capped(&self) -> bool {
        self.state.lock().backoff.is_capped()
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<VolatileCache<P>> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<RenderMetrics> {
        &self.metrics
    }

    /// Render `request`, superseding any frame still in progress.
    ///
    /// Blocks until the frame is published or cancelled. A rejected request
    /// leaves the frame in progress untouched.
    pub fn render(&self, request: FrameRequest) -> Result<FrameReport, RenderError> {
        self.check_request(&request)?;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.metrics.frame_requested();

        let mut state = self.state.lock();
        let start = Instant::now();
        if self.is_superseded(generation) {
            self.metrics.frame_cancelled();
            debug!(%request, "Frame superseded before start");
            return Ok(FrameReport::cancelled(start, Duration::ZERO, 0, 0));
        }

        self.cache.prepare_next_frame();
        let report = self.render_frame(&mut state, request, generation, start);
        self.cache.finish_frame();
        Ok(report)
    }

    fn check_request(&self, request: &FrameRequest) -> Result<(), RenderError> {
        let layout = self.cache.layout();
        let zoom = request.transform.zoom;
        if !(zoom.is_finite() && zoom > 0.0) {
            return Err(RenderError::InvalidRequest(format!(
                "zoom must be positive, got {}",
                zoom
            )));
        }
        if request.width == 0 || request.height == 0 {
            return Err(RenderError::InvalidRequest("empty screen".to_string()));
        }
        if request.timepoint >= layout.num_timepoints() || request.view >= layout.num_views() {
            return Err(RenderError::InvalidRequest(format!(
                "timepoint {} / view {} not in dataset",
                request.timepoint, request.view
            )));
        }
        Ok(())
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) != generation
    }

    fn render_frame(
        &self,
        state: &mut FrameState,
        request: FrameRequest,
        generation: u64,
        start: Instant,
    ) -> FrameReport {
        let settings = &self.settings;
        let coarsest = settings.coarsest_scale_index();
        let finest_allowed = if state.backoff.is_capped() { coarsest } else { 0 };

        let repeat = state.last_request.as_ref() == Some(&request);
        let first_scale = match (repeat, state.resume_scale) {
            (true, Some(resume)) if !settings.quality_budget.is_zero() => {
                resume.clamp(finest_allowed, coarsest)
            }
            _ => coarsest,
        };

        let mut io_time = Duration::ZERO;
        let mut painted: Option<PaintedPass> = None;
        let mut termination = FrameTermination::Completed;
        let mut passes_painted = 0;
        let mut passes_skipped = 0;

        for scale_index in (finest_allowed..=first_scale).rev() {
            if self.is_superseded(generation) {
                if let Some(pass) = painted.take() {
                    state.buffers.recycle(pass.scale_index, pass.image);
                }
                self.metrics.frame_cancelled();
                debug!(%request, scale_index, "Frame cancelled");
                return FrameReport::cancelled(start, io_time, passes_painted, passes_skipped);
            }

            let screen_scale = settings.screen_scales[scale_index];
            let (width, height) = request.scaled_size(screen_scale);
            let level = self.select_level(&request, screen_scale, width, height);
            let pass = PassView {
                request: &request,
                screen_scale,
                level,
                width,
                height,
            };

            let strategy = if scale_index == coarsest && !repeat {
                LoadingStrategy::Blocking
            } else {
                LoadingStrategy::Budgeted
            };
            let gathered = self.gather_tiles(&pass, strategy, &mut io_time);

            let is_last = scale_index == finest_allowed;
            if gathered.invalid == 0 && !is_last && start.elapsed() < settings.quality_budget {
                passes_skipped += 1;
                self.metrics.pass_skipped();
                debug!(scale_index, level, "Pass fully valid, skipping to finer scale");
                continue;
            }

            let image = self.paint_pass(&mut state.buffers, scale_index, &pass, &gathered.tiles);
            passes_painted += 1;
            self.metrics.pass_painted();
            debug!(
                scale_index,
                screen_scale,
                level,
                tiles = gathered.tiles.len(),
                invalid = gathered.invalid,
                "Painted pass"
            );
            if let Some(previous) = painted.replace(PaintedPass {
                scale_index,
                level,
                image,
                invalid: gathered.invalid,
            }) {
                state.buffers.recycle(previous.scale_index, previous.image);
            }

            if is_last {
                termination = if finest_allowed > 0 {
                    FrameTermination::IoCapped
                } else {
                    FrameTermination::Completed
                };
                break;
            }
            if start.elapsed() >= settings.quality_budget {
                termination = FrameTermination::BudgetExceeded;
                break;
            }
        }

        let Some(pass) = painted else {
            return FrameReport::cancelled(start, io_time, passes_painted, passes_skipped);
        };

        {
            let _publish = self.publish_lock.lock();
            if self.is_superseded(generation) {
                state.buffers.recycle(pass.scale_index, pass.image);
                self.metrics.frame_cancelled();
                debug!(%request, "Frame superseded before publish");
                return FrameReport::cancelled(start, io_time, passes_painted, passes_skipped);
            }
            state.buffers.swap(pass.scale_index, Arc::clone(&pass.image));
            self.target.publish(pass.image);
        }

        let render_time = start.elapsed();
        state.backoff.record_frame(io_time);
        state.last_request = Some(request);
        self.metrics.frame_published(render_time, io_time);

        // Continue refining in a follow-up frame; pending tiles trigger their own
        // repaints when they arrive
        let mut continue_refining = false;
        state.resume_scale = match termination {
            FrameTermination::BudgetExceeded if pass.invalid == 0 => {
                // A zero budget pins the view to the coarse pass
                continue_refining = !settings.quality_budget.is_zero();
                Some(pass.scale_index.saturating_sub(1))
            }
            FrameTermination::BudgetExceeded => Some(pass.scale_index),
            FrameTermination::IoCapped | FrameTermination::Completed => Some(pass.scale_index),
        };
        match termination {
            FrameTermination::BudgetExceeded => self.metrics.budget_stop(),
            FrameTermination::IoCapped => self.metrics.io_capped(),
            FrameTermination::Completed => {}
        }

        debug!(
            %request,
            ?termination,
            scale_index = pass.scale_index,
            level = pass.level,
            invalid = pass.invalid,
            render_us = render_time.as_micros() as u64,
            io_us = io_time.as_micros() as u64,
            "Frame published"
        );

        if continue_refining {
            let callback = self.repaint.read().clone();
            if let Some(callback) = callback {
                callback();
            }
        }

        FrameReport {
            outcome: FrameOutcome::Done,
            termination: Some(termination),
            render_time,
            io_time,
            scale_index: Some(pass.scale_index),
            screen_scale: Some(settings.screen_scales[pass.scale_index]),
            level: Some(pass.level),
            invalid_tiles: pass.invalid,
            passes_painted,
            passes_skipped,
        }
    }

    /// Finest level whose voxels cover at least one screen pixel, clamped to the
    /// coarsest level when the selection would not fit in the cache.
    fn select_level(&self, request: &FrameRequest, screen_scale: f64, width: usize, height: usize) -> u8 {
        let layout = self.cache.layout();
        let max_level = layout.max_level();
        let density = request.transform.zoom * screen_scale;

        let mut level = max_level;
        for (index, grid) in layout.levels().iter().enumerate() {
            let f = grid.factors();
            if density * f[0].min(f[1]) >= 1.0 - 1e-9 {
                level = index as u8;
                break;
            }
        }

        if level < max_level {
            if let Some(capacity) = self.cache.tile_capacity(level) {
                let pass = PassView {
                    request,
                    screen_scale,
                    level,
                    width,
                    height,
                };
                let needed = self.projector.required_tiles(layout, &pass, level).len() as u64;
                if needed > capacity {
                    debug!(level, needed, capacity, "Selection exceeds cache, clamping to coarsest level");
                    level = max_level;
                }
            }
        }
        level
    }

    /// Request the tiles of a pass and collect the valid ones.
    ///
    /// Tiles of the selected level are requested with `strategy`. For levels
    /// coarser than that, only as long as the previous level had gaps, tiles are
    /// requested budgeted to serve as fallback.
    fn gather_tiles(
        &self,
        pass: &PassView<'_>,
        strategy: LoadingStrategy,
        io_time: &mut Duration,
    ) -> Gathered<P> {
        let layout = self.cache.layout();
        let max_level = layout.max_level();
        let mut tiles = TileSet::new();
        let mut invalid = 0;

        for level in pass.level..=max_level {
            let strategy = if level == pass.level {
                strategy
            } else {
                LoadingStrategy::Budgeted
            };
            let mut gaps = false;

            for coord in self.projector.required_tiles(layout, pass, level) {
                let hints = CacheHints::for_level(strategy, max_level, level);
                let requested = Instant::now();
                let result = self.cache.get_tile(coord, hints);
                if strategy == LoadingStrategy::Blocking {
                    *io_time += requested.elapsed();
                }

                match result.map(|handle| handle.data()) {
                    Ok(Some(data)) => tiles.insert(coord, data),
                    Ok(None) => {
                        gaps = true;
                        if level == pass.level {
                            invalid += 1;
                        }
                    }
                    Err(e) => {
                        warn!(tile = %coord, error = %e, "Tile unavailable for render pass");
                        gaps = true;
                        if level == pass.level {
                            invalid += 1;
                        }
                    }
                }
            }

            if !gaps {
                break;
            }
        }

        Gathered { tiles, invalid }
    }

    fn paint_pass(
        &self,
        buffers: &mut ScreenBuffers,
        scale_index: usize,
        pass: &PassView<'_>,
        tiles: &TileSet<P>,
    ) -> Arc<ScreenImage> {
        let mut image = buffers.acquire(scale_index, pass.width, pass.height, self.settings.background);
        let layout = self.cache.layout();
        let projector = self.projector.as_ref();
        let width = pass.width;

        self.pool.install(|| {
            image
                .pixels_mut()
                .par_chunks_mut(width)
                .enumerate()
                .for_each(|(y, row)| projector.paint_row(layout, pass, tiles, y, row));
        });
        Arc::new(image)
    }
}
