//! Integration tests for the progressive renderer.
//!
//! These tests render frames against a real cache and loader pool:
//! - Coarse-to-fine refinement and the quality budget
//! - Cancellation of superseded frames
//! - I/O backoff under sustained slow loads
//! - The viewer bootstrap with its paint thread
//!
//! Run with: `cargo test --test render_integration`

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use volview::app::{AppError, Viewer};
use volview::cache::{CacheConfig, LoadError, TileLoader, VolatileCache};
use volview::config::{ConfigError, ViewerConfig};
use volview::coord::{DatasetLayout, TileCoord};
use volview::render::{
    FrameOutcome, FrameRequest, FrameSlot, FrameTermination, MultiResolutionRenderer,
    RenderSettings, SliceProjector, U16Block, ViewTransform,
};

// ============================================================================
// Helper Functions
// ============================================================================

/// 64x64 slices, 16x16 cells, three levels; level 2 is a single cell.
fn layout(timepoints: u32) -> DatasetLayout {
    DatasetLayout::pyramid(timepoints, 1, [64, 64, 1], [16, 16, 1], 3, 2).unwrap()
}

/// Loader producing constant blocks after `latency`, recording its first call.
struct SyntheticLoader {
    layout: DatasetLayout,
    latency: Duration,
    started: AtomicBool,
}

impl SyntheticLoader {
    fn new(layout: DatasetLayout, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            layout,
            latency,
            started: AtomicBool::new(false),
        })
    }
}

impl TileLoader<U16Block> for SyntheticLoader {
    fn load(&self, coord: &TileCoord) -> Result<U16Block, LoadError> {
        self.started.store(true, Ordering::SeqCst);
        thread::sleep(self.latency);
        let grid = self
            .layout
            .level(coord.level)
            .ok_or_else(|| LoadError::Format("unknown level".into()))?;
        let size = grid.cell_interval(coord.cell).size;
        let voxels = size.iter().map(|&s| s as usize).product();
        U16Block::new(size, vec![40_000; voxels])
    }
}

/// Loader whose first attempt at one coordinate fails.
struct FlakyLoader {
    inner: Arc<SyntheticLoader>,
    flaky: TileCoord,
    attempts: AtomicUsize,
}

impl TileLoader<U16Block> for FlakyLoader {
    fn load(&self, coord: &TileCoord) -> Result<U16Block, LoadError> {
        if *coord == self.flaky && self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(LoadError::Unavailable("disk offline".into()));
        }
        self.inner.load(coord)
    }
}

fn renderer(
    loader: Arc<SyntheticLoader>,
    settings: RenderSettings,
) -> (Arc<MultiResolutionRenderer<U16Block>>, Arc<FrameSlot>) {
    let layout = loader.layout.clone();
    renderer_with(layout, loader, settings)
}

fn renderer_with(
    layout: DatasetLayout,
    loader: Arc<dyn TileLoader<U16Block>>,
    settings: RenderSettings,
) -> (Arc<MultiResolutionRenderer<U16Block>>, Arc<FrameSlot>) {
    let cache = Arc::new(
        VolatileCache::<U16Block>::with_parts(
            layout,
            loader,
            Arc::new(volview::cache::TracingDiagnostics),
            CacheConfig::default(),
        )
        .unwrap(),
    );
    let slot = Arc::new(FrameSlot::new());
    let renderer = MultiResolutionRenderer::new(
        cache,
        Arc::new(SliceProjector::default()),
        slot.clone(),
        settings,
    )
    .unwrap();
    (Arc::new(renderer), slot)
}

fn request(timepoint: u32, x: f64) -> FrameRequest {
    FrameRequest::new(
        timepoint,
        0,
        ViewTransform::new(1.0).with_translation(x, 0.0),
        64,
        64,
    )
}

fn wait_for(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// With a zero quality budget only the coarse pass is painted.
#[test]
fn test_zero_budget_paints_one_coarse_pass() {
    let loader = SyntheticLoader::new(layout(1), Duration::ZERO);
    let settings = RenderSettings::default().with_quality_budget(Duration::ZERO);
    let coarsest = settings.coarsest_scale_index();
    let (renderer, slot) = renderer(loader, settings);

    let report = renderer.render(request(0, 0.0)).unwrap();
    assert_eq!(report.outcome, FrameOutcome::Done);
    assert_eq!(report.termination, Some(FrameTermination::BudgetExceeded));
    assert_eq!(report.passes_painted, 1);
    assert_eq!(report.scale_index, Some(coarsest));
    assert_eq!(report.invalid_tiles, 0);

    let image = slot.latest().unwrap();
    assert_eq!((image.width(), image.height()), (8, 8));

    // Repeating the request stays coarse
    let again = renderer.render(request(0, 0.0)).unwrap();
    assert_eq!(again.scale_index, Some(coarsest));
}

/// The first coarse pass blocks for its tiles, so the first frame shows data.
#[test]
fn test_first_frame_has_no_gaps() {
    let loader = SyntheticLoader::new(layout(1), Duration::from_millis(5));
    let settings = RenderSettings::default().with_quality_budget(Duration::ZERO);
    let (renderer, slot) = renderer(loader, settings);

    renderer.render(request(0, 0.0)).unwrap();
    let image = slot.latest().unwrap();
    let background = volview::render::DEFAULT_BACKGROUND;
    assert!(image.pixels().iter().all(|&p| p != background));
}

/// Given enough budget a frame refines down to the full-resolution scale.
#[test]
fn test_generous_budget_reaches_finest_scale() {
    let loader = SyntheticLoader::new(layout(1), Duration::ZERO);
    let settings = RenderSettings::default().with_quality_budget(Duration::from_secs(60));
    let (renderer, slot) = renderer(loader, settings);

    let first = renderer.render(request(0, 0.0)).unwrap();
    assert_eq!(first.termination, Some(FrameTermination::Completed));
    assert_eq!(first.scale_index, Some(0));

    // Once the full-resolution tiles are resident, a repaint goes straight there
    let cache = renderer.cache();
    assert!(wait_for(|| (0..16).all(|cell| {
        cache
            .peek(&TileCoord::new(0, 0, 0, cell))
            .is_some_and(|tile| tile.is_valid())
    })));
    let second = renderer.render(request(0, 0.0)).unwrap();
    assert_eq!(second.termination, Some(FrameTermination::Completed));
    assert_eq!(second.scale_index, Some(0));
    assert_eq!(second.invalid_tiles, 0);
    assert_eq!(second.passes_painted, 1);
    assert_eq!(slot.published(), 2);
}

/// A second request arriving mid-frame cancels the first; only the second
/// is published.
#[test]
fn test_back_to_back_requests_publish_only_the_second() {
    let loader = SyntheticLoader::new(layout(1), Duration::from_millis(150));
    let (renderer, slot) = renderer(Arc::clone(&loader), RenderSettings::default());

    let first_renderer = Arc::clone(&renderer);
    let first = thread::spawn(move || first_renderer.render(request(0, 0.0)).unwrap());

    assert!(wait_for(|| loader.started.load(Ordering::SeqCst)));
    let second = renderer.render(request(0, 8.0)).unwrap();
    let first = first.join().unwrap();

    assert_eq!(first.outcome, FrameOutcome::Cancelled);
    assert_eq!(second.outcome, FrameOutcome::Done);
    assert_eq!(slot.published(), 1);
    assert_eq!(renderer.metrics().snapshot().frames_cancelled, 1);
}

/// An explicitly cancelled frame never reaches the render target.
#[test]
fn test_cancelled_frame_never_publishes() {
    let loader = SyntheticLoader::new(layout(1), Duration::from_millis(100));
    let (renderer, slot) = renderer(Arc::clone(&loader), RenderSettings::default());

    let frame_renderer = Arc::clone(&renderer);
    let frame = thread::spawn(move || frame_renderer.render(request(0, 0.0)).unwrap());

    assert!(wait_for(|| loader.started.load(Ordering::SeqCst)));
    renderer.cancel();
    let report = frame.join().unwrap();

    assert_eq!(report.outcome, FrameOutcome::Cancelled);
    assert!(report.termination.is_none());
    assert_eq!(slot.published(), 0);
}

/// A rejected request does not supersede the valid frame in progress.
#[test]
fn test_rejected_request_keeps_frame_in_progress() {
    let loader = SyntheticLoader::new(layout(1), Duration::from_millis(100));
    let (renderer, slot) = renderer(Arc::clone(&loader), RenderSettings::default());

    let frame_renderer = Arc::clone(&renderer);
    let frame = thread::spawn(move || frame_renderer.render(request(0, 0.0)).unwrap());

    assert!(wait_for(|| loader.started.load(Ordering::SeqCst)));
    let bad_zoom = FrameRequest::new(0, 0, ViewTransform::new(0.0), 64, 64);
    assert!(renderer.render(bad_zoom).is_err());
    let report = frame.join().unwrap();

    assert_eq!(report.outcome, FrameOutcome::Done);
    assert_eq!(slot.published(), 1);
    assert_eq!(renderer.metrics().snapshot().frames_cancelled, 0);
}

/// A tile whose load failed stays invalid across repaints and view changes and
/// is loaded again only after an explicit retry.
#[test]
fn test_failed_tile_is_not_reloaded_across_frames() {
    let layout = layout(1);
    // The coarse pass of a 64x64 screen at zoom 1 reads the single level-2 cell
    let flaky = TileCoord::new(0, 0, 2, 0);
    let loader = Arc::new(FlakyLoader {
        inner: SyntheticLoader::new(layout.clone(), Duration::ZERO),
        flaky,
        attempts: AtomicUsize::new(0),
    });
    let settings = RenderSettings::default().with_quality_budget(Duration::ZERO);
    let (renderer, slot) = renderer_with(layout, loader.clone(), settings);

    for x in [0.0, 0.0, 0.0, 4.0, 4.0] {
        let report = renderer.render(request(0, x)).unwrap();
        assert_eq!(report.outcome, FrameOutcome::Done);
        assert_eq!(report.level, Some(2));
        assert_eq!(report.invalid_tiles, 1);
        // Room for a wrongly queued background load to run
        thread::sleep(Duration::from_millis(30));
    }
    assert_eq!(loader.attempts.load(Ordering::SeqCst), 1);
    assert!(!renderer.cache().is_queued(&flaky));
    assert_eq!(slot.published(), 5);

    assert!(renderer.cache().retry(&flaky));
    let report = renderer.render(request(0, 8.0)).unwrap();
    assert_eq!(report.invalid_tiles, 0);
    assert_eq!(loader.attempts.load(Ordering::SeqCst), 2);
}

/// Sustained slow blocking loads cap refinement; a fast frame lifts the cap.
#[test]
fn test_slow_io_caps_refinement() {
    let loader = SyntheticLoader::new(layout(8), Duration::from_millis(20));
    let settings = RenderSettings::default()
        .with_quality_budget(Duration::from_secs(60))
        .with_io_budget(Duration::from_millis(10), 2);
    let coarsest = settings.coarsest_scale_index();
    let (renderer, _slot) = renderer(loader, settings);

    // Each new timepoint needs a fresh blocking coarse load
    for timepoint in 0..2 {
        let report = renderer.render(request(timepoint, 0.0)).unwrap();
        assert_eq!(report.termination, Some(FrameTermination::Completed));
        assert!(report.io_time >= Duration::from_millis(10));
    }
    assert!(renderer.is_io_capped());

    let capped = renderer.render(request(2, 0.0)).unwrap();
    assert_eq!(capped.termination, Some(FrameTermination::IoCapped));
    assert_eq!(capped.scale_index, Some(coarsest));
    assert_eq!(capped.passes_painted, 1);

    // Repainting the same view does no blocking I/O
    let fast = renderer.render(request(2, 0.0)).unwrap();
    assert!(fast.io_time < Duration::from_millis(10));
    assert!(!renderer.is_io_capped());
    assert_eq!(renderer.metrics().snapshot().io_capped_frames, 2);
}

/// The viewer paints the view it is given and keeps refining as tiles land.
#[test]
fn test_viewer_paints_and_refines() {
    let layout = layout(1);
    let loader = SyntheticLoader::new(layout.clone(), Duration::from_millis(2));
    let slot = Arc::new(FrameSlot::new());
    let mut config = ViewerConfig::default();
    config.render.quality_budget = Duration::from_millis(5);

    let viewer = Viewer::<U16Block>::start(
        config,
        layout,
        loader,
        Arc::new(SliceProjector::default()),
        slot.clone(),
    )
    .unwrap();

    viewer.set_view(request(0, 0.0));
    assert!(wait_for(|| slot.published() >= 1));
    // Tile arrivals and budget stops keep the painter going until full resolution
    assert!(wait_for(|| slot.latest().is_some_and(|image| image.width() == 64)));
    assert!(viewer.render_snapshot().frames_published >= 2);
    viewer.shutdown();
}

/// Invalid configuration is rejected before anything starts.
#[test]
fn test_viewer_rejects_invalid_config() {
    let layout = layout(1);
    let loader = SyntheticLoader::new(layout.clone(), Duration::ZERO);
    let mut config = ViewerConfig::default();
    config.render.rendering_threads = 0;

    let result = Viewer::<U16Block>::start(
        config,
        layout,
        loader,
        Arc::new(SliceProjector::default()),
        Arc::new(FrameSlot::new()),
    );
    assert!(matches!(
        result,
        Err(AppError::Config(ConfigError::ZeroThreads("rendering_threads")))
    ));
}
