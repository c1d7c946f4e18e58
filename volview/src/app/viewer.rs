//! Viewer bootstrap.
//!
//! Wires the tile cache, its loader pool, the renderer and the paint thread
//! together in the right order, and tears them down in reverse on drop.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::AppError;
use crate::cache::{TileData, TileLoader, TracingDiagnostics, VolatileCache};
use crate::config::ViewerConfig;
use crate::coord::DatasetLayout;
use crate::render::{
    FrameRequest, MultiResolutionRenderer, PainterThread, Projector, RenderTarget,
};
use crate::telemetry::{CacheSnapshot, RenderSnapshot};

/// A running viewer: cache, loader pool, renderer and paint thread.
///
/// The host sets the view; the paint thread renders it and keeps refining as
/// tiles arrive. Dropping the viewer stops the paint thread, then the loaders.
pub struct Viewer<P: TileData> {
    painter: PainterThread,
    renderer: Arc<MultiResolutionRenderer<P>>,
    view: Arc<Mutex<Option<FrameRequest>>>,
    config: ViewerConfig,
}

impl<P: TileData> Viewer<P> {
    /// Start a viewer over `layout`.
    ///
    /// Invalid configuration is rejected before any thread is spawned.
    pub fn start(
        config: ViewerConfig,
        layout: DatasetLayout,
        loader: Arc<dyn TileLoader<P>>,
        projector: Arc<dyn Projector<P>>,
        target: Arc<dyn RenderTarget>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let cache = Arc::new(VolatileCache::with_parts(
            layout,
            loader,
            Arc::new(TracingDiagnostics),
            config.cache.clone(),
        )?);
        let renderer = Arc::new(MultiResolutionRenderer::new(
            Arc::clone(&cache),
            projector,
            target,
            config.render.clone(),
        )?);

        let view: Arc<Mutex<Option<FrameRequest>>> = Arc::new(Mutex::new(None));
        let paint_renderer = Arc::clone(&renderer);
        let paint_view = Arc::clone(&view);
        let painter = PainterThread::start(Arc::new(move || {
            let Some(request) = *paint_view.lock() else {
                return;
            };
            match paint_renderer.render(request) {
                Ok(report) => debug!(
                    outcome = ?report.outcome,
                    termination = ?report.termination,
                    "Frame rendered"
                ),
                Err(e) => warn!(error = %e, "Frame rejected"),
            }
        }))
        .map_err(AppError::Painter)?;

        let repaint = painter.signal().as_callback();
        cache.set_repaint_callback(Arc::clone(&repaint));
        renderer.set_repaint_callback(repaint);

        info!(
            loader_threads = cache.loader_threads(),
            rendering_threads = config.render.rendering_threads,
            "Viewer started"
        );

        Ok(Self {
            painter,
            renderer,
            view,
            config,
        })
    }

    /// Show `request`; any frame still rendering an older view is cancelled.
    pub fn set_view(&self, request: FrameRequest) {
        *self.view.lock() = Some(request);
        self.renderer.cancel();
        self.painter.request_repaint();
    }

    /// The view currently shown.
    pub fn view(&self) -> Option<FrameRequest> {
        *self.view.lock()
    }

    /// Schedule a repaint of the current view.
    pub fn request_repaint(&self) {
        self.painter.request_repaint();
    }

    /// Drop pending loads for timepoints other than `timepoint`.
    ///
    /// Returns the number of requests removed.
    pub fn prune_pending(&self, timepoint: u32) -> usize {
        self.cache().retain_pending(|coord| coord.timepoint == timepoint)
    }

    pub fn renderer(&self) -> &Arc<MultiResolutionRenderer<P>> {
        &self.renderer
    }

    pub fn cache(&self) -> &Arc<VolatileCache<P>> {
        self.renderer.cache()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn cache_snapshot(&self) -> CacheSnapshot {
        self.cache().metrics().snapshot()
    }

    pub fn render_snapshot(&self) -> RenderSnapshot {
        self.renderer.metrics().snapshot()
    }

    /// Stop painting and discard pending loads.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.renderer.cancel();
        self.painter.shutdown();
        let cache = self.cache();
        cache.clear_repaint_callback();
        cache.retain_pending(|_| false);
    }
}

impl<P: TileData> Drop for Viewer<P> {
    fn drop(&mut self) {
        self.stop();
    }
}
