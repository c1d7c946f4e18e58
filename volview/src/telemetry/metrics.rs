//! Lock-free atomic metrics collection.
//!
//! All counters use `Relaxed` ordering: they are independent measurements and no
//! other memory is synchronised through them.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::snapshot::{CacheSnapshot, RenderSnapshot};

/// Counters maintained by the tile cache and its loader pool.
#[derive(Debug)]
pub struct CacheMetrics {
    start_time: Instant,

    // === Lookups ===
    /// Requests served from a valid tile
    hits: AtomicU64,
    /// Requests that found no valid tile
    misses: AtomicU64,

    // === Loads ===
    /// Synchronous loads on the caller's thread
    blocking_loads: AtomicU64,
    /// Loads executed by the background pool
    background_loads: AtomicU64,
    /// Loader failures (blocking and background)
    load_failures: AtomicU64,
    /// Budgeted requests added to the queue
    requests_queued: AtomicU64,
    /// Queued requests removed before a worker took them
    requests_cancelled: AtomicU64,
    /// Bytes published by successful loads
    bytes_loaded: AtomicU64,
    /// Time spent inside the loader, microseconds
    load_time_us: AtomicU64,

    // === Residency ===
    /// Tiles removed to satisfy the ceilings
    evictions: AtomicU64,
    /// Tiles currently cached (valid or pending)
    resident_tiles: AtomicUsize,
    /// Bytes held by valid tiles
    resident_bytes: AtomicU64,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    /// Creates a zeroed metrics instance.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            blocking_loads: AtomicU64::new(0),
            background_loads: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            requests_queued: AtomicU64::new(0),
            requests_cancelled: AtomicU64::new(0),
            bytes_loaded: AtomicU64::new(0),
            load_time_us: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            resident_tiles: AtomicUsize::new(0),
            resident_bytes: AtomicU64::new(0),
        }
    }

    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful load of `bytes` taking `elapsed`.
    pub fn load_completed(&self, blocking: bool, bytes: u64, elapsed: Duration) {
        if blocking {
            self.blocking_loads.fetch_add(1, Ordering::Relaxed);
        } else {
            self.background_loads.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_loaded.fetch_add(bytes, Ordering::Relaxed);
        self.load_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn load_failed(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_queued(&self) {
        self.requests_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_cancelled(&self, count: usize) {
        self.requests_cancelled
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn evicted(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Update the residency gauges.
    pub fn set_resident(&self, tiles: usize, bytes: u64) {
        self.resident_tiles.store(tiles, Ordering::Relaxed);
        self.resident_bytes.store(bytes, Ordering::Relaxed);
    }

    /// Total evictions so far.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> CacheSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheSnapshot {
            uptime_ms: self.start_time.elapsed().as_millis() as u64,
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            blocking_loads: self.blocking_loads.load(Ordering::Relaxed),
            background_loads: self.background_loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            requests_queued: self.requests_queued.load(Ordering::Relaxed),
            requests_cancelled: self.requests_cancelled.load(Ordering::Relaxed),
            bytes_loaded: self.bytes_loaded.load(Ordering::Relaxed),
            total_load_time_ms: self.load_time_us.load(Ordering::Relaxed) / 1000,
            evictions: self.evictions.load(Ordering::Relaxed),
            resident_tiles: self.resident_tiles.load(Ordering::Relaxed),
            resident_bytes: self.resident_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Counters maintained by the progressive renderer.
#[derive(Debug)]
pub struct RenderMetrics {
    start_time: Instant,

    frames_requested: AtomicU64,
    frames_published: AtomicU64,
    frames_cancelled: AtomicU64,
    passes_painted: AtomicU64,
    passes_skipped: AtomicU64,
    budget_stops: AtomicU64,
    io_capped_frames: AtomicU64,
    render_time_us: AtomicU64,
    io_time_us: AtomicU64,
    last_frame_us: AtomicU64,
}

impl Default for RenderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            frames_requested: AtomicU64::new(0),
            frames_published: AtomicU64::new(0),
            frames_cancelled: AtomicU64::new(0),
            passes_painted: AtomicU64::new(0),
            passes_skipped: AtomicU64::new(0),
            budget_stops: AtomicU64::new(0),
            io_capped_frames: AtomicU64::new(0),
            render_time_us: AtomicU64::new(0),
            io_time_us: AtomicU64::new(0),
            last_frame_us: AtomicU64::new(0),
        }
    }

    pub fn frame_requested(&self) {
        self.frames_requested.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a published frame and its timings.
    pub fn frame_published(&self, render: Duration, io: Duration) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
        let render_us = render.as_micros() as u64;
        self.render_time_us.fetch_add(render_us, Ordering::Relaxed);
        self.io_time_us
            .fetch_add(io.as_micros() as u64, Ordering::Relaxed);
        self.last_frame_us.store(render_us, Ordering::Relaxed);
    }

    pub fn frame_cancelled(&self) {
        self.frames_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pass_painted(&self) {
        self.passes_painted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pass_skipped(&self) {
        self.passes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn budget_stop(&self) {
        self.budget_stops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn io_capped(&self) {
        self.io_capped_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> RenderSnapshot {
        let published = self.frames_published.load(Ordering::Relaxed);
        let render_us = self.render_time_us.load(Ordering::Relaxed);
        RenderSnapshot {
            uptime_ms: self.start_time.elapsed().as_millis() as u64,
            frames_requested: self.frames_requested.load(Ordering::Relaxed),
            frames_published: published,
            frames_cancelled: self.frames_cancelled.load(Ordering::Relaxed),
            passes_painted: self.passes_painted.load(Ordering::Relaxed),
            passes_skipped: self.passes_skipped.load(Ordering::Relaxed),
            budget_stops: self.budget_stops.load(Ordering::Relaxed),
            io_capped_frames: self.io_capped_frames.load(Ordering::Relaxed),
            total_render_time_ms: render_us / 1000,
            total_io_time_ms: self.io_time_us.load(Ordering::Relaxed) / 1000,
            last_frame_ms: self.last_frame_us.load(Ordering::Relaxed) as f64 / 1000.0,
            mean_frame_ms: if published == 0 {
                0.0
            } else {
                render_us as f64 / published as f64 / 1000.0
            },
        }
    }
}
