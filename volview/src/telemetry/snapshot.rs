//! Point-in-time metric snapshots.
//!
//! Snapshots are plain values and serialise with `serde`, so the CLI can print
//! them or dump them as JSON.

use std::fmt;

use serde::Serialize;

/// Snapshot of [`CacheMetrics`](super::CacheMetrics).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CacheSnapshot {
    pub uptime_ms: u64,
    pub hits: u64,
    pub misses: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
    pub blocking_loads: u64,
    pub background_loads: u64,
    pub load_failures: u64,
    pub requests_queued: u64,
    pub requests_cancelled: u64,
    pub bytes_loaded: u64,
    pub total_load_time_ms: u64,
    pub evictions: u64,
    pub resident_tiles: usize,
    pub resident_bytes: u64,
}

impl CacheSnapshot {
    /// All loads, blocking and background.
    pub fn total_loads(&self) -> u64 {
        self.blocking_loads + self.background_loads
    }
}

impl fmt::Display for CacheSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "cache: {} hits / {} misses ({:.1}% hit rate)",
            self.hits,
            self.misses,
            self.hit_rate * 100.0
        )?;
        writeln!(
            f,
            "loads: {} blocking, {} background, {} failed ({} ms in loader)",
            self.blocking_loads, self.background_loads, self.load_failures, self.total_load_time_ms
        )?;
        write!(
            f,
            "resident: {} tiles, {} bytes; {} evictions",
            self.resident_tiles, self.resident_bytes, self.evictions
        )
    }
}

/// Snapshot of [`RenderMetrics`](super::RenderMetrics).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RenderSnapshot {
    pub uptime_ms: u64,
    pub frames_requested: u64,
    pub frames_published: u64,
    pub frames_cancelled: u64,
    pub passes_painted: u64,
    pub passes_skipped: u64,
    pub budget_stops: u64,
    pub io_capped_frames: u64,
    pub total_render_time_ms: u64,
    pub total_io_time_ms: u64,
    pub last_frame_ms: f64,
    pub mean_frame_ms: f64,
}

impl fmt::Display for RenderSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "frames: {} requested, {} published, {} cancelled",
            self.frames_requested, self.frames_published, self.frames_cancelled
        )?;
        writeln!(
            f,
            "passes: {} painted, {} skipped; {} budget stops, {} io-capped",
            self.passes_painted, self.passes_skipped, self.budget_stops, self.io_capped_frames
        )?;
        write!(
            f,
            "frame time: {:.2} ms mean, {:.2} ms last",
            self.mean_frame_ms, self.last_frame_ms
        )
    }
}
