//! Cache and renderer telemetry.
//!
//! Components record events on lock-free atomic counters; callers take cheap
//! point-in-time snapshots for display.
//!
//! ```text
//! VolatileCache ──────────► CacheMetrics ──┐
//! MultiResolutionRenderer ► RenderMetrics ─┴─► snapshot() ──► CLI / JSON
//! ```

mod metrics;
mod snapshot;

pub use metrics::{CacheMetrics, RenderMetrics};
pub use snapshot::{CacheSnapshot, RenderSnapshot};
