//! Volatile tile cache.
//!
//! Tiles are cells of the dataset pyramid, each either a pending placeholder or
//! loaded data. The cache owns a pool of loader threads and a bounded, evictable
//! tile store; hosts plug in storage through [`TileLoader`].
//!
//! # Architecture
//!
//! ```text
//!             get_tile(coord, hints)
//!                      │
//!                      ▼
//!              ┌───────────────┐   valid    ┌──────────────┐
//!              │ VolatileCache │──────────► │ TileHandle   │
//!              └───────┬───────┘            └──────────────┘
//!          Blocking    │    Budgeted
//!        ┌─────────────┴─────────────┐
//!        ▼                           ▼
//!  TileLoader::load            RequestQueue ──► LoadScheduler workers
//!  (caller's thread)                                  │
//!                                                     ▼
//!                                   TileLoader::load, publish, RepaintCallback
//! ```

mod config;
mod entry;
mod lru;
mod store;
mod traits;
mod types;

pub use config::{CacheConfig, DEFAULT_MAX_BYTES};
pub use store::VolatileCache;
pub use traits::{
    CacheError, DiagnosticsSink, LoadError, RepaintCallback, TileData, TileLoader,
    TracingDiagnostics,
};
pub use types::{CacheHints, LoadingStrategy, TileHandle, TileState};
