//! Cache sizing and loader pool configuration.

use crate::executor::DEFAULT_WORKER_THREADS;

/// Default byte ceiling (1 GiB).
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024 * 1024;

/// Configuration for a [`VolatileCache`](super::VolatileCache).
///
/// Either ceiling may be disabled with `None`; with both disabled the cache
/// grows without bound.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of resident tiles, valid or pending.
    pub max_tiles: Option<usize>,

    /// Maximum bytes held by valid tiles.
    pub max_bytes: Option<u64>,

    /// Number of background loader threads.
    pub loader_threads: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_tiles: None,
            max_bytes: Some(DEFAULT_MAX_BYTES),
            loader_threads: DEFAULT_WORKER_THREADS,
        }
    }
}

impl CacheConfig {
    /// Set the tile count ceiling.
    pub fn with_max_tiles(mut self, max_tiles: usize) -> Self {
        self.max_tiles = Some(max_tiles);
        self
    }

    /// Set the byte ceiling.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Remove both ceilings.
    pub fn unbounded(mut self) -> Self {
        self.max_tiles = None;
        self.max_bytes = None;
        self
    }

    /// Set the number of loader threads.
    pub fn with_loader_threads(mut self, threads: usize) -> Self {
        self.loader_threads = threads;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = CacheConfig::default()
            .unbounded()
            .with_max_tiles(10)
            .with_loader_threads(2);
        assert_eq!(config.max_tiles, Some(10));
        assert_eq!(config.max_bytes, None);
        assert_eq!(config.loader_threads, 2);
    }
}
