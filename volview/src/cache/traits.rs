//! Seams between the cache and its collaborators.
//!
//! The cache never produces pixels itself. A [`TileLoader`] supplied by the host
//! (an HDF5 reader, a remote block store, a synthetic generator in tests) is the only
//! thing that touches storage. Load failures are reported to a [`DiagnosticsSink`],
//! and successful background loads fire a [`RepaintCallback`].

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::coord::{CoordError, TileCoord};

/// Errors a [`TileLoader`] may report for a single tile.
#[derive(Debug, Error)]
pub enum LoadError {
    /// I/O error while reading the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored block could not be decoded.
    #[error("Malformed block: {0}")]
    Format(String),

    /// The backing store cannot serve this tile right now.
    #[error("Tile unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the cache facade.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The loader could not produce data for a blocking request. The tile stays
    /// invalid; the facade does not retry.
    #[error("Failed to load tile {coord}: {source}")]
    LoadFailure {
        coord: TileCoord,
        #[source]
        source: LoadError,
    },

    /// The coordinate does not address a cell of the dataset.
    #[error(transparent)]
    InvalidCoord(#[from] CoordError),

    /// A loader worker thread could not be started.
    #[error("Failed to spawn loader worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Pixel data stored in one tile.
///
/// The cache is generic over the block type; it only needs to know how much
/// memory a block occupies to enforce the byte ceiling.
pub trait TileData: Send + Sync + 'static {
    /// Heap footprint of the block in bytes.
    fn size_bytes(&self) -> usize;
}

impl TileData for Vec<u8> {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

impl TileData for Vec<u16> {
    fn size_bytes(&self) -> usize {
        self.len() * std::mem::size_of::<u16>()
    }
}

/// Produces the pixel block for a tile coordinate.
///
/// Called concurrently from several loader workers for *different* coordinates.
/// The cache guarantees that at most one call per coordinate is in flight, so
/// implementations need not guard against duplicate concurrent loads.
pub trait TileLoader<P>: Send + Sync {
    /// Load the block for `coord`, blocking the calling thread.
    fn load(&self, coord: &TileCoord) -> Result<P, LoadError>;
}

/// Any suitable closure is a loader.
impl<P, F> TileLoader<P> for F
where
    F: Fn(&TileCoord) -> Result<P, LoadError> + Send + Sync,
{
    fn load(&self, coord: &TileCoord) -> Result<P, LoadError> {
        self(coord)
    }
}

/// Receives reports about background load failures.
pub trait DiagnosticsSink: Send + Sync {
    /// A background load for `coord` failed; the request has been dropped.
    fn load_failed(&self, coord: &TileCoord, error: &LoadError);
}

/// Default sink: reports failures through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn load_failed(&self, coord: &TileCoord, error: &LoadError) {
        warn!(
            timepoint = coord.timepoint,
            view = coord.view,
            level = coord.level,
            cell = coord.cell,
            error = %error,
            "Background tile load failed"
        );
    }
}

/// No-argument callback fired after a background load publishes new data.
///
/// It may be called from any loader worker; debouncing is the host's concern.
pub type RepaintCallback = Arc<dyn Fn() + Send + Sync>;
