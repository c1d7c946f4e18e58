//! Value types exchanged with the cache: loading hints, tile state and handles.

use std::fmt;
use std::sync::Arc;

use super::entry::TileEntry;
use crate::coord::TileCoord;
use crate::executor::Priority;

/// How a missing tile is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadingStrategy {
    /// Load synchronously on the calling thread; never returns a placeholder.
    Blocking,
    /// Return a placeholder immediately and load in the background.
    Budgeted,
}

impl fmt::Display for LoadingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadingStrategy::Blocking => write!(f, "blocking"),
            LoadingStrategy::Budgeted => write!(f, "budgeted"),
        }
    }
}

/// Per-request loading instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheHints {
    /// Blocking or budgeted load.
    pub strategy: LoadingStrategy,

    /// Queue priority for budgeted loads (lower is served first).
    pub priority: Priority,

    /// Serve before other requests of the same priority.
    pub enqueue_to_front: bool,
}

impl CacheHints {
    /// Hints for a synchronous load.
    pub fn blocking(priority: Priority) -> Self {
        Self {
            strategy: LoadingStrategy::Blocking,
            priority,
            enqueue_to_front: false,
        }
    }

    /// Hints for a background load.
    pub fn budgeted(priority: Priority) -> Self {
        Self {
            strategy: LoadingStrategy::Budgeted,
            priority,
            enqueue_to_front: false,
        }
    }

    /// Hints for a tile at `level`, prioritised by how coarse the level is.
    pub fn for_level(strategy: LoadingStrategy, max_level: u8, level: u8) -> Self {
        Self {
            strategy,
            priority: Priority::for_level(max_level, level),
            enqueue_to_front: false,
        }
    }

    /// Same hints, enqueued to the front of their priority band.
    pub fn to_front(mut self) -> Self {
        self.enqueue_to_front = true;
        self
    }
}

/// Validity of a tile.
///
/// A tile only ever moves from `Pending` to `Ready`.
#[derive(Debug)]
pub enum TileState<P> {
    /// Placeholder; the data has not been loaded yet.
    Pending,
    /// Loaded data.
    Ready(Arc<P>),
}

impl<P> Clone for TileState<P> {
    fn clone(&self) -> Self {
        match self {
            TileState::Pending => TileState::Pending,
            TileState::Ready(data) => TileState::Ready(Arc::clone(data)),
        }
    }
}

impl<P> TileState<P> {
    /// Whether the tile holds real data.
    pub fn is_ready(&self) -> bool {
        matches!(self, TileState::Ready(_))
    }
}

/// Shared reference to a cached tile.
///
/// A handle obtained for a placeholder observes the data once a background load
/// publishes it, even if the tile has since been evicted from the cache.
pub struct TileHandle<P> {
    entry: Arc<TileEntry<P>>,
}

impl<P> Clone for TileHandle<P> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
        }
    }
}

impl<P> fmt::Debug for TileHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileHandle")
            .field("coord", &self.entry.coord())
            .field("valid", &self.entry.is_valid())
            .finish()
    }
}

impl<P> TileHandle<P> {
    pub(crate) fn new(entry: Arc<TileEntry<P>>) -> Self {
        Self { entry }
    }

    /// Coordinate of the tile.
    pub fn coord(&self) -> TileCoord {
        self.entry.coord()
    }

    /// Current state of the tile.
    pub fn state(&self) -> TileState<P> {
        match self.entry.data() {
            Some(data) => TileState::Ready(data),
            None => TileState::Pending,
        }
    }

    /// The loaded data, if any.
    pub fn data(&self) -> Option<Arc<P>> {
        self.entry.data()
    }

    /// Whether the tile holds real data.
    pub fn is_valid(&self) -> bool {
        self.entry.is_valid()
    }
    /// Whether the last load of this tile failed. A failed tile is not loaded
    /// again until [`VolatileCache::retry`](super::VolatileCache::retry).
    pub fn has_failed(&self) -> bool {
        self.entry.has_failed()
    }
}
