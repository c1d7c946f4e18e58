//! A single slot in the tile store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::traits::{LoadError, TileLoader};
use crate::coord::TileCoord;

/// Result of [`TileEntry::load_with`].
#[derive(Debug)]
pub(crate) enum EntryLoad<P> {
    /// Another caller published the data first.
    AlreadyValid(Arc<P>),
    /// This call loaded and published the data.
    Loaded(Arc<P>),
    /// The entry was evicted before the load could start.
    Evicted,
    /// The loader failed; the entry stays pending.
    Failed(LoadError),
    /// An earlier load failed and the failure has not been cleared.
    PreviouslyFailed(String),
}

/// Cache slot for one tile coordinate.
///
/// Data is published at most once. `load_lock` is held for the whole duration of a
/// load, which both serialises loads of the same coordinate and keeps the eviction
/// path (which only ever `try_lock`s) away from entries being loaded.
///
/// A failed load is remembered: further loads are refused until
/// [`clear_failure`](Self::clear_failure).
pub(crate) struct TileEntry<P> {
    coord: TileCoord,
    data: OnceLock<Arc<P>>,
    load_lock: Mutex<()>,
    loading: AtomicBool,
    evicted: AtomicBool,
    failure: Mutex<Option<String>>,
    last_frame: AtomicU64,
}

impl<P> TileEntry<P> {
    pub(crate) fn new(coord: TileCoord) -> Self {
        Self {
            coord,
            data: OnceLock::new(),
            load_lock: Mutex::new(()),
            loading: AtomicBool::new(false),
            evicted: AtomicBool::new(false),
            failure: Mutex::new(None),
            last_frame: AtomicU64::new(0),
        }
    }

    pub(crate) fn coord(&self) -> TileCoord {
        self.coord
    }

    pub(crate) fn data(&self) -> Option<Arc<P>> {
        self.data.get().cloned()
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.data.get().is_some()
    }

    pub(crate) fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Record an access by the frame `frame`.
    pub(crate) fn touch(&self, frame: u64) {
        self.last_frame.fetch_max(frame, Ordering::AcqRel);
    }

    pub(crate) fn last_frame(&self) -> u64 {
        self.last_frame.load(Ordering::Acquire)
    }

    /// Whether the last load failed.
    pub(crate) fn has_failed(&self) -> bool {
        self.failure.lock().is_some()
    }

    /// Forget a failed load so the next request loads again. Returns whether the
    /// entry had failed.
    pub(crate) fn clear_failure(&self) -> bool {
        self.failure.lock().take().is_some()
    }

    /// Load and publish the data unless it is already there.
    ///
    /// Blocks while another thread is loading the same entry, then returns its
    /// result without calling the loader again. `on_publish` runs under the load
    /// lock right after the data becomes visible.
    pub(crate) fn load_with(
        &self,
        loader: &dyn TileLoader<P>,
        on_publish: impl FnOnce(&P),
    ) -> EntryLoad<P> {
        let _guard = self.load_lock.lock();
        if let Some(data) = self.data.get() {
            return EntryLoad::AlreadyValid(Arc::clone(data));
        }
        if self.evicted.load(Ordering::Acquire) {
            return EntryLoad::Evicted;
        }
        if let Some(reason) = self.failure.lock().clone() {
            return EntryLoad::PreviouslyFailed(reason);
        }

        self.loading.store(true, Ordering::Release);
        // Data or failure becomes visible before the entry stops counting as loading
        let outcome = match loader.load(&self.coord) {
            Ok(block) => {
                let data = Arc::new(block);
                // Only this thread can publish while holding the lock
                let published = self.data.get_or_init(|| Arc::clone(&data));
                on_publish(published);
                EntryLoad::Loaded(Arc::clone(published))
            }
            Err(e) => {
                *self.failure.lock() = Some(e.to_string());
                EntryLoad::Failed(e)
            }
        };
        self.loading.store(false, Ordering::Release);
        outcome
    }

    /// Mark the entry evicted if no load is running, then run `remove` while still
    /// holding the load lock so no load can start in between.
    ///
    /// Returns `false` (and does nothing) when a load is in flight or the entry
    /// is already evicted.
    pub(crate) fn evict_with(&self, remove: impl FnOnce()) -> bool {
        let Some(_guard) = self.load_lock.try_lock() else {
            return false;
        };
        if self.loading.load(Ordering::Acquire) || self.is_evicted() {
            return false;
        }
        self.evicted.store(true, Ordering::Release);
        remove();
        true
    }

    /// Like [`evict_with`](Self::evict_with) but waits for an in-flight load to finish.
    pub(crate) fn evict_blocking(&self, remove: impl FnOnce()) -> bool {
        let _guard = self.load_lock.lock();
        if self.is_evicted() {
            return false;
        }
        self.evicted.store(true, Ordering::Release);
        remove();
        true
    }

    pub(crate) fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }
}
