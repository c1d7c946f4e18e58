//! The volatile tile cache facade.
//!
//! [`VolatileCache`] maps tile coordinates to entries that are either a pending
//! placeholder or published data. Lookups never wait on background loads: a
//! budgeted request for a missing tile returns its placeholder immediately and
//! queues the load, a blocking request loads on the calling thread.
//!
//! # Eviction
//!
//! When the tile or byte ceiling is exceeded, entries are dropped in this order:
//! pending placeholders first, then valid tiles, least recently accessed first.
//! An entry is never evicted while
//! - its load is in flight,
//! - it was touched by the frame currently being rendered
//!   (see [`prepare_next_frame`](VolatileCache::prepare_next_frame)),
//! - it is the tile being returned by the request that triggered eviction.
//!
//! Evicting a placeholder also cancels its queued load.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::config::CacheConfig;
use super::entry::{EntryLoad, TileEntry};
use super::lru::LruIndex;
use super::traits::{
    CacheError, DiagnosticsSink, LoadError, RepaintCallback, TileData, TileLoader,
    TracingDiagnostics,
};
use super::types::{CacheHints, LoadingStrategy, TileHandle};
use crate::coord::{DatasetLayout, TileCoord};
use crate::executor::{
    LoadOutcome, LoadScheduler, LoadTarget, PushOutcome, QueuedLoad, RequestQueue,
    SchedulerConfig,
};
use crate::telemetry::CacheMetrics;

/// Candidates taken from the LRU index per lock acquisition.
const EVICTION_BATCH: usize = 32;

/// Shared state behind the facade; also the target the loader pool executes on.
struct CacheCore<P> {
    layout: DatasetLayout,
    loader: Arc<dyn TileLoader<P>>,
    tiles: DashMap<TileCoord, Arc<TileEntry<P>>>,
    /// Lock order: a `tiles` shard may be held while taking `lru`, never the reverse
    lru: Mutex<LruIndex<P>>,
    queue: Arc<RequestQueue>,
    max_tiles: Option<usize>,
    max_bytes: Option<u64>,
    metrics: Arc<CacheMetrics>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    repaint: RwLock<Option<RepaintCallback>>,
    /// Last stamp handed out by `prepare_next_frame`
    frame: AtomicU64,
    /// Stamp of the frame being rendered, 0 when none
    in_flight: AtomicU64,
    /// LRU clock
    tick: AtomicU64,
    /// Bytes held by valid resident tiles
    bytes: AtomicU64,
    /// Set when a pass found nothing evictable under the frame's pins; cleared when
    /// pins are released or a load finishes
    eviction_blocked: AtomicBool,
    eviction_lock: Mutex<()>,
}

impl<P: TileData> CacheCore<P> {
    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Existing entry for `coord`, or a new placeholder (evicting to make room).
    fn entry_for(&self, coord: TileCoord) -> Arc<TileEntry<P>> {
        let frame = self.in_flight.load(Ordering::Acquire);
        let tick = self.next_tick();
        let entry = match self.tiles.entry(coord) {
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            Entry::Vacant(vacant) => {
                let entry = Arc::new(TileEntry::new(coord));
                entry.touch(frame);
                // Keep the shard locked until the index knows the entry
                let slot = vacant.insert(Arc::clone(&entry));
                self.lru.lock().insert(&entry, tick);
                drop(slot);
                self.enforce_limits(Some(coord));
                return entry;
            }
        };
        entry.touch(frame);
        self.lru.lock().touch(&entry, tick);
        entry
    }

    fn publish_bytes(&self, data: &P) {
        self.bytes
            .fetch_add(data.size_bytes() as u64, Ordering::AcqRel);
    }

    /// Bookkeeping after `entry` finished a load, successful or not.
    fn load_finished(&self, entry: &Arc<TileEntry<P>>, loaded: bool) {
        if loaded {
            self.lru.lock().mark_valid(entry);
        }
        // Only an entry outside the frame's pins adds an eviction candidate
        let pinned = self.in_flight.load(Ordering::Acquire);
        if pinned == 0 || entry.last_frame() != pinned {
            self.eviction_blocked.store(false, Ordering::Release);
        }
    }

    fn over_limits(&self) -> bool {
        let over_count = self.max_tiles.is_some_and(|max| self.tiles.len() > max);
        let over_bytes = self
            .max_bytes
            .is_some_and(|max| self.bytes.load(Ordering::Acquire) > max);
        over_count || over_bytes
    }

    fn update_gauges(&self) {
        self.metrics
            .set_resident(self.tiles.len(), self.bytes.load(Ordering::Acquire));
    }

    /// Evict until both ceilings hold or no evictable entry is left.
    ///
    /// Walks the LRU index from the front in small batches. When the walk ends with
    /// the ceilings still exceeded because of the frame's pins, later calls return
    /// at once until the pins are released or a load finishes.
    fn enforce_limits(&self, protect: Option<TileCoord>) {
        let _eviction = self.eviction_lock.lock();
        if !self.over_limits() || self.eviction_blocked.load(Ordering::Acquire) {
            self.update_gauges();
            return;
        }

        let pinned = self.in_flight.load(Ordering::Acquire);
        let evictable = |entry: &TileEntry<P>| {
            Some(entry.coord()) != protect
                && !entry.is_loading()
                && (pinned == 0 || entry.last_frame() != pinned)
        };

        let mut cursor = None;
        loop {
            let batch = self.lru.lock().candidates(cursor, EVICTION_BATCH, &evictable);
            for entry in &batch.entries {
                if !self.over_limits() {
                    break;
                }
                self.evict(entry);
            }
            if !self.over_limits() {
                break;
            }
            match batch.resume_after {
                Some(key) => cursor = Some(key),
                None => {
                    if pinned != 0 {
                        self.eviction_blocked.store(true, Ordering::Release);
                        debug!(
                            frame = pinned,
                            resident = self.tiles.len(),
                            "Ceiling exceeded by pinned tiles, eviction deferred"
                        );
                    }
                    break;
                }
            }
        }
        self.update_gauges();
    }

    /// Remove `entry` unless a load is running on it. Returns whether it went.
    fn evict(&self, entry: &Arc<TileEntry<P>>) -> bool {
        let coord = entry.coord();
        let mut removed = false;
        let evicted = entry.evict_with(|| removed = self.remove_tile(entry));
        if !evicted {
            return false;
        }
        if self.queue.remove(&coord) {
            self.metrics.requests_cancelled(1);
        }
        if removed {
            self.metrics.evicted();
            debug!(tile = %coord, "Evicted tile");
        }
        removed
    }

    /// Drop `entry` from the store and the index, releasing its bytes. Must run
    /// with the entry marked evicted.
    fn remove_tile(&self, entry: &Arc<TileEntry<P>>) -> bool {
        let coord = entry.coord();
        let removed = self
            .tiles
            .remove_if(&coord, |_, e| Arc::ptr_eq(e, entry))
            .is_some();
        if removed {
            let freed = entry.data().map_or(0, |d| d.size_bytes() as u64);
            self.bytes.fetch_sub(freed, Ordering::AcqRel);
        }
        self.lru.lock().remove(entry);
        removed
    }

    fn fire_repaint(&self) {
        let callback = self.repaint.read().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Drop every entry, waiting on in-flight loads without holding the eviction
    /// lock so concurrent lookups are not stalled behind a slow loader.
    fn clear(&self) {
        let cancelled = self.queue.len();
        self.queue.clear();
        self.metrics.requests_cancelled(cancelled);

        let entries: Vec<Arc<TileEntry<P>>> =
            self.tiles.iter().map(|item| Arc::clone(item.value())).collect();
        for entry in entries {
            entry.evict_blocking(|| {
                self.remove_tile(&entry);
            });
        }
        self.eviction_blocked.store(false, Ordering::Release);
        self.update_gauges();
    }
}

impl<P: TileData> LoadTarget for CacheCore<P> {
    fn execute(&self, request: &QueuedLoad) -> LoadOutcome {
        let coord = request.coord;
        let Some(entry) = self.tiles.get(&coord).map(|item| Arc::clone(item.value())) else {
            return LoadOutcome::Skipped;
        };

        let start = Instant::now();
        match entry.load_with(self.loader.as_ref(), |data| self.publish_bytes(data)) {
            EntryLoad::Loaded(data) => {
                self.metrics
                    .load_completed(false, data.size_bytes() as u64, start.elapsed());
                self.load_finished(&entry, true);
                self.enforce_limits(Some(coord));
                self.fire_repaint();
                LoadOutcome::Loaded
            }
            EntryLoad::AlreadyValid(_) => LoadOutcome::AlreadyValid,
            EntryLoad::Evicted | EntryLoad::PreviouslyFailed(_) => LoadOutcome::Skipped,
            EntryLoad::Failed(e) => {
                self.load_finished(&entry, false);
                self.metrics.load_failed();
                self.diagnostics.load_failed(&coord, &e);
                LoadOutcome::Failed
            }
        }
    }
}

/// Concurrent, size-bounded cache of volatile tiles with a background loader pool.
///
/// # Example
///
/// ```
/// use volview::cache::{CacheConfig, CacheHints, LoadError, VolatileCache};
/// use volview::coord::{DatasetLayout, TileCoord};
/// use volview::executor::Priority;
///
/// let layout = DatasetLayout::pyramid(1, 1, [64, 64, 1], [32, 32, 1], 2, 1).unwrap();
/// let loader = |c: &TileCoord| -> Result<Vec<u8>, LoadError> { Ok(vec![c.level; 32 * 32]) };
/// let cache = VolatileCache::new(layout, loader, CacheConfig::default()).unwrap();
///
/// let tile = cache
///     .get_tile(TileCoord::new(0, 0, 1, 0), CacheHints::blocking(Priority::HIGHEST))
///     .unwrap();
/// assert!(tile.is_valid());
/// ```
pub struct VolatileCache<P: TileData> {
    core: Arc<CacheCore<P>>,
    scheduler: LoadScheduler,
}

impl<P: TileData> VolatileCache<P> {
    /// Create a cache that reports load failures through `tracing`.
    pub fn new(
        layout: DatasetLayout,
        loader: impl TileLoader<P> + 'static,
        config: CacheConfig,
    ) -> Result<Self, CacheError> {
        Self::with_parts(
            layout,
            Arc::new(loader),
            Arc::new(TracingDiagnostics),
            config,
        )
    }

    /// Create a cache from shared collaborators.
    pub fn with_parts(
        layout: DatasetLayout,
        loader: Arc<dyn TileLoader<P>>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        config: CacheConfig,
    ) -> Result<Self, CacheError> {
        let queue = Arc::new(RequestQueue::new());
        let core = Arc::new(CacheCore {
            layout,
            loader,
            tiles: DashMap::new(),
            lru: Mutex::new(LruIndex::new()),
            queue: Arc::clone(&queue),
            max_tiles: config.max_tiles,
            max_bytes: config.max_bytes,
            metrics: Arc::new(CacheMetrics::new()),
            diagnostics,
            repaint: RwLock::new(None),
            frame: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            tick: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            eviction_blocked: AtomicBool::new(false),
            eviction_lock: Mutex::new(()),
        });

        let scheduler_config = SchedulerConfig {
            threads: config.loader_threads,
            ..Default::default()
        };
        let target: Arc<dyn LoadTarget> = core.clone();
        let scheduler =
            LoadScheduler::start(scheduler_config, queue, target).map_err(CacheError::WorkerSpawn)?;

        info!(
            levels = core.layout.num_levels(),
            max_tiles = ?config.max_tiles,
            max_bytes = ?config.max_bytes,
            loader_threads = scheduler.threads(),
            "Volatile cache created"
        );
        Ok(Self { core, scheduler })
    }

    /// Look up a tile, loading it according to `hints` if it is not valid.
    ///
    /// - A valid tile is returned without I/O.
    /// - [`LoadingStrategy::Blocking`] loads on this thread and never returns a
    ///   placeholder; a loader failure is returned as [`CacheError::LoadFailure`].
    /// - [`LoadingStrategy::Budgeted`] returns the placeholder at once and queues a
    ///   background load (or raises the priority of the queued one).
    ///
    /// A tile whose load failed is not loaded again by either strategy: budgeted
    /// requests get the placeholder, blocking requests get the failure. Use
    /// [`retry`](Self::retry) to allow another attempt.
    pub fn get_tile(&self, coord: TileCoord, hints: CacheHints) -> Result<TileHandle<P>, CacheError> {
        let core = &self.core;
        core.layout.check(&coord)?;

        loop {
            let entry = core.entry_for(coord);
            if entry.is_valid() {
                core.metrics.hit();
                return Ok(TileHandle::new(entry));
            }
            core.metrics.miss();

            match hints.strategy {
                LoadingStrategy::Budgeted => {
                    if !entry.is_loading() && !entry.has_failed() {
                        let outcome =
                            core.queue
                                .push(coord, hints.priority, hints.enqueue_to_front);
                        if outcome == PushOutcome::Queued {
                            core.metrics.request_queued();
                            debug!(tile = %coord, priority = %hints.priority, "Queued tile load");
                        }
                    }
                    return Ok(TileHandle::new(entry));
                }
                LoadingStrategy::Blocking => {
                    // The load happens here; a queued copy would only be skipped later
                    core.queue.remove(&coord);

                    let start = Instant::now();
                    match entry.load_with(core.loader.as_ref(), |data| core.publish_bytes(data)) {
                        EntryLoad::Loaded(data) => {
                            let elapsed = start.elapsed();
                            core.metrics
                                .load_completed(true, data.size_bytes() as u64, elapsed);
                            debug!(
                                tile = %coord,
                                load_us = elapsed.as_micros() as u64,
                                "Blocking tile load"
                            );
                            core.load_finished(&entry, true);
                            core.enforce_limits(Some(coord));
                            return Ok(TileHandle::new(entry));
                        }
                        EntryLoad::AlreadyValid(_) => return Ok(TileHandle::new(entry)),
                        // Lost a race with eviction; look the tile up again
                        EntryLoad::Evicted => continue,
                        EntryLoad::Failed(source) => {
                            core.load_finished(&entry, false);
                            core.metrics.load_failed();
                            return Err(CacheError::LoadFailure { coord, source });
                        }
                        EntryLoad::PreviouslyFailed(reason) => {
                            return Err(CacheError::LoadFailure {
                                coord,
                                source: LoadError::Unavailable(reason),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Current handle for `coord` without loading or touching it.
    pub fn peek(&self, coord: &TileCoord) -> Option<TileHandle<P>> {
        self.core
            .tiles
            .get(coord)
            .map(|item| TileHandle::new(Arc::clone(item.value())))
    }

    /// Allow another load attempt for a tile whose load failed.
    ///
    /// Returns whether the tile was resident and marked failed. The next request
    /// for it loads according to its hints.
    pub fn retry(&self, coord: &TileCoord) -> bool {
        let Some(entry) = self.core.tiles.get(coord).map(|item| Arc::clone(item.value())) else {
            return false;
        };
        let cleared = entry.clear_failure();
        if cleared {
            debug!(tile = %coord, "Cleared failed load");
        }
        cleared
    }

    /// Start a new frame. Tiles touched until [`finish_frame`](Self::finish_frame)
    /// are pinned against eviction. Returns the frame stamp.
    pub fn prepare_next_frame(&self) -> u64 {
        let stamp = self.core.frame.fetch_add(1, Ordering::AcqRel) + 1;
        self.core.in_flight.store(stamp, Ordering::Release);
        // Pins of the previous frame no longer apply
        self.core.eviction_blocked.store(false, Ordering::Release);
        stamp
    }

    /// End the current frame, releasing its pins and evicting down to the ceilings.
    pub fn finish_frame(&self) {
        self.core.in_flight.store(0, Ordering::Release);
        self.core.eviction_blocked.store(false, Ordering::Release);
        self.core.enforce_limits(None);
    }

    /// Stamp of the frame being rendered, if any.
    pub fn current_frame(&self) -> Option<u64> {
        match self.core.in_flight.load(Ordering::Acquire) {
            0 => None,
            stamp => Some(stamp),
        }
    }

    /// Cancel the queued load for `coord`. Returns whether one was pending.
    pub fn cancel_pending(&self, coord: &TileCoord) -> bool {
        let removed = self.core.queue.remove(coord);
        if removed {
            self.core.metrics.requests_cancelled(1);
        }
        removed
    }

    /// Cancel every queued load whose coordinate fails `keep`.
    ///
    /// Returns the number of cancelled requests.
    pub fn retain_pending(&self, keep: impl FnMut(&TileCoord) -> bool) -> usize {
        let removed = self.core.queue.retain(keep);
        if removed > 0 {
            self.core.metrics.requests_cancelled(removed);
            debug!(removed, "Cancelled pending tile loads");
        }
        removed
    }

    /// Drop every tile and pending request. Waits for in-flight loads to finish;
    /// lookups running meanwhile are not blocked.
    pub fn clear(&self) {
        self.core.clear();
        info!("Volatile cache cleared");
    }

    /// Register the callback fired after each successful background load.
    pub fn set_repaint_callback(&self, callback: RepaintCallback) {
        *self.core.repaint.write() = Some(callback);
    }

    /// Remove the repaint callback.
    pub fn clear_repaint_callback(&self) {
        *self.core.repaint.write() = None;
    }

    /// Number of resident tiles, valid or pending.
    pub fn len(&self) -> usize {
        self.core.tiles.len()
    }

    /// Whether no tile is resident.
    pub fn is_empty(&self) -> bool {
        self.core.tiles.is_empty()
    }

    /// Bytes held by valid tiles.
    pub fn size_bytes(&self) -> u64 {
        self.core.bytes.load(Ordering::Acquire)
    }

    /// Number of queued background loads.
    pub fn pending_loads(&self) -> usize {
        self.core.queue.len()
    }

    /// Whether a background load for `coord` is queued.
    pub fn is_queued(&self, coord: &TileCoord) -> bool {
        self.core.queue.contains(coord)
    }

    /// Tile count ceiling.
    pub fn max_tiles(&self) -> Option<usize> {
        self.core.max_tiles
    }

    /// Byte ceiling.
    pub fn max_bytes(&self) -> Option<u64> {
        self.core.max_bytes
    }

    /// How many tiles of `level` fit under the ceilings, or `None` if unbounded.
    pub fn tile_capacity(&self, level: u8) -> Option<u64> {
        let by_count = self.core.max_tiles.map(|max| max as u64);
        let tile_bytes = self.core.layout.tile_bytes(level).max(1);
        let by_bytes = self.core.max_bytes.map(|max| max / tile_bytes);
        match (by_count, by_bytes) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Dataset geometry.
    pub fn layout(&self) -> &DatasetLayout {
        &self.core.layout
    }

    /// Shared counters.
    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.core.metrics
    }

    /// Number of loader threads.
    pub fn loader_threads(&self) -> usize {
        self.scheduler.threads()
    }
}

impl<P: TileData> Drop for VolatileCache<P> {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}
