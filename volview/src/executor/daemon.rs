//! Background loader pool.
//!
//! The [`LoadScheduler`] owns a fixed set of worker threads that drain a shared
//! [`RequestQueue`]. Workers know nothing about tiles beyond their coordinate: each
//! dequeued request is handed to a [`LoadTarget`] (the cache), which performs the
//! load, publishes the data and does any reporting.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      LoadScheduler                        │
//! │                                                           │
//! │  get_tile(Budgeted) ──► RequestQueue ──► worker 0 ──┐     │
//! │  (push / raise /        (priority,      worker 1 ──┼──► LoadTarget::execute
//! │   remove / retain)       FIFO, dedup)   worker N ──┘     │
//! │                                                           │
//! │  CancellationToken ──► close() wakes every worker, they   │
//! │                        exit and are joined on drop        │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::policy::Priority;
use super::queue::{LoadQueue, PushOutcome, QueuedLoad};
use crate::coord::TileCoord;

// =============================================================================
// Configuration
// =============================================================================

/// Default number of loader threads.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Configuration for the loader pool.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Number of worker threads.
    pub threads: usize,

    /// Prefix of worker thread names (`{prefix}-{index}`).
    pub name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_WORKER_THREADS,
            name_prefix: "volview-loader".to_string(),
        }
    }
}

// =============================================================================
// Load target
// =============================================================================

/// What happened to a dequeued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Data was loaded and published.
    Loaded,
    /// Data was already there (a blocking load got to it first).
    AlreadyValid,
    /// The tile is no longer cached; nothing was loaded.
    Skipped,
    /// The loader failed; the tile stays invalid.
    Failed,
}

/// Executes dequeued load requests.
pub trait LoadTarget: Send + Sync {
    /// Load the tile named by `request`. Called from worker threads.
    fn execute(&self, request: &QueuedLoad) -> LoadOutcome;
}

// =============================================================================
// Request queue
// =============================================================================

/// Thread-safe wrapper around [`LoadQueue`] that workers can block on.
#[derive(Debug, Default)]
pub struct RequestQueue {
    queue: Mutex<LoadQueue>,
    available: Condvar,
    shutdown: CancellationToken,
}

impl RequestQueue {
    /// Creates an open, empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a request, waking a worker if the queue changed.
    pub fn push(&self, coord: TileCoord, priority: Priority, to_front: bool) -> PushOutcome {
        let outcome = self.queue.lock().push(coord, priority, to_front);
        if outcome == PushOutcome::Queued {
            self.available.notify_one();
        }
        outcome
    }

    /// Cancel the pending request for `coord`. Returns whether one was queued.
    pub fn remove(&self, coord: &TileCoord) -> bool {
        self.queue.lock().remove(coord)
    }

    /// Cancel every pending request whose coordinate fails `keep`.
    pub fn retain(&self, keep: impl FnMut(&TileCoord) -> bool) -> usize {
        self.queue.lock().retain(keep)
    }

    /// Cancel every pending request.
    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    /// Whether a request for `coord` is pending.
    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.queue.lock().contains(coord)
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether no requests are pending.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Pending requests per priority.
    pub fn priority_counts(&self) -> std::collections::HashMap<Priority, usize> {
        self.queue.lock().priority_counts()
    }

    /// Wait for the next request. Returns `None` once the queue is closed.
    pub fn pop_blocking(&self) -> Option<QueuedLoad> {
        let mut queue = self.queue.lock();
        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }
            if let Some(request) = queue.pop() {
                return Some(request);
            }
            self.available.wait(&mut queue);
        }
    }

    /// Close the queue and wake all waiting workers.
    pub fn close(&self) {
        self.shutdown.cancel();
        // Taking the lock orders the cancel before any worker's next wait
        let _queue = self.queue.lock();
        self.available.notify_all();
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Fixed pool of loader threads draining a [`RequestQueue`].
///
/// Dropping the scheduler closes the queue and joins the workers. Loads that are
/// already executing run to completion first; pending requests are abandoned.
pub struct LoadScheduler {
    queue: Arc<RequestQueue>,
    workers: Vec<JoinHandle<()>>,
}

impl LoadScheduler {
    /// Spawn `config.threads` workers (at least one).
    pub fn start(
        config: SchedulerConfig,
        queue: Arc<RequestQueue>,
        target: Arc<dyn LoadTarget>,
    ) -> std::io::Result<Self> {
        let threads = config.threads.max(1);
        let mut scheduler = Self {
            queue: Arc::clone(&queue),
            workers: Vec::with_capacity(threads),
        };

        for index in 0..threads {
            let queue = Arc::clone(&queue);
            let target = Arc::clone(&target);
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", config.name_prefix, index))
                .spawn(move || worker_loop(index, &queue, target.as_ref()))?;
            scheduler.workers.push(handle);
        }

        info!(threads, "Load scheduler started");
        Ok(scheduler)
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue and join every worker.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.queue.close();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Loader worker panicked");
            }
        }
        info!("Load scheduler stopped");
    }
}

impl Drop for LoadScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, queue: &RequestQueue, target: &dyn LoadTarget) {
    debug!(worker = index, "Loader worker started");
    while let Some(request) = queue.pop_blocking() {
        let waited_ms = request.wait_time().as_millis() as u64;
        let start = Instant::now();
        let outcome = target.execute(&request);
        debug!(
            worker = index,
            tile = %request.coord,
            priority = %request.priority,
            waited_ms,
            load_ms = start.elapsed().as_millis() as u64,
            ?outcome,
            "Load request processed"
        );
    }
    debug!(worker = index, "Loader worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Recorder {
        seen: Mutex<Vec<TileCoord>>,
        delay: Duration,
    }

    impl LoadTarget for Recorder {
        fn execute(&self, request: &QueuedLoad) -> LoadOutcome {
            std::thread::sleep(self.delay);
            self.seen.lock().push(request.coord);
            LoadOutcome::Loaded
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_workers_drain_queue_in_priority_order() {
        let queue = Arc::new(RequestQueue::new());
        // Queue everything before the single worker starts
        for cell in 0..5u64 {
            queue.push(
                TileCoord::new(0, 0, 0, cell),
                Priority::new((5 - cell) as u16),
                false,
            );
        }
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        });
        let config = SchedulerConfig {
            threads: 1,
            ..Default::default()
        };
        let scheduler = LoadScheduler::start(config, Arc::clone(&queue), recorder.clone()).unwrap();

        wait_until(|| recorder.seen.lock().len() == 5);
        let cells: Vec<u64> = recorder.seen.lock().iter().map(|c| c.cell).collect();
        assert_eq!(cells, vec![4, 3, 2, 1, 0]);
        assert_eq!(scheduler.threads(), 1);
    }

    #[test]
    fn test_shutdown_joins_idle_workers() {
        let queue = Arc::new(RequestQueue::new());
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        });
        let mut scheduler = LoadScheduler::start(
            SchedulerConfig::default(),
            Arc::clone(&queue),
            recorder,
        )
        .unwrap();

        assert_eq!(scheduler.threads(), DEFAULT_WORKER_THREADS);
        scheduler.shutdown();
        assert!(queue.is_closed());
        assert_eq!(scheduler.threads(), 0);
        assert!(queue.pop_blocking().is_none());
    }

    #[test]
    fn test_pending_requests_can_be_cancelled() {
        let queue = Arc::new(RequestQueue::new());
        let executed = Arc::new(AtomicUsize::new(0));

        struct Counter(Arc<AtomicUsize>);
        impl LoadTarget for Counter {
            fn execute(&self, _: &QueuedLoad) -> LoadOutcome {
                self.0.fetch_add(1, Ordering::SeqCst);
                LoadOutcome::Loaded
            }
        }

        for cell in 0..10u64 {
            queue.push(TileCoord::new(cell as u32 % 2, 0, 0, cell), Priority::HIGHEST, false);
        }
        assert_eq!(queue.retain(|c| c.timepoint == 0), 5);
        assert!(queue.remove(&TileCoord::new(0, 0, 0, 0)));

        let _scheduler = LoadScheduler::start(
            SchedulerConfig {
                threads: 2,
                ..Default::default()
            },
            Arc::clone(&queue),
            Arc::new(Counter(Arc::clone(&executed))),
        )
        .unwrap();

        wait_until(|| executed.load(Ordering::SeqCst) == 4 && queue.is_empty());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(executed.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_executing_load_finishes_on_shutdown() {
        let queue = Arc::new(RequestQueue::new());
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            delay: Duration::from_millis(50),
        });
        let mut scheduler = LoadScheduler::start(
            SchedulerConfig {
                threads: 1,
                ..Default::default()
            },
            Arc::clone(&queue),
            recorder.clone(),
        )
        .unwrap();

        queue.push(TileCoord::new(0, 0, 0, 1), Priority::HIGHEST, false);
        wait_until(|| queue.is_empty());
        scheduler.shutdown();

        assert_eq!(recorder.seen.lock().len(), 1);
    }
}
