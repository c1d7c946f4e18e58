//! Priority queue of pending tile loads.
//!
//! Requests are ordered by priority (lower values first), then by enqueue order
//! (FIFO within the same priority). Front-enqueued requests are served before all
//! regular requests of the same priority, most recent first.
//!
//! The queue is keyed by tile coordinate: a coordinate is queued at most once.
//! Pushing a coordinate that is already queued never duplicates it, but may raise
//! its priority.
//!
//! # Example
//!
//! ```
//! use volview::coord::TileCoord;
//! use volview::executor::{LoadQueue, Priority, PushOutcome};
//!
//! let mut queue = LoadQueue::new();
//! let fine = TileCoord::new(0, 0, 0, 7);
//! let coarse = TileCoord::new(0, 0, 3, 0);
//!
//! queue.push(fine, Priority::new(3), false);
//! queue.push(coarse, Priority::new(0), false);
//! assert_eq!(queue.push(fine, Priority::new(5), false), PushOutcome::AlreadyQueued);
//!
//! // The coarse tile comes out first despite being pushed second
//! assert_eq!(queue.pop().unwrap().coord, coarse);
//! ```

use super::policy::Priority;
use crate::coord::TileCoord;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Ordering key: priority first, then sequence. Front-enqueued requests get
/// negative, decreasing sequence numbers so they sort before regular ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Priority,
    sequence: i64,
}

/// A load request waiting for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedLoad {
    /// Tile to load.
    pub coord: TileCoord,

    /// Priority the request was served at.
    pub priority: Priority,

    /// When the request was first enqueued (for wait time telemetry).
    pub enqueued_at: Instant,
}

impl QueuedLoad {
    /// How long the request has been waiting.
    pub fn wait_time(&self) -> std::time::Duration {
        self.enqueued_at.elapsed()
    }
}

/// Result of pushing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The coordinate was not queued; it is now.
    Queued,
    /// The coordinate was queued at a less urgent priority; it was moved up.
    Raised,
    /// The coordinate was already queued at the same or a more urgent priority.
    AlreadyQueued,
}

/// Deduplicating priority queue of tile loads.
///
/// Not thread-safe; the scheduler wraps it in a mutex.
#[derive(Debug, Default)]
pub struct LoadQueue {
    ordered: BTreeMap<QueueKey, QueuedLoad>,
    index: HashMap<TileCoord, QueueKey>,
    next_back: i64,
    next_front: i64,
}

impl LoadQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            ordered: BTreeMap::new(),
            index: HashMap::new(),
            next_back: 0,
            next_front: -1,
        }
    }

    fn key(&mut self, priority: Priority, to_front: bool) -> QueueKey {
        let sequence = if to_front {
            let s = self.next_front;
            self.next_front -= 1;
            s
        } else {
            let s = self.next_back;
            self.next_back += 1;
            s
        };
        QueueKey { priority, sequence }
    }

    /// Enqueue a load for `coord`, or raise the priority of an existing one.
    pub fn push(&mut self, coord: TileCoord, priority: Priority, to_front: bool) -> PushOutcome {
        if let Some(existing) = self.index.get(&coord).copied() {
            if priority >= existing.priority {
                return PushOutcome::AlreadyQueued;
            }
            let Some(mut request) = self.ordered.remove(&existing) else {
                return PushOutcome::AlreadyQueued;
            };
            let key = self.key(priority, to_front);
            request.priority = priority;
            self.ordered.insert(key, request);
            self.index.insert(coord, key);
            return PushOutcome::Raised;
        }

        let key = self.key(priority, to_front);
        self.ordered.insert(
            key,
            QueuedLoad {
                coord,
                priority,
                enqueued_at: Instant::now(),
            },
        );
        self.index.insert(coord, key);
        PushOutcome::Queued
    }

    /// Removes and returns the most urgent request.
    pub fn pop(&mut self) -> Option<QueuedLoad> {
        let (_, request) = self.ordered.pop_first()?;
        self.index.remove(&request.coord);
        Some(request)
    }

    /// Returns the most urgent request without removing it.
    pub fn peek(&self) -> Option<&QueuedLoad> {
        self.ordered.values().next()
    }

    /// Removes the pending request for `coord`. Returns whether one was queued.
    pub fn remove(&mut self, coord: &TileCoord) -> bool {
        match self.index.remove(coord) {
            Some(key) => self.ordered.remove(&key).is_some(),
            None => false,
        }
    }

    /// Keeps only requests whose coordinate satisfies `keep`.
    ///
    /// Returns the number of requests removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&TileCoord) -> bool) -> usize {
        let before = self.ordered.len();
        let index = &mut self.index;
        self.ordered.retain(|_, request| {
            let kept = keep(&request.coord);
            if !kept {
                index.remove(&request.coord);
            }
            kept
        });
        before - self.ordered.len()
    }

    /// Whether a request for `coord` is pending.
    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.index.contains_key(coord)
    }

    /// Priority of the pending request for `coord`.
    pub fn priority_of(&self, coord: &TileCoord) -> Option<Priority> {
        self.index.get(coord).map(|key| key.priority)
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether no requests are pending.
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Drops every pending request.
    pub fn clear(&mut self) {
        self.ordered.clear();
        self.index.clear();
    }

    /// Returns the number of pending requests at each priority.
    pub fn priority_counts(&self) -> HashMap<Priority, usize> {
        let mut counts = HashMap::new();
        for key in self.ordered.keys() {
            *counts.entry(key.priority).or_insert(0) += 1;
        }
        counts
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tile(cell: u64) -> TileCoord {
        TileCoord::new(0, 0, 0, cell)
    }

    #[test]
    fn test_priority_ordering() {
        let mut queue = LoadQueue::new();

        queue.push(tile(1), Priority::new(2), false);
        queue.push(tile(2), Priority::new(0), false);
        queue.push(tile(3), Priority::new(1), false);

        assert_eq!(queue.pop().unwrap().coord, tile(2));
        assert_eq!(queue.pop().unwrap().coord, tile(3));
        assert_eq!(queue.pop().unwrap().coord, tile(1));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queue = LoadQueue::new();

        queue.push(tile(1), Priority::new(1), false);
        queue.push(tile(2), Priority::new(1), false);
        queue.push(tile(3), Priority::new(1), false);

        assert_eq!(queue.pop().unwrap().coord, tile(1));
        assert_eq!(queue.pop().unwrap().coord, tile(2));
        assert_eq!(queue.pop().unwrap().coord, tile(3));
    }

    #[test]
    fn test_front_requests_jump_their_priority_band() {
        let mut queue = LoadQueue::new();

        queue.push(tile(1), Priority::new(1), false);
        queue.push(tile(2), Priority::new(1), true);
        queue.push(tile(3), Priority::new(1), true);
        queue.push(tile(4), Priority::new(0), false);

        assert_eq!(queue.pop().unwrap().coord, tile(4));
        assert_eq!(queue.pop().unwrap().coord, tile(3));
        assert_eq!(queue.pop().unwrap().coord, tile(2));
        assert_eq!(queue.pop().unwrap().coord, tile(1));
    }

    #[test]
    fn test_duplicate_push_is_deduplicated() {
        let mut queue = LoadQueue::new();

        assert_eq!(queue.push(tile(1), Priority::new(1), false), PushOutcome::Queued);
        assert_eq!(
            queue.push(tile(1), Priority::new(1), false),
            PushOutcome::AlreadyQueued
        );
        assert_eq!(
            queue.push(tile(1), Priority::new(4), false),
            PushOutcome::AlreadyQueued
        );
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.priority_of(&tile(1)), Some(Priority::new(1)));
    }

    #[test]
    fn test_push_raises_priority() {
        let mut queue = LoadQueue::new();

        queue.push(tile(1), Priority::new(3), false);
        queue.push(tile(2), Priority::new(1), false);
        assert_eq!(queue.push(tile(1), Priority::new(0), false), PushOutcome::Raised);

        assert_eq!(queue.len(), 2);
        let first = queue.pop().unwrap();
        assert_eq!(first.coord, tile(1));
        assert_eq!(first.priority, Priority::new(0));
    }

    #[test]
    fn test_remove_and_contains() {
        let mut queue = LoadQueue::new();

        queue.push(tile(1), Priority::new(0), false);
        queue.push(tile(2), Priority::new(0), false);
        assert!(queue.contains(&tile(1)));

        assert!(queue.remove(&tile(1)));
        assert!(!queue.remove(&tile(1)));
        assert!(!queue.contains(&tile(1)));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().unwrap().coord, tile(2));
    }

    #[test]
    fn test_retain() {
        let mut queue = LoadQueue::new();

        for cell in 0..6 {
            queue.push(
                TileCoord::new((cell % 2) as u32, 0, 0, cell),
                Priority::new(0),
                false,
            );
        }
        let removed = queue.retain(|coord| coord.timepoint == 0);
        assert_eq!(removed, 3);
        assert_eq!(queue.len(), 3);
        assert!(!queue.contains(&TileCoord::new(1, 0, 0, 1)));
        // Removed coordinates can be queued again
        assert_eq!(
            queue.push(TileCoord::new(1, 0, 0, 1), Priority::new(0), false),
            PushOutcome::Queued
        );
    }

    #[test]
    fn test_priority_counts_and_clear() {
        let mut queue = LoadQueue::new();

        queue.push(tile(1), Priority::new(0), false);
        queue.push(tile(2), Priority::new(0), false);
        queue.push(tile(3), Priority::new(2), false);

        let counts = queue.priority_counts();
        assert_eq!(counts.get(&Priority::new(0)), Some(&2));
        assert_eq!(counts.get(&Priority::new(2)), Some(&1));

        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_wait_time() {
        let mut queue = LoadQueue::new();
        queue.push(tile(1), Priority::new(0), false);
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(queue.pop().unwrap().wait_time() >= std::time::Duration::from_millis(10));
    }

    proptest! {
        #[test]
        fn prop_pops_are_priority_ordered_and_fifo(
            pushes in proptest::collection::vec((0u64..40, 0u16..4), 0..80)
        ) {
            let mut queue = LoadQueue::new();
            let mut expected: Vec<(u16, usize, u64)> = Vec::new();
            for (order, (cell, priority)) in pushes.iter().enumerate() {
                if let Some(existing) = expected.iter_mut().find(|e| e.2 == *cell) {
                    if *priority < existing.0 {
                        existing.0 = *priority;
                        existing.1 = order;
                    }
                } else {
                    expected.push((*priority, order, *cell));
                }
                queue.push(tile(*cell), Priority::new(*priority), false);
            }
            expected.sort();

            let popped: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|r| r.coord.cell).collect();
            let wanted: Vec<u64> = expected.iter().map(|e| e.2).collect();
            prop_assert_eq!(popped, wanted);
        }
    }
}
