//! Eviction order over resident tiles.
//!
//! Entries are kept sorted by `(valid, tick)`, so pending placeholders come before
//! valid tiles and, within each group, the least recently accessed come first.
//! Touching an entry moves it to the back of its group in `O(log n)`; the eviction
//! path walks from the front and never has to scan or sort the whole store.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use super::entry::TileEntry;
use crate::coord::TileCoord;

/// Position of an entry in eviction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct LruKey {
    valid: bool,
    tick: u64,
}

/// One batch of eviction candidates.
pub(crate) struct CandidateBatch<P> {
    pub(crate) entries: Vec<Arc<TileEntry<P>>>,
    /// Where the next batch starts, `None` once the walk reached the end.
    pub(crate) resume_after: Option<LruKey>,
}

/// Resident entries in eviction order.
pub(crate) struct LruIndex<P> {
    order: BTreeMap<LruKey, Arc<TileEntry<P>>>,
    keys: HashMap<TileCoord, LruKey>,
}

impl<P> LruIndex<P> {
    pub(crate) fn new() -> Self {
        Self {
            order: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }

    /// Track a newly inserted entry, replacing any stale entry for its coordinate.
    pub(crate) fn insert(&mut self, entry: &Arc<TileEntry<P>>, tick: u64) {
        let key = LruKey {
            valid: entry.is_valid(),
            tick,
        };
        if let Some(old) = self.keys.insert(entry.coord(), key) {
            self.order.remove(&old);
        }
        self.order.insert(key, Arc::clone(entry));
    }

    /// Move `entry` to the back of its group.
    pub(crate) fn touch(&mut self, entry: &Arc<TileEntry<P>>, tick: u64) {
        if let Some(key) = self.take(entry) {
            self.put(entry, LruKey { tick, ..key });
        }
    }

    /// Move `entry` into the valid group, keeping its access tick.
    pub(crate) fn mark_valid(&mut self, entry: &Arc<TileEntry<P>>) {
        if let Some(key) = self.take(entry) {
            self.put(entry, LruKey { valid: true, ..key });
        }
    }

    /// Stop tracking `entry`. A newer entry for the same coordinate is left alone.
    pub(crate) fn remove(&mut self, entry: &Arc<TileEntry<P>>) {
        self.take(entry);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    /// Up to `limit` entries accepted by `evictable`, in eviction order, starting
    /// after `after`.
    pub(crate) fn candidates(
        &self,
        after: Option<LruKey>,
        limit: usize,
        evictable: impl Fn(&TileEntry<P>) -> bool,
    ) -> CandidateBatch<P> {
        let start = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let mut entries = Vec::new();
        let mut last = None;
        let mut walk = self.order.range((start, Bound::Unbounded));
        for (key, entry) in walk.by_ref() {
            last = Some(*key);
            if evictable(entry) {
                entries.push(Arc::clone(entry));
                if entries.len() == limit {
                    break;
                }
            }
        }
        let resume_after = if walk.next().is_some() { last } else { None };
        CandidateBatch {
            entries,
            resume_after,
        }
    }

    fn take(&mut self, entry: &Arc<TileEntry<P>>) -> Option<LruKey> {
        let coord = entry.coord();
        let key = *self.keys.get(&coord)?;
        if !self
            .order
            .get(&key)
            .is_some_and(|tracked| Arc::ptr_eq(tracked, entry))
        {
            return None;
        }
        self.keys.remove(&coord);
        self.order.remove(&key);
        Some(key)
    }

    fn put(&mut self, entry: &Arc<TileEntry<P>>, key: LruKey) {
        self.keys.insert(entry.coord(), key);
        self.order.insert(key, Arc::clone(entry));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(cell: u64) -> Arc<TileEntry<Vec<u8>>> {
        Arc::new(TileEntry::new(TileCoord::new(0, 0, 0, cell)))
    }

    fn cells(batch: &CandidateBatch<Vec<u8>>) -> Vec<u64> {
        batch.entries.iter().map(|e| e.coord().cell).collect()
    }

    #[test]
    fn test_pending_before_valid_then_oldest() {
        let mut index = LruIndex::new();
        let (a, b, c) = (entry(0), entry(1), entry(2));
        index.insert(&a, 1);
        index.insert(&b, 2);
        index.insert(&c, 3);

        index.mark_valid(&a);
        index.touch(&b, 4);

        let batch = index.candidates(None, 10, |_| true);
        assert_eq!(cells(&batch), vec![2, 1, 0]);
        assert!(batch.resume_after.is_none());
    }

    #[test]
    fn test_batches_resume_after_cursor() {
        let mut index = LruIndex::new();
        let entries: Vec<_> = (0..5).map(entry).collect();
        for (tick, e) in entries.iter().enumerate() {
            index.insert(e, tick as u64);
        }

        let first = index.candidates(None, 2, |e| e.coord().cell != 1);
        assert_eq!(cells(&first), vec![0, 2]);
        let second = index.candidates(first.resume_after, 2, |e| e.coord().cell != 1);
        assert_eq!(cells(&second), vec![3, 4]);
        assert!(second.resume_after.is_none());
    }

    #[test]
    fn test_stale_entry_does_not_remove_replacement() {
        let mut index = LruIndex::new();
        let old = entry(7);
        let new = entry(7);
        index.insert(&old, 1);
        index.insert(&new, 2);
        assert_eq!(index.len(), 1);

        index.remove(&old);
        index.touch(&old, 3);
        assert_eq!(index.len(), 1);

        index.remove(&new);
        assert_eq!(index.len(), 0);
    }
}
