//! Versioned state cache.
//!
//! A process-local, point-in-time view of the latest fully committed
//! ledger's state. Point reads and successor iteration dominate the read
//! path, so the cache keeps every live object in a single ordered map:
//! `get` and `get_successor` are both O(log n).
//!
//! The cache holds exactly one snapshot. Reads at an older sequence miss and
//! fall through to the persistent store; reads at the cached sequence or
//! newer are served directly once the cache has been marked full.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use chronicle_types::{Key, LedgerObject};

/// A cached object: the blob plus the sequence at which it last changed.
#[derive(Debug, Clone)]
struct CacheEntry {
    sequence: u32,
    blob: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Live objects in key order. Tombstoned keys are erased.
    map: BTreeMap<Key, CacheEntry>,
    /// The ledger sequence this cache represents.
    latest_sequence: u32,
}

/// Keys a cache update actually created or deleted, as opposed to modified
/// in place. Feeds the successor-link model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedDiff {
    /// Keys newly inserted into the live set.
    pub created: Vec<Key>,
    /// Keys removed from the live set.
    pub deleted: Vec<Key>,
}

/// In-memory view of the latest complete ledger's state.
///
/// Updates are serialized through the write lock; concurrent readers never
/// observe a mid-update mix.
#[derive(Debug, Default)]
pub struct StateCache {
    inner: RwLock<Inner>,
    full: AtomicBool,
}

impl StateCache {
    /// Creates an empty, not-yet-authoritative cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a ledger's changes. An empty blob removes the key from the
    /// ordered index; a non-empty blob inserts or replaces.
    ///
    /// Foreground updates (the ETL applying a new ledger) advance the cached
    /// sequence. Background updates (initial population from the store) only
    /// fill holes: they never overwrite an entry or move the sequence, so a
    /// slow loader cannot clobber newer data.
    pub fn update(&self, diff: &[LedgerObject], sequence: u32, is_background: bool) -> AppliedDiff {
        let mut inner = self.inner.write();
        let mut applied = AppliedDiff::default();
        for obj in diff {
            if obj.blob.is_empty() {
                if inner.map.remove(&obj.key).is_some() {
                    applied.deleted.push(obj.key);
                }
            } else {
                if is_background && inner.map.contains_key(&obj.key) {
                    continue;
                }
                let entry = CacheEntry { sequence, blob: obj.blob.clone() };
                if inner.map.insert(obj.key, entry).is_none() {
                    applied.created.push(obj.key);
                }
            }
        }
        if !is_background {
            inner.latest_sequence = sequence;
        }
        applied
    }

    /// Returns the cached blob for `key`, if the cache is authoritative for
    /// `sequence`. The cache holds no older snapshots: `sequence` below the
    /// cached ledger is always a miss.
    pub fn get(&self, key: &Key, sequence: u32) -> Option<Vec<u8>> {
        if !self.is_full() {
            return None;
        }
        let inner = self.inner.read();
        if sequence < inner.latest_sequence {
            return None;
        }
        inner.map.get(key).map(|entry| entry.blob.clone())
    }

    /// Returns the smallest live key strictly greater than `key`, with its
    /// blob, under the same authority rules as [`StateCache::get`].
    pub fn get_successor(&self, key: &Key, sequence: u32) -> Option<LedgerObject> {
        if !self.is_full() {
            return None;
        }
        let inner = self.inner.read();
        if sequence < inner.latest_sequence {
            return None;
        }
        inner
            .map
            .range((Bound::Excluded(*key), Bound::Unbounded))
            .next()
            .map(|(k, entry)| LedgerObject { key: *k, blob: entry.blob.clone() })
    }

    /// Unversioned neighbor lookup: the greatest live key strictly smaller
    /// than `key`. Used by the successor-link model against the freshly
    /// updated set; not gated on fullness.
    pub fn neighbor_before(&self, key: &Key) -> Option<Key> {
        let inner = self.inner.read();
        inner.map.range(..*key).next_back().map(|(k, _)| *k)
    }

    /// Unversioned neighbor lookup: the smallest live key strictly greater
    /// than `key`.
    pub fn neighbor_after(&self, key: &Key) -> Option<Key> {
        let inner = self.inner.read();
        inner.map.range((Bound::Excluded(*key), Bound::Unbounded)).next().map(|(k, _)| *k)
    }

    /// Sequence of the entry cached for `key`, if any.
    pub fn entry_sequence(&self, key: &Key) -> Option<u32> {
        let inner = self.inner.read();
        inner.map.get(key).map(|entry| entry.sequence)
    }

    /// Marks the cache authoritative. Before this, every read misses.
    pub fn set_full(&self) {
        self.full.store(true, Ordering::Release);
    }

    /// Whether the cache reflects the complete state at its sequence.
    pub fn is_full(&self) -> bool {
        self.full.load(Ordering::Acquire)
    }

    /// The ledger sequence the cache currently represents.
    pub fn latest_ledger_sequence(&self) -> u32 {
        self.inner.read().latest_sequence
    }

    /// Number of live objects cached.
    pub fn size(&self) -> usize {
        self.inner.read().map.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn key(byte: u8) -> Key {
        [byte; 32]
    }

    fn obj(byte: u8, blob: &[u8]) -> LedgerObject {
        LedgerObject { key: key(byte), blob: blob.to_vec() }
    }

    #[test]
    fn test_get_misses_until_full() {
        let cache = StateCache::new();
        cache.update(&[obj(1, b"a")], 5, false);
        assert_eq!(cache.get(&key(1), 5), None);

        cache.set_full();
        assert_eq!(cache.get(&key(1), 5), Some(b"a".to_vec()));
    }

    #[test]
    fn test_get_misses_below_cached_sequence() {
        let cache = StateCache::new();
        cache.update(&[obj(1, b"a")], 5, false);
        cache.set_full();

        assert_eq!(cache.get(&key(1), 4), None);
        assert_eq!(cache.get(&key(1), 5), Some(b"a".to_vec()));
        assert_eq!(cache.get(&key(1), 6), Some(b"a".to_vec()));
    }

    #[test]
    fn test_tombstone_removes_from_index() {
        let cache = StateCache::new();
        cache.update(&[obj(1, b"a"), obj(2, b"b")], 5, false);
        cache.set_full();

        let applied = cache.update(&[obj(1, b"")], 6, false);
        assert_eq!(applied.deleted, vec![key(1)]);
        assert_eq!(cache.get(&key(1), 6), None);
        assert_eq!(cache.get(&key(2), 6), Some(b"b".to_vec()));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_update_reports_created_not_modified() {
        let cache = StateCache::new();
        let applied = cache.update(&[obj(1, b"a")], 5, false);
        assert_eq!(applied.created, vec![key(1)]);

        let applied = cache.update(&[obj(1, b"a2")], 6, false);
        assert!(applied.created.is_empty());
        assert!(applied.deleted.is_empty());
        assert_eq!(cache.latest_ledger_sequence(), 6);
    }

    #[test]
    fn test_successor_iteration_order() {
        let cache = StateCache::new();
        cache.update(&[obj(30, b"c"), obj(10, b"a"), obj(20, b"b")], 7, false);
        cache.set_full();

        let succ = cache.get_successor(&chronicle_types::FIRST_KEY, 7).unwrap();
        assert_eq!(succ.key, key(10));
        let succ = cache.get_successor(&key(10), 7).unwrap();
        assert_eq!(succ.key, key(20));
        let succ = cache.get_successor(&key(20), 7).unwrap();
        assert_eq!(succ.key, key(30));
        assert!(cache.get_successor(&key(30), 7).is_none());
    }

    #[test]
    fn test_successor_misses_below_cached_sequence() {
        let cache = StateCache::new();
        cache.update(&[obj(10, b"a")], 7, false);
        cache.set_full();
        assert!(cache.get_successor(&chronicle_types::FIRST_KEY, 6).is_none());
    }

    #[test]
    fn test_background_update_fills_holes_only() {
        let cache = StateCache::new();
        cache.update(&[obj(1, b"new")], 9, false);

        // Background loader catching up with older state must not clobber
        // the newer entry or move the sequence.
        let applied = cache.update(&[obj(1, b"old"), obj(2, b"other")], 3, true);
        assert_eq!(applied.created, vec![key(2)]);
        assert_eq!(cache.latest_ledger_sequence(), 9);

        cache.set_full();
        assert_eq!(cache.get(&key(1), 9), Some(b"new".to_vec()));
        assert_eq!(cache.get(&key(2), 9), Some(b"other".to_vec()));
    }

    #[test]
    fn test_neighbor_lookups() {
        let cache = StateCache::new();
        cache.update(&[obj(10, b"a"), obj(20, b"b"), obj(30, b"c")], 4, false);

        assert_eq!(cache.neighbor_before(&key(20)), Some(key(10)));
        assert_eq!(cache.neighbor_after(&key(20)), Some(key(30)));
        assert_eq!(cache.neighbor_before(&key(10)), None);
        assert_eq!(cache.neighbor_after(&key(30)), None);
        // Neighbors of a key not in the set still resolve.
        assert_eq!(cache.neighbor_before(&key(25)), Some(key(20)));
        assert_eq!(cache.neighbor_after(&key(25)), Some(key(30)));
    }

    #[test]
    fn test_entry_sequence_tracks_last_change() {
        let cache = StateCache::new();
        cache.update(&[obj(1, b"a")], 5, false);
        cache.update(&[obj(1, b"b")], 8, false);
        assert_eq!(cache.entry_sequence(&key(1)), Some(8));
        assert_eq!(cache.entry_sequence(&key(2)), None);
    }
}
