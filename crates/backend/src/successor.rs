//! Successor-link model.
//!
//! The successor index stores, per key and sequence, the next live key in
//! ascending order. A ledger's diff invalidates links around every key it
//! inserts or deletes; this module computes the replacement rows to write.
//!
//! Links are derived from the cache *after* the diff has been applied, so
//! every emitted link reflects the final neighborhood even when a single
//! diff inserts and deletes adjacent keys.

use std::collections::BTreeMap;

use chronicle_types::{Key, SuccessorLink, FIRST_KEY, LAST_KEY};

use crate::cache::{AppliedDiff, StateCache};

/// Computes the successor rows a ledger diff requires.
///
/// `cache` must already hold the state at `sequence` (i.e. `update` has been
/// applied) and `applied` is that update's outcome. For each created key `K`
/// the link of its predecessor is redirected to `K` and `K` gains a link to
/// its successor; for each deleted key the predecessor is linked across the
/// gap. Links are deduplicated by source key; since every neighborhood is
/// resolved against the same final state, duplicates always agree.
pub fn successor_updates(
    cache: &StateCache,
    applied: &AppliedDiff,
    sequence: u32,
) -> Vec<SuccessorLink> {
    let mut links: BTreeMap<Key, Key> = BTreeMap::new();

    for key in &applied.created {
        let pred = cache.neighbor_before(key).unwrap_or(FIRST_KEY);
        let succ = cache.neighbor_after(key).unwrap_or(LAST_KEY);
        links.insert(pred, *key);
        links.insert(*key, succ);
    }
    for key in &applied.deleted {
        let pred = cache.neighbor_before(key).unwrap_or(FIRST_KEY);
        let succ = cache.neighbor_after(key).unwrap_or(LAST_KEY);
        links.insert(pred, succ);
    }

    links
        .into_iter()
        .map(|(key, next)| SuccessorLink { key, sequence, next })
        .collect()
}
