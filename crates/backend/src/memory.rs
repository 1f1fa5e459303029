//! In-memory backend.
//!
//! A complete [`BackendInterface`] implementation over ordered maps, with
//! the same visible semantics as the Cassandra backend: versioned object
//! rows with empty-blob tombstones, a successor index resolved by greatest
//! sequence at most the query sequence, the monotonic range gate, and the
//! retention procedure. Used by tests and for embedding; also the reference
//! the integration suite holds the driver backend to.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use chronicle_types::{
    hex, AccountTransactions, AccountTransactionsCursor, AccountTransactionsData, BackendError,
    Key, LedgerHeader, LedgerObject, LedgerRange, Result, TransactionAndMetadata, LAST_KEY,
};

use crate::interface::{BackendCore, BackendInterface};

type SeqIdx = (u32, u32);

#[derive(Debug, Default)]
struct Store {
    /// Object versions per key, ascending by sequence. Empty blob is a
    /// tombstone.
    objects: BTreeMap<Key, BTreeMap<u32, Vec<u8>>>,
    /// Successor links per key, ascending by sequence.
    successors: BTreeMap<Key, BTreeMap<u32, Key>>,
    /// Keys touched per ledger.
    diffs: BTreeMap<u32, BTreeSet<Key>>,
    /// Headers by sequence, plus the serialized header blob.
    ledgers: BTreeMap<u32, (LedgerHeader, Vec<u8>)>,
    /// Ledger hash to sequence.
    ledger_hashes: HashMap<Key, u32>,
    /// Transactions by hash.
    transactions: HashMap<Key, TransactionAndMetadata>,
    /// Transaction hashes per ledger.
    ledger_transactions: BTreeMap<u32, BTreeSet<Key>>,
    /// Account history rows: (account, (ledger, index)) to hash.
    account_tx: BTreeMap<(Vec<u8>, SeqIdx), Key>,
    /// Persisted range; two conceptual rows (min, max).
    range: Option<LedgerRange>,
}

/// In-memory [`BackendInterface`] implementation.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    core: BackendCore,
    store: RwLock<Store>,
    open: AtomicBool,
    /// Test hook: number of range fetches that fail with a timeout before
    /// one succeeds.
    range_fetch_failures: AtomicUsize,
    /// Test hook: total range fetch attempts.
    range_fetch_calls: AtomicUsize,
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the backend is currently open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Makes the next `count` calls to `hard_fetch_ledger_range` fail with
    /// a timeout-class error.
    pub fn fail_range_fetches(&self, count: usize) {
        self.range_fetch_failures.store(count, Ordering::SeqCst);
    }

    /// Number of `hard_fetch_ledger_range` calls observed.
    pub fn range_fetch_calls(&self) -> usize {
        self.range_fetch_calls.load(Ordering::SeqCst)
    }

    fn object_at(store: &Store, key: &Key, sequence: u32) -> Option<Vec<u8>> {
        let versions = store.objects.get(key)?;
        let (_, blob) = versions.range(..=sequence).next_back()?;
        if blob.is_empty() {
            None
        } else {
            Some(blob.clone())
        }
    }
}

#[async_trait]
impl BackendInterface for MemoryBackend {
    fn core(&self) -> &BackendCore {
        &self.core
    }

    async fn open(&self, read_only: bool) -> Result<()> {
        let range = self.store.read().range;
        self.core.set_range(range);
        self.open.store(true, Ordering::Release);
        info!(read_only, "opened in-memory backend");
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::Release);
        info!("closed in-memory backend");
    }

    async fn do_fetch_ledger_object(&self, key: &Key, sequence: u32) -> Result<Option<Vec<u8>>> {
        let store = self.store.read();
        Ok(Self::object_at(&store, key, sequence))
    }

    async fn do_fetch_ledger_objects(
        &self,
        keys: &[Key],
        sequence: u32,
    ) -> Result<Vec<Option<Vec<u8>>>> {
        let store = self.store.read();
        Ok(keys.iter().map(|key| Self::object_at(&store, key, sequence)).collect())
    }

    async fn do_fetch_successor_key(&self, key: &Key, sequence: u32) -> Result<Option<Key>> {
        let store = self.store.read();
        let Some(links) = store.successors.get(key) else {
            return Ok(None);
        };
        let next = links.range(..=sequence).next_back().map(|(_, next)| *next);
        Ok(next.filter(|next| *next != LAST_KEY))
    }

    async fn fetch_latest_ledger_sequence(&self) -> Result<Option<u32>> {
        Ok(self.store.read().range.map(|range| range.max_sequence))
    }

    async fn fetch_ledger_by_sequence(&self, sequence: u32) -> Result<Option<LedgerHeader>> {
        Ok(self.store.read().ledgers.get(&sequence).map(|(header, _)| header.clone()))
    }

    async fn fetch_ledger_by_hash(&self, hash: &Key) -> Result<Option<LedgerHeader>> {
        let sequence = match self.store.read().ledger_hashes.get(hash) {
            Some(sequence) => *sequence,
            None => return Ok(None),
        };
        self.fetch_ledger_by_sequence(sequence).await
    }

    async fn fetch_transaction(&self, hash: &Key) -> Result<Option<TransactionAndMetadata>> {
        Ok(self.store.read().transactions.get(hash).cloned())
    }

    async fn fetch_transactions(
        &self,
        hashes: &[Key],
    ) -> Result<Vec<Option<TransactionAndMetadata>>> {
        let store = self.store.read();
        Ok(hashes.iter().map(|hash| store.transactions.get(hash).cloned()).collect())
    }

    async fn fetch_all_transactions_in_ledger(
        &self,
        sequence: u32,
    ) -> Result<Vec<TransactionAndMetadata>> {
        let store = self.store.read();
        let Some(hashes) = store.ledger_transactions.get(&sequence) else {
            return Ok(Vec::new());
        };
        Ok(hashes.iter().filter_map(|hash| store.transactions.get(hash).cloned()).collect())
    }

    async fn fetch_all_transaction_hashes_in_ledger(&self, sequence: u32) -> Result<Vec<Key>> {
        let store = self.store.read();
        Ok(store
            .ledger_transactions
            .get(&sequence)
            .map(|hashes| hashes.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn fetch_account_transactions(
        &self,
        account: &[u8],
        limit: u32,
        forward: bool,
        cursor: Option<AccountTransactionsCursor>,
    ) -> Result<AccountTransactions> {
        let mut hashes: Vec<Key> = Vec::new();
        let mut last_position: Option<SeqIdx> = None;
        {
            let store = self.store.read();
            let low = (account.to_vec(), (0u32, 0u32));
            let high = (account.to_vec(), (u32::MAX, u32::MAX));

            if forward {
                let from = cursor
                    .map(|c| (c.ledger_sequence, c.transaction_index))
                    .unwrap_or((0, 0));
                for ((_, position), hash) in store.account_tx.range(low..=high) {
                    if *position <= from {
                        continue;
                    }
                    hashes.push(*hash);
                    last_position = Some(*position);
                    if hashes.len() as u32 >= limit {
                        break;
                    }
                }
            } else {
                let from = cursor
                    .map(|c| (c.ledger_sequence, c.transaction_index))
                    .unwrap_or((u32::MAX, u32::MAX));
                for ((_, position), hash) in store.account_tx.range(low..=high).rev() {
                    if *position >= from {
                        continue;
                    }
                    hashes.push(*hash);
                    last_position = Some(*position);
                    if hashes.len() as u32 >= limit {
                        break;
                    }
                }
            }
        }

        let cursor = if hashes.len() as u32 >= limit {
            last_position.map(|(ledger_sequence, transaction_index)| AccountTransactionsCursor {
                ledger_sequence,
                transaction_index,
            })
        } else {
            None
        };

        let mut transactions = Vec::with_capacity(hashes.len());
        for fetched in self.fetch_transactions(&hashes).await? {
            match fetched {
                Some(tx) => transactions.push(tx),
                None => warn!("account history row references a missing transaction"),
            }
        }
        Ok(AccountTransactions { transactions, cursor })
    }

    async fn fetch_ledger_diff(&self, sequence: u32) -> Result<Vec<LedgerObject>> {
        let store = self.store.read();
        let Some(keys) = store.diffs.get(&sequence) else {
            return Ok(Vec::new());
        };
        Ok(keys
            .iter()
            .map(|key| {
                let blob = store
                    .objects
                    .get(key)
                    .and_then(|versions| versions.get(&sequence).cloned())
                    .unwrap_or_default();
                LedgerObject { key: *key, blob }
            })
            .collect())
    }

    async fn hard_fetch_ledger_range(&self) -> Result<Option<LedgerRange>> {
        self.range_fetch_calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .range_fetch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if injected {
            return Err(BackendError::DatabaseTimeout);
        }
        Ok(self.store.read().range)
    }

    fn start_writes(&self) {}

    async fn write_ledger(&self, header: &LedgerHeader, serialized: Vec<u8>) -> Result<()> {
        let mut store = self.store.write();
        store.ledger_hashes.insert(header.hash, header.sequence);
        store.ledgers.insert(header.sequence, (header.clone(), serialized));
        Ok(())
    }

    async fn do_write_ledger_object(&self, key: Key, sequence: u32, blob: Vec<u8>) -> Result<()> {
        let mut store = self.store.write();
        store.objects.entry(key).or_default().insert(sequence, blob);
        store.diffs.entry(sequence).or_default().insert(key);
        Ok(())
    }

    async fn write_successor(&self, key: Key, sequence: u32, next: Key) -> Result<()> {
        let mut store = self.store.write();
        store.successors.entry(key).or_default().insert(sequence, next);
        Ok(())
    }

    async fn write_transaction(
        &self,
        hash: Key,
        sequence: u32,
        date: u64,
        transaction: Vec<u8>,
        metadata: Vec<u8>,
    ) -> Result<()> {
        let mut store = self.store.write();
        store.ledger_transactions.entry(sequence).or_default().insert(hash);
        store.transactions.insert(
            hash,
            TransactionAndMetadata { transaction, metadata, ledger_sequence: sequence, date },
        );
        Ok(())
    }

    async fn write_account_transactions(&self, rows: Vec<AccountTransactionsData>) -> Result<()> {
        let mut store = self.store.write();
        for row in rows {
            store
                .account_tx
                .insert((row.account, (row.ledger_sequence, row.transaction_index)), row.hash);
        }
        Ok(())
    }

    async fn do_finish_writes(&self, sequence: u32) -> Result<bool> {
        // Writes are applied synchronously, so the barrier is trivially
        // satisfied; only the range gate remains.
        let mut store = self.store.write();
        match store.range {
            None => {
                store.range = Some(LedgerRange { min_sequence: sequence, max_sequence: sequence });
                debug!(sequence, "committed first ledger");
                Ok(true)
            }
            Some(range) if range.max_sequence + 1 == sequence => {
                store.range =
                    Some(LedgerRange { min_sequence: range.min_sequence, max_sequence: sequence });
                debug!(sequence, "committed ledger");
                Ok(true)
            }
            Some(range) => {
                warn!(
                    sequence,
                    max_sequence = range.max_sequence,
                    "range update failed, sequence is not the next ledger"
                );
                Ok(false)
            }
        }
    }

    async fn online_delete(&self, num_ledgers_to_keep: u32) -> Result<bool> {
        let Some(range) = self.hard_fetch_ledger_range().await? else {
            return Ok(false);
        };
        let min_keep = range.max_sequence.saturating_sub(num_ledgers_to_keep.saturating_sub(1));
        if min_keep <= range.min_sequence {
            debug!(min_keep, "nothing to prune");
            return Ok(false);
        }
        info!(
            min_sequence = range.min_sequence,
            min_keep, "pruning history below retention horizon"
        );

        let mut store = self.store.write();
        for sequence in range.min_sequence..min_keep {
            let keys = store.diffs.remove(&sequence).unwrap_or_default();
            for key in keys {
                if let Some(versions) = store.objects.get_mut(&key) {
                    // Keep the newest row at or below the horizon so reads
                    // at min_keep still resolve.
                    let keep = versions.range(..=min_keep).next_back().map(|(seq, _)| *seq);
                    versions.retain(|seq, _| *seq > min_keep || Some(*seq) == keep);
                    if versions.is_empty() {
                        store.objects.remove(&key);
                    }
                }
                if let Some(links) = store.successors.get_mut(&key) {
                    let keep = links.range(..=min_keep).next_back().map(|(seq, _)| *seq);
                    links.retain(|seq, _| *seq > min_keep || Some(*seq) == keep);
                    if links.is_empty() {
                        store.successors.remove(&key);
                    }
                }
            }
            if let Some((header, _)) = store.ledgers.remove(&sequence) {
                store.ledger_hashes.remove(&header.hash);
            }
            for hash in store.ledger_transactions.remove(&sequence).unwrap_or_default() {
                if store.transactions.remove(&hash).is_none() {
                    debug!(hash = %hex(&hash), "pruned transaction was already gone");
                }
            }
        }

        let new_range =
            LedgerRange { min_sequence: min_keep, max_sequence: range.max_sequence };
        store.range = Some(new_range);
        drop(store);
        self.core.set_range(Some(new_range));
        info!(min_sequence = min_keep, "retention advanced range minimum");
        Ok(true)
    }
}
