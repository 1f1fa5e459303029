//! The backend capability set.
//!
//! Any implementation providing the required `do_*` operations satisfies the
//! abstraction; the provided methods glue the versioned cache in front of
//! the persistent operations and implement the read-path compositions
//! (batched point reads, successor walks, ledger pages, book offers) once,
//! identically for every backend.
//!
//! All read methods are read-only, idempotent, and safe to call
//! concurrently; none of them block writes. Writes for a single ledger are
//! enclosed in `start_writes … finish_writes(seq)`; the range advance inside
//! `finish_writes` is the publication boundary readers rely on.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use chronicle_types::directory::{book_upper_bound, DirectoryPage};
use chronicle_types::error::DataIntegritySnafu;
use chronicle_types::{
    hex, AccountTransactions, AccountTransactionsCursor, AccountTransactionsData, BookOffersPage,
    Key, LedgerHeader, LedgerObject, LedgerPage, LedgerRange, Result, SuccessorLink,
    TransactionAndMetadata, FIRST_KEY,
};

use crate::cache::StateCache;

/// State shared by every backend implementation: the versioned cache and
/// the in-memory copy of the persisted ledger range.
#[derive(Debug, Default)]
pub struct BackendCore {
    cache: StateCache,
    range: RwLock<Option<LedgerRange>>,
}

impl BackendCore {
    /// Creates an empty core.
    pub fn new() -> Self {
        Self::default()
    }

    /// The versioned state cache.
    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    /// The current in-memory copy of the ledger range.
    pub fn ledger_range(&self) -> Option<LedgerRange> {
        *self.range.read()
    }

    /// Replaces the in-memory range copy, e.g. after `open` or retention.
    pub fn set_range(&self, range: Option<LedgerRange>) {
        *self.range.write() = range;
    }

    /// Advances the in-memory range to include `sequence`, or establishes
    /// `[sequence, sequence]` when no range exists yet.
    pub fn update_range(&self, sequence: u32) {
        let mut range = self.range.write();
        *range = Some(match *range {
            Some(current) => LedgerRange {
                min_sequence: current.min_sequence,
                max_sequence: sequence,
            },
            None => LedgerRange { min_sequence: sequence, max_sequence: sequence },
        });
    }
}

/// Uniform interface over a pluggable persistent store.
#[async_trait]
pub trait BackendInterface: Send + Sync {
    /// Shared cache and range state.
    fn core(&self) -> &BackendCore;

    /// The versioned state cache fronting point reads.
    fn cache(&self) -> &StateCache {
        self.core().cache()
    }

    /// In-memory copy of the ledger range. Only `finish_writes` and the
    /// retention procedure move it.
    fn ledger_range(&self) -> Option<LedgerRange> {
        self.core().ledger_range()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Opens the backend. Unless `read_only`, missing keyspace and tables
    /// are created.
    async fn open(&self, read_only: bool) -> Result<()>;

    /// Closes the backend, draining in-flight writes first.
    async fn close(&self);

    // =========================================================================
    // Read path: required operations
    // =========================================================================

    /// Fetches the blob of `key` as of `sequence` from the persistent
    /// store: the row with the greatest sequence at most `sequence`. An
    /// empty blob (tombstone) resolves to `None`.
    async fn do_fetch_ledger_object(&self, key: &Key, sequence: u32) -> Result<Option<Vec<u8>>>;

    /// Batch variant of [`BackendInterface::do_fetch_ledger_object`]: one
    /// result per input key, in input order.
    async fn do_fetch_ledger_objects(
        &self,
        keys: &[Key],
        sequence: u32,
    ) -> Result<Vec<Option<Vec<u8>>>>;

    /// Resolves the successor of `key` as of `sequence` from the persistent
    /// index. A link to the end-of-set sentinel resolves to `None`.
    async fn do_fetch_successor_key(&self, key: &Key, sequence: u32) -> Result<Option<Key>>;

    /// The newest complete ledger sequence recorded in the store.
    async fn fetch_latest_ledger_sequence(&self) -> Result<Option<u32>>;

    /// Fetches a ledger header by sequence.
    async fn fetch_ledger_by_sequence(&self, sequence: u32) -> Result<Option<LedgerHeader>>;

    /// Fetches a ledger header by hash.
    async fn fetch_ledger_by_hash(&self, hash: &Key) -> Result<Option<LedgerHeader>>;

    /// Fetches one transaction by hash.
    async fn fetch_transaction(&self, hash: &Key) -> Result<Option<TransactionAndMetadata>>;

    /// Fetches transactions by hash, one result per input, in input order.
    async fn fetch_transactions(
        &self,
        hashes: &[Key],
    ) -> Result<Vec<Option<TransactionAndMetadata>>>;

    /// All transactions of one ledger.
    async fn fetch_all_transactions_in_ledger(
        &self,
        sequence: u32,
    ) -> Result<Vec<TransactionAndMetadata>>;

    /// Hashes of all transactions of one ledger.
    async fn fetch_all_transaction_hashes_in_ledger(&self, sequence: u32) -> Result<Vec<Key>>;

    /// A page of one account's transaction history, keyed by
    /// `(ledger_sequence, transaction_index)`, in either direction.
    async fn fetch_account_transactions(
        &self,
        account: &[u8],
        limit: u32,
        forward: bool,
        cursor: Option<AccountTransactionsCursor>,
    ) -> Result<AccountTransactions>;

    /// The `(key, blob)` changes recorded for one ledger. An empty blob
    /// marks a deletion.
    async fn fetch_ledger_diff(&self, sequence: u32) -> Result<Vec<LedgerObject>>;

    /// Reads the persisted ledger range. Timeout-class failures surface as
    /// [`chronicle_types::BackendError::DatabaseTimeout`].
    async fn hard_fetch_ledger_range(&self) -> Result<Option<LedgerRange>>;

    // =========================================================================
    // Write path: required operations
    // =========================================================================

    /// Begins a ledger's write batch.
    fn start_writes(&self);

    /// Writes the ledger header, both by sequence and by hash.
    async fn write_ledger(&self, header: &LedgerHeader, serialized: Vec<u8>) -> Result<()>;

    /// Writes one state-object row. An empty blob writes a tombstone.
    async fn do_write_ledger_object(&self, key: Key, sequence: u32, blob: Vec<u8>) -> Result<()>;

    /// Writes one successor-index row.
    async fn write_successor(&self, key: Key, sequence: u32, next: Key) -> Result<()>;

    /// Writes one transaction and its per-ledger index row.
    async fn write_transaction(
        &self,
        hash: Key,
        sequence: u32,
        date: u64,
        transaction: Vec<u8>,
        metadata: Vec<u8>,
    ) -> Result<()>;

    /// Writes a batch of account-transactions index rows.
    async fn write_account_transactions(&self, rows: Vec<AccountTransactionsData>) -> Result<()>;

    /// Waits for the ledger's in-flight writes, then publishes `sequence`
    /// by conditionally advancing the persisted range. Returns false when a
    /// write failure surfaced at the barrier or the range update was not
    /// applied.
    async fn do_finish_writes(&self, sequence: u32) -> Result<bool>;

    // =========================================================================
    // Retention
    // =========================================================================

    /// Prunes history so that at most `num_ledgers_to_keep` ledgers remain,
    /// preserving point-in-time reads at every kept sequence. Returns true
    /// when the range minimum advanced.
    async fn online_delete(&self, num_ledgers_to_keep: u32) -> Result<bool>;

    // =========================================================================
    // Read path: provided compositions
    // =========================================================================

    /// Fetches the blob of `key` as of `sequence`, consulting the cache
    /// first. `None` means the key is absent at that sequence.
    async fn fetch_ledger_object(&self, key: &Key, sequence: u32) -> Result<Option<Vec<u8>>> {
        if let Some(blob) = self.cache().get(key, sequence) {
            debug!(key = %hex(key), "object cache hit");
            return Ok(Some(blob));
        }
        debug!(key = %hex(key), "object cache miss");
        self.do_fetch_ledger_object(key, sequence).await
    }

    /// Batch point fetch preserving input order: each cache hit is used in
    /// place, the misses are fetched through one batched store round trip.
    async fn fetch_ledger_objects(
        &self,
        keys: &[Key],
        sequence: u32,
    ) -> Result<Vec<Option<Vec<u8>>>> {
        let mut results: Vec<Option<Vec<u8>>> = vec![None; keys.len()];
        let mut misses = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            match self.cache().get(key, sequence) {
                Some(blob) => results[i] = Some(blob),
                None => misses.push(*key),
            }
        }
        debug!(
            hits = keys.len() - misses.len(),
            misses = misses.len(),
            "batch object fetch"
        );
        if !misses.is_empty() {
            let fetched = self.do_fetch_ledger_objects(&misses, sequence).await?;
            let mut next_fetched = fetched.into_iter();
            for slot in results.iter_mut() {
                if slot.is_none() {
                    *slot = next_fetched.next().flatten();
                }
            }
        }
        Ok(results)
    }

    /// Resolves the successor of `key` at `sequence`, consulting the cache
    /// first.
    async fn fetch_successor_key(&self, key: &Key, sequence: u32) -> Result<Option<Key>> {
        if let Some(successor) = self.cache().get_successor(key, sequence) {
            debug!(key = %hex(key), "successor cache hit");
            return Ok(Some(successor.key));
        }
        debug!(key = %hex(key), "successor cache miss");
        self.do_fetch_successor_key(key, sequence).await
    }

    /// Resolves the successor of `key` at `sequence` together with its
    /// object.
    async fn fetch_successor_object(
        &self,
        key: &Key,
        sequence: u32,
    ) -> Result<Option<LedgerObject>> {
        let Some(successor) = self.fetch_successor_key(key, sequence).await? else {
            return Ok(None);
        };
        match self.fetch_ledger_object(&successor, sequence).await? {
            Some(blob) => Ok(Some(LedgerObject { key: successor, blob })),
            None => {
                // The successor index named a key with no live object; the
                // index and the object store disagree.
                warn!(key = %hex(&successor), sequence, "successor key has no object");
                Ok(None)
            }
        }
    }

    /// One page of ordered state iteration: walks successor keys from
    /// `cursor` (or the start of the key space), batch-fetches the objects,
    /// and returns the last key as the forward cursor when the page filled.
    async fn fetch_ledger_page(
        &self,
        cursor: Option<Key>,
        sequence: u32,
        limit: u32,
    ) -> Result<LedgerPage> {
        let mut keys: Vec<Key> = Vec::new();
        while (keys.len() as u32) < limit {
            let current = match keys.last() {
                Some(key) => *key,
                None => cursor.unwrap_or(FIRST_KEY),
            };
            match self.fetch_successor_key(&current, sequence).await? {
                Some(next) => keys.push(next),
                None => break,
            }
        }

        let objects = self.fetch_ledger_objects(&keys, sequence).await?;
        let mut page = LedgerPage::default();
        for (key, object) in keys.into_iter().zip(objects) {
            match object {
                Some(blob) => page.objects.push(LedgerObject { key, blob }),
                // Every key in the successor index is live at `sequence`.
                None => warn!(key = %hex(&key), sequence, "page key has no object"),
            }
        }
        if page.objects.len() as u32 >= limit {
            page.cursor = page.objects.last().map(|object| object.key);
        }
        Ok(page)
    }

    /// Collects offers from the book rooted at `book`: walks the book's
    /// directories in quality order, follows each directory's page chain,
    /// and batch-resolves the collected offer keys.
    ///
    /// The walk always starts at the book root. Chain pages are linked by
    /// opaque keys unrelated to successor order, so a mid-chain position
    /// cannot be resumed by key; `_cursor` is accepted for interface
    /// compatibility and ignored.
    async fn fetch_book_offers(
        &self,
        book: &Key,
        sequence: u32,
        limit: u32,
        _cursor: Option<Key>,
    ) -> Result<BookOffersPage> {
        let book_end = book_upper_bound(book);
        let mut tip = *book;
        let mut keys: Vec<Key> = Vec::new();

        while (keys.len() as u32) < limit {
            let Some(mut dir) = self.fetch_successor_object(&tip, sequence).await? else {
                break;
            };
            if dir.key > book_end {
                break;
            }
            while (keys.len() as u32) < limit {
                tip = dir.key;
                let page = DirectoryPage::from_bytes(&dir.blob).map_err(|err| {
                    DataIntegritySnafu { message: format!("directory page: {err}") }.build()
                })?;
                keys.extend(page.entries.iter().copied());
                let Some(next_key) = page.next else {
                    break;
                };
                let Some(blob) = self.fetch_ledger_object(&next_key, sequence).await? else {
                    warn!(key = %hex(&next_key), sequence, "directory chain broken");
                    break;
                };
                dir = LedgerObject { key: next_key, blob };
            }
        }

        let objects = self.fetch_ledger_objects(&keys, sequence).await?;
        let mut page = BookOffersPage::default();
        for (key, object) in keys.iter().zip(objects).take(limit as usize) {
            match object {
                Some(blob) => page.offers.push(LedgerObject { key: *key, blob }),
                None => warn!(key = %hex(key), sequence, "offer key has no object"),
            }
        }
        Ok(page)
    }

    /// Reads the persisted range, retrying timeout-class failures only.
    async fn hard_fetch_ledger_range_no_throw(&self) -> Result<Option<LedgerRange>> {
        loop {
            match self.hard_fetch_ledger_range().await {
                Ok(range) => return Ok(range),
                Err(err) if err.is_timeout() => {
                    debug!("ledger range fetch timed out, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    // =========================================================================
    // Write path: provided compositions
    // =========================================================================

    /// Writes one state-object row. The typed key fixes the 32-byte width
    /// the store requires.
    async fn write_ledger_object(&self, key: Key, sequence: u32, blob: Vec<u8>) -> Result<()> {
        self.do_write_ledger_object(key, sequence, blob).await
    }

    /// Writes a batch of successor-index rows.
    async fn write_successors(&self, links: Vec<SuccessorLink>) -> Result<()> {
        for link in links {
            self.write_successor(link.key, link.sequence, link.next).await?;
        }
        Ok(())
    }

    /// Publishes ledger `sequence`: barriers the ledger's writes, advances
    /// the persisted range, and on success advances the in-memory copy.
    async fn finish_writes(&self, sequence: u32) -> Result<bool> {
        let committed = self.do_finish_writes(sequence).await?;
        if committed {
            self.core().update_range(sequence);
        }
        Ok(committed)
    }
}
