//! Cassandra backend.
//!
//! Persists the data model in a wide-column cluster through the scylla
//! driver. Writes are issued asynchronously under the admission cap and
//! retried until the server confirms them; `do_finish_writes` is the sync
//! barrier that linearizes a ledger's writes before the range advance
//! publishes it. Reads are synchronous, classify driver failures per the
//! error taxonomy, and surface timeout-class outcomes as
//! `DatabaseTimeout`.

mod classify;
mod schema;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use scylla::frame::response::result::CqlValue;
use scylla::prepared_statement::PreparedStatement;
use scylla::serialize::row::SerializeRow;
use scylla::{QueryResult, Session, SessionBuilder};
use tracing::{debug, error, info, warn};

use chronicle_types::config::CassandraConfig;
use chronicle_types::error::DataIntegritySnafu;
use chronicle_types::key::key_from_slice;
use chronicle_types::{
    hex, AccountTransactions, AccountTransactionsCursor, AccountTransactionsData, BackendError,
    Key, LedgerHeader, LedgerObject, LedgerRange, Result, TransactionAndMetadata, LAST_KEY,
};

use crate::interface::{BackendCore, BackendInterface};
use crate::pipeline::WriteThrottle;

use classify::{classify, is_invalid_query, is_timeout, session_error};
use schema::PreparedStatements;

/// Delay between attempts of the synchronous retry loops.
const SYNC_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Exponent cap for the async write backoff: waits double per attempt up
/// to 2^10 ms.
const MAX_BACKOFF_EXPONENT: u32 = 10;

struct OpenState {
    session: Arc<Session>,
    statements: PreparedStatements,
}

/// Lowers the admission cap for the duration of a retention run.
struct IndexerModeGuard<'a> {
    throttle: &'a WriteThrottle,
}

impl<'a> IndexerModeGuard<'a> {
    fn enter(throttle: &'a WriteThrottle) -> Self {
        throttle.set_indexer_mode(true);
        Self { throttle }
    }
}

impl Drop for IndexerModeGuard<'_> {
    fn drop(&mut self) {
        self.throttle.set_indexer_mode(false);
    }
}

/// [`BackendInterface`] implementation over a Cassandra/Scylla cluster.
pub struct CassandraBackend {
    core: BackendCore,
    config: CassandraConfig,
    throttle: Arc<WriteThrottle>,
    state: RwLock<Option<Arc<OpenState>>>,
}

impl CassandraBackend {
    /// Creates a closed backend; call [`BackendInterface::open`] before use.
    pub fn new(config: CassandraConfig) -> Self {
        let throttle = Arc::new(WriteThrottle::new(
            config.max_requests_outstanding,
            config.indexer_max_requests_outstanding,
        ));
        Self { core: BackendCore::new(), config, throttle, state: RwLock::new(None) }
    }

    fn state(&self) -> Result<Arc<OpenState>> {
        self.state.read().clone().ok_or(BackendError::NotOpen)
    }

    /// Issues an asynchronous write under the admission cap. The spawned
    /// task re-issues the statement with exponential backoff until the
    /// server confirms it, without re-acquiring a slot. A server rejection
    /// poisons the pipeline for the next barrier instead of retrying.
    async fn queue_write<V>(&self, statement: PreparedStatement, values: V) -> Result<()>
    where
        V: SerializeRow + Send + Sync + 'static,
    {
        let state = self.state()?;
        self.throttle.acquire().await;
        let session = Arc::clone(&state.session);
        let throttle = Arc::clone(&self.throttle);
        tokio::spawn(async move {
            let mut retries: u32 = 0;
            loop {
                match session.execute(&statement, &values).await {
                    Ok(_) => break,
                    Err(err) if is_invalid_query(&err) => {
                        error!(error = %err, "async write rejected by the server");
                        throttle.poison();
                        break;
                    }
                    Err(err) => {
                        let wait =
                            Duration::from_millis(1 << retries.min(MAX_BACKOFF_EXPONENT));
                        if is_timeout(&err) {
                            warn!(error = %err, retries, "async write unconfirmed, re-issuing");
                        } else {
                            warn!(error = %err, retries, "async write failed, retrying");
                        }
                        tokio::time::sleep(wait).await;
                        retries = retries.saturating_add(1);
                    }
                }
            }
            throttle.release();
        });
        Ok(())
    }

    /// Executes a write synchronously, retrying on any failure until the
    /// server confirms it.
    async fn execute_sync_write<V: SerializeRow>(
        &self,
        statement: &PreparedStatement,
        values: &V,
    ) -> Result<()> {
        let state = self.state()?;
        loop {
            match state.session.execute(statement, values).await {
                Ok(_) => return Ok(()),
                Err(err) => {
                    warn!(error = %err, "sync write failed, retrying");
                    tokio::time::sleep(SYNC_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Executes a conditional update synchronously and reads its
    /// `[applied]` column. A result that was not applied after a failed
    /// attempt is reported as applied: the server may have applied the
    /// mutation in the background, and the caller rechecks on the next
    /// call.
    async fn execute_sync_update<V: SerializeRow>(
        &self,
        statement: &PreparedStatement,
        values: &V,
    ) -> Result<bool> {
        let state = self.state()?;
        let mut timed_out = false;
        let result = loop {
            match state.session.execute(statement, values).await {
                Ok(result) => break result,
                Err(err) => {
                    timed_out = true;
                    warn!(error = %err, "conditional update failed, retrying");
                    tokio::time::sleep(SYNC_RETRY_DELAY).await;
                }
            }
        };
        let rows = result.rows().map_err(|err| {
            DataIntegritySnafu { message: format!("conditional update: {err}") }.build()
        })?;
        let Some(row) = rows.first() else {
            error!("conditional update returned no rows");
            return Ok(false);
        };
        let applied = matches!(row.columns.first(), Some(Some(CqlValue::Boolean(true))));
        if !applied && timed_out {
            warn!("conditional update not applied after a timeout, treating as applied");
        }
        Ok(applied || timed_out)
    }

    /// Executes a read synchronously. Timeout-class outcomes surface as
    /// `DatabaseTimeout`, server rejections fail fast, anything else is
    /// logged and retried.
    async fn execute_sync_read<V: SerializeRow>(
        &self,
        statement: &PreparedStatement,
        values: &V,
    ) -> Result<QueryResult> {
        let state = self.state()?;
        loop {
            match state.session.execute(statement, values).await {
                Ok(result) => return Ok(result),
                Err(err) if is_timeout(&err) => return Err(BackendError::DatabaseTimeout),
                Err(err) if is_invalid_query(&err) => return Err(classify(err)),
                Err(err) => error!(error = %err, "sync read failed, retrying"),
            }
        }
    }

    /// Fetches the raw object row for `key` at `sequence`, tombstones
    /// included. The diff read needs the empty blob to distinguish a
    /// deletion.
    async fn fetch_object_row(&self, key: &Key, sequence: u32) -> Result<Option<Vec<u8>>> {
        let state = self.state()?;
        let result = self
            .execute_sync_read(&state.statements.select_object, &(key.to_vec(), sequence as i64))
            .await?;
        let row = result.maybe_first_row_typed::<(Vec<u8>,)>().map_err(|err| {
            DataIntegritySnafu { message: format!("object row: {err}") }.build()
        })?;
        Ok(row.map(|(blob,)| blob))
    }

    /// Fetches raw object rows for `keys` concurrently, each read under an
    /// admission slot.
    async fn fetch_object_rows(
        &self,
        keys: &[Key],
        sequence: u32,
    ) -> Result<Vec<Option<Vec<u8>>>> {
        let reads = keys.iter().map(|key| async move {
            self.throttle.acquire().await;
            let result = self.fetch_object_row(key, sequence).await;
            self.throttle.release();
            result
        });
        futures::future::join_all(reads).await.into_iter().collect()
    }
}

#[async_trait]
impl BackendInterface for CassandraBackend {
    fn core(&self) -> &BackendCore {
        &self.core
    }

    async fn open(&self, read_only: bool) -> Result<()> {
        let mut builder = SessionBuilder::new();
        for node in &self.config.contact_points {
            builder = builder.known_node(node);
        }
        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            builder = builder.user(user.as_str(), pass.as_str());
        }
        let session = builder.build().await.map_err(session_error)?;

        if !read_only {
            session.query(schema::create_keyspace(&self.config), ()).await.map_err(classify)?;
        }
        session.use_keyspace(self.config.keyspace.as_str(), false).await.map_err(classify)?;
        if !read_only {
            for ddl in schema::create_tables(&self.config) {
                session.query(ddl, ()).await.map_err(classify)?;
            }
        }

        let statements = PreparedStatements::build(&session, &self.config).await?;
        *self.state.write() =
            Some(Arc::new(OpenState { session: Arc::new(session), statements }));

        let range = self.hard_fetch_ledger_range_no_throw().await?;
        self.core.set_range(range);
        info!(keyspace = %self.config.keyspace, read_only, "opened cassandra backend");
        Ok(())
    }

    async fn close(&self) {
        self.throttle.sync().await;
        *self.state.write() = None;
        info!("closed cassandra backend");
    }

    async fn do_fetch_ledger_object(&self, key: &Key, sequence: u32) -> Result<Option<Vec<u8>>> {
        let row = self.fetch_object_row(key, sequence).await?;
        Ok(row.filter(|blob| !blob.is_empty()))
    }

    async fn do_fetch_ledger_objects(
        &self,
        keys: &[Key],
        sequence: u32,
    ) -> Result<Vec<Option<Vec<u8>>>> {
        let rows = self.fetch_object_rows(keys, sequence).await?;
        Ok(rows.into_iter().map(|row| row.filter(|blob| !blob.is_empty())).collect())
    }

    async fn do_fetch_successor_key(&self, key: &Key, sequence: u32) -> Result<Option<Key>> {
        let state = self.state()?;
        let result = self
            .execute_sync_read(
                &state.statements.select_successor,
                &(key.to_vec(), sequence as i64),
            )
            .await?;
        let row = result.maybe_first_row_typed::<(Vec<u8>,)>().map_err(|err| {
            DataIntegritySnafu { message: format!("successor row: {err}") }.build()
        })?;
        let Some((next,)) = row else {
            return Ok(None);
        };
        let next = key_from_slice(&next).ok_or_else(|| {
            DataIntegritySnafu { message: format!("successor key of {} bytes", next.len()) }
                .build()
        })?;
        Ok((next != LAST_KEY).then_some(next))
    }

    async fn fetch_latest_ledger_sequence(&self) -> Result<Option<u32>> {
        let state = self.state()?;
        let result =
            self.execute_sync_read(&state.statements.select_latest_ledger, &()).await?;
        let row = result.maybe_first_row_typed::<(i64,)>().map_err(|err| {
            DataIntegritySnafu { message: format!("latest ledger row: {err}") }.build()
        })?;
        Ok(row.map(|(sequence,)| sequence as u32))
    }

    async fn fetch_ledger_by_sequence(&self, sequence: u32) -> Result<Option<LedgerHeader>> {
        let state = self.state()?;
        let result = self
            .execute_sync_read(&state.statements.select_ledger_by_seq, &(sequence as i64,))
            .await?;
        let row = result.maybe_first_row_typed::<(Vec<u8>,)>().map_err(|err| {
            DataIntegritySnafu { message: format!("ledger row: {err}") }.build()
        })?;
        match row {
            None => Ok(None),
            Some((header,)) => {
                let header = LedgerHeader::from_bytes(&header).map_err(|err| {
                    DataIntegritySnafu { message: format!("ledger header: {err}") }.build()
                })?;
                Ok(Some(header))
            }
        }
    }

    async fn fetch_ledger_by_hash(&self, hash: &Key) -> Result<Option<LedgerHeader>> {
        let state = self.state()?;
        let result = self
            .execute_sync_read(&state.statements.select_ledger_by_hash, &(hash.to_vec(),))
            .await?;
        let row = result.maybe_first_row_typed::<(i64,)>().map_err(|err| {
            DataIntegritySnafu { message: format!("ledger hash row: {err}") }.build()
        })?;
        match row {
            None => Ok(None),
            Some((sequence,)) => self.fetch_ledger_by_sequence(sequence as u32).await,
        }
    }

    async fn fetch_transaction(&self, hash: &Key) -> Result<Option<TransactionAndMetadata>> {
        let state = self.state()?;
        let result = self
            .execute_sync_read(&state.statements.select_transaction, &(hash.to_vec(),))
            .await?;
        let row = result
            .maybe_first_row_typed::<(Vec<u8>, Vec<u8>, i64, i64)>()
            .map_err(|err| {
                DataIntegritySnafu { message: format!("transaction row: {err}") }.build()
            })?;
        Ok(row.map(|(transaction, metadata, ledger_sequence, date)| TransactionAndMetadata {
            transaction,
            metadata,
            ledger_sequence: ledger_sequence as u32,
            date: date as u64,
        }))
    }

    async fn fetch_transactions(
        &self,
        hashes: &[Key],
    ) -> Result<Vec<Option<TransactionAndMetadata>>> {
        let reads = hashes.iter().map(|hash| async move {
            self.throttle.acquire().await;
            let result = self.fetch_transaction(hash).await;
            self.throttle.release();
            result
        });
        futures::future::join_all(reads).await.into_iter().collect()
    }

    async fn fetch_all_transactions_in_ledger(
        &self,
        sequence: u32,
    ) -> Result<Vec<TransactionAndMetadata>> {
        let hashes = self.fetch_all_transaction_hashes_in_ledger(sequence).await?;
        let mut transactions = Vec::with_capacity(hashes.len());
        for (hash, fetched) in hashes.iter().zip(self.fetch_transactions(&hashes).await?) {
            match fetched {
                Some(tx) => transactions.push(tx),
                None => warn!(hash = %hex(hash), sequence, "indexed transaction is missing"),
            }
        }
        Ok(transactions)
    }

    async fn fetch_all_transaction_hashes_in_ledger(&self, sequence: u32) -> Result<Vec<Key>> {
        let state = self.state()?;
        let result = self
            .execute_sync_read(&state.statements.select_ledger_tx_hashes, &(sequence as i64,))
            .await?;
        let rows = result.rows_typed::<(Vec<u8>,)>().map_err(|err| {
            DataIntegritySnafu { message: format!("transaction hash rows: {err}") }.build()
        })?;
        let mut hashes = Vec::new();
        for row in rows {
            let (hash,) = row.map_err(|err| {
                DataIntegritySnafu { message: format!("transaction hash row: {err}") }.build()
            })?;
            hashes.push(key_from_slice(&hash).ok_or_else(|| {
                DataIntegritySnafu { message: format!("transaction hash of {} bytes", hash.len()) }
                    .build()
            })?);
        }
        Ok(hashes)
    }

    async fn fetch_account_transactions(
        &self,
        account: &[u8],
        limit: u32,
        forward: bool,
        cursor: Option<AccountTransactionsCursor>,
    ) -> Result<AccountTransactions> {
        let state = self.state()?;
        let position = cursor
            .map(|c| (i64::from(c.ledger_sequence), i64::from(c.transaction_index)))
            .unwrap_or(if forward {
                (0, 0)
            } else {
                (i64::from(u32::MAX), i64::from(u32::MAX))
            });
        let statement = if forward {
            &state.statements.select_account_tx_forward
        } else {
            &state.statements.select_account_tx
        };
        let result = self
            .execute_sync_read(statement, &(account.to_vec(), position, limit as i32))
            .await?;
        let rows = result.rows_typed::<(Vec<u8>, (i64, i64))>().map_err(|err| {
            DataIntegritySnafu { message: format!("account tx rows: {err}") }.build()
        })?;

        let mut hashes = Vec::new();
        let mut last_position = None;
        for row in rows {
            let (hash, position) = row.map_err(|err| {
                DataIntegritySnafu { message: format!("account tx row: {err}") }.build()
            })?;
            hashes.push(key_from_slice(&hash).ok_or_else(|| {
                DataIntegritySnafu { message: format!("account tx hash of {} bytes", hash.len()) }
                    .build()
            })?);
            last_position = Some(position);
        }

        let cursor = if hashes.len() as u32 >= limit {
            last_position.map(|(ledger_sequence, transaction_index)| AccountTransactionsCursor {
                ledger_sequence: ledger_sequence as u32,
                transaction_index: transaction_index as u32,
            })
        } else {
            None
        };

        let mut transactions = Vec::with_capacity(hashes.len());
        for (hash, fetched) in hashes.iter().zip(self.fetch_transactions(&hashes).await?) {
            match fetched {
                Some(tx) => transactions.push(tx),
                None => warn!(hash = %hex(hash), "account history references a missing transaction"),
            }
        }
        Ok(AccountTransactions { transactions, cursor })
    }

    async fn fetch_ledger_diff(&self, sequence: u32) -> Result<Vec<LedgerObject>> {
        let state = self.state()?;
        let result =
            self.execute_sync_read(&state.statements.select_diff, &(sequence as i64,)).await?;
        let rows = result.rows_typed::<(Vec<u8>,)>().map_err(|err| {
            DataIntegritySnafu { message: format!("diff rows: {err}") }.build()
        })?;
        let mut keys = Vec::new();
        for row in rows {
            let (key,) = row.map_err(|err| {
                DataIntegritySnafu { message: format!("diff row: {err}") }.build()
            })?;
            keys.push(key_from_slice(&key).ok_or_else(|| {
                DataIntegritySnafu { message: format!("diff key of {} bytes", key.len()) }.build()
            })?);
        }
        let blobs = self.fetch_object_rows(&keys, sequence).await?;
        Ok(keys
            .into_iter()
            .zip(blobs)
            .map(|(key, blob)| LedgerObject { key, blob: blob.unwrap_or_default() })
            .collect())
    }

    async fn hard_fetch_ledger_range(&self) -> Result<Option<LedgerRange>> {
        let state = self.state()?;
        let result =
            self.execute_sync_read(&state.statements.select_ledger_range, &()).await?;
        let rows = result.rows_typed::<(bool, i64)>().map_err(|err| {
            DataIntegritySnafu { message: format!("range rows: {err}") }.build()
        })?;
        let mut min = None;
        let mut max = None;
        for row in rows {
            let (is_latest, sequence) = row.map_err(|err| {
                DataIntegritySnafu { message: format!("range row: {err}") }.build()
            })?;
            if is_latest {
                max = Some(sequence as u32);
            } else {
                min = Some(sequence as u32);
            }
        }
        Ok(match (min, max) {
            (None, None) => None,
            (Some(min), Some(max)) => Some(LedgerRange { min_sequence: min, max_sequence: max }),
            (Some(only), None) | (None, Some(only)) => {
                Some(LedgerRange { min_sequence: only, max_sequence: only })
            }
        })
    }

    fn start_writes(&self) {}

    async fn write_ledger(&self, header: &LedgerHeader, serialized: Vec<u8>) -> Result<()> {
        let state = self.state()?;
        self.queue_write(
            state.statements.insert_ledger_header.clone(),
            (i64::from(header.sequence), serialized),
        )
        .await?;
        self.queue_write(
            state.statements.insert_ledger_hash.clone(),
            (header.hash.to_vec(), i64::from(header.sequence)),
        )
        .await
    }

    async fn do_write_ledger_object(&self, key: Key, sequence: u32, blob: Vec<u8>) -> Result<()> {
        let state = self.state()?;
        self.queue_write(
            state.statements.insert_object.clone(),
            (key.to_vec(), i64::from(sequence), blob),
        )
        .await?;
        self.queue_write(
            state.statements.insert_diff.clone(),
            (i64::from(sequence), key.to_vec()),
        )
        .await
    }

    async fn write_successor(&self, key: Key, sequence: u32, next: Key) -> Result<()> {
        let state = self.state()?;
        self.queue_write(
            state.statements.insert_successor.clone(),
            (key.to_vec(), i64::from(sequence), next.to_vec()),
        )
        .await
    }

    async fn write_transaction(
        &self,
        hash: Key,
        sequence: u32,
        date: u64,
        transaction: Vec<u8>,
        metadata: Vec<u8>,
    ) -> Result<()> {
        let state = self.state()?;
        self.queue_write(
            state.statements.insert_ledger_transaction.clone(),
            (i64::from(sequence), hash.to_vec()),
        )
        .await?;
        self.queue_write(
            state.statements.insert_transaction.clone(),
            (hash.to_vec(), i64::from(sequence), date as i64, transaction, metadata),
        )
        .await
    }

    async fn write_account_transactions(&self, rows: Vec<AccountTransactionsData>) -> Result<()> {
        let state = self.state()?;
        for row in rows {
            self.queue_write(
                state.statements.insert_account_tx.clone(),
                (
                    row.account,
                    (i64::from(row.ledger_sequence), i64::from(row.transaction_index)),
                    row.hash.to_vec(),
                ),
            )
            .await?;
        }
        Ok(())
    }

    async fn do_finish_writes(&self, sequence: u32) -> Result<bool> {
        let state = self.state()?;
        // Barrier: wait for the ledger's writes before publishing it.
        self.throttle.sync().await;
        if self.throttle.take_poisoned() {
            warn!(sequence, "write failure surfaced at the barrier");
            return Ok(false);
        }
        if self.ledger_range().is_none() {
            // First ever ledger: initialize the minimum row. If the CAS
            // below fails, this row is left behind; the original behaves
            // the same way.
            self.execute_sync_write(
                &state.statements.update_ledger_range,
                &(i64::from(sequence), false, i64::from(sequence)),
            )
            .await?;
        }
        let advanced = self
            .execute_sync_update(
                &state.statements.update_ledger_range,
                &(i64::from(sequence), true, i64::from(sequence) - 1),
            )
            .await?;
        if !advanced {
            warn!(sequence, "range update failed, not publishing ledger");
            return Ok(false);
        }
        debug!(sequence, "committed ledger");
        Ok(true)
    }

    async fn online_delete(&self, num_ledgers_to_keep: u32) -> Result<bool> {
        let state = self.state()?;
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
        let _indexer = IndexerModeGuard::enter(&self.throttle);

        for sequence in range.min_sequence..min_keep {
            let keys: Vec<Key> = self
                .fetch_ledger_diff(sequence)
                .await?
                .into_iter()
                .map(|object| object.key)
                .collect();
            for key in keys {
                // Objects: keep the newest row at or below the horizon so
                // reads at min_keep still resolve; delete the rest.
                let result = self
                    .execute_sync_read(
                        &state.statements.select_object_versions,
                        &(key.to_vec(), i64::from(min_keep)),
                    )
                    .await?;
                let versions = result.rows_typed::<(i64,)>().map_err(|err| {
                    DataIntegritySnafu { message: format!("object versions: {err}") }.build()
                })?;
                // Clustered descending: the first row is the one to keep.
                for (index, version) in versions.enumerate() {
                    let (version,) = version.map_err(|err| {
                        DataIntegritySnafu { message: format!("object version: {err}") }.build()
                    })?;
                    if index > 0 {
                        self.queue_write(
                            state.statements.delete_object_version.clone(),
                            (key.to_vec(), version),
                        )
                        .await?;
                    }
                }

                // Successor rows follow the same newest-row-wins rule,
                // which keeps point-in-time iteration correct at every
                // kept sequence.
                let result = self
                    .execute_sync_read(
                        &state.statements.select_successor_versions,
                        &(key.to_vec(), i64::from(min_keep)),
                    )
                    .await?;
                let rows = result.rows_typed::<(i64,)>().map_err(|err| {
                    DataIntegritySnafu { message: format!("successor versions: {err}") }.build()
                })?;
                let mut versions = Vec::new();
                for row in rows {
                    let (version,) = row.map_err(|err| {
                        DataIntegritySnafu { message: format!("successor version: {err}") }
                            .build()
                    })?;
                    versions.push(version);
                }
                // Clustered ascending: the last row is the one to keep.
                versions.pop();
                for version in versions {
                    self.queue_write(
                        state.statements.delete_successor_version.clone(),
                        (key.to_vec(), version),
                    )
                    .await?;
                }
            }

            if let Some(header) = self.fetch_ledger_by_sequence(sequence).await? {
                self.queue_write(
                    state.statements.delete_ledger_hash.clone(),
                    (header.hash.to_vec(),),
                )
                .await?;
            }
            for hash in self.fetch_all_transaction_hashes_in_ledger(sequence).await? {
                self.queue_write(
                    state.statements.delete_transaction.clone(),
                    (hash.to_vec(),),
                )
                .await?;
            }
            self.queue_write(
                state.statements.delete_ledger_transactions.clone(),
                (i64::from(sequence),),
            )
            .await?;
            self.queue_write(state.statements.delete_diff.clone(), (i64::from(sequence),))
                .await?;
            self.queue_write(state.statements.delete_ledger.clone(), (i64::from(sequence),))
                .await?;
        }

        self.throttle.sync().await;
        let advanced = self
            .execute_sync_update(
                &state.statements.update_ledger_range,
                &(i64::from(min_keep), false, i64::from(range.min_sequence)),
            )
            .await?;
        if advanced {
            self.core.set_range(Some(LedgerRange {
                min_sequence: min_keep,
                max_sequence: range.max_sequence,
            }));
            info!(min_sequence = min_keep, "retention advanced range minimum");
        } else {
            warn!(min_sequence = min_keep, "retention range update was not applied");
        }
        Ok(advanced)
    }
}
