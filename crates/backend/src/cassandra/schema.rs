//! Schema and prepared-statement catalog.
//!
//! Nine tables in a single keyspace. Object and successor rows are
//! versioned by ledger sequence; the clustering orders are chosen so the
//! hot "greatest sequence at most S" lookups read one row. The catalog is
//! built once at `open` and is read-only afterwards; every hot-path
//! operation runs one of these preparations at QUORUM.
//!
//! When a row TTL is configured it is baked into the insert texts at
//! prepare time, so the bound values stay the same with and without it.

use scylla::prepared_statement::PreparedStatement;
use scylla::statement::Consistency;
use scylla::Session;

use chronicle_types::config::CassandraConfig;
use chronicle_types::Result;

use super::classify::classify;

/// Returns the prefixed name of a table.
pub(crate) fn table(config: &CassandraConfig, base: &str) -> String {
    format!("{}{}", config.table_prefix, base)
}

/// DDL creating the keyspace.
pub(crate) fn create_keyspace(config: &CassandraConfig) -> String {
    format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
         {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        config.keyspace, config.replication_factor
    )
}

/// DDL creating the tables, in creation order.
pub(crate) fn create_tables(config: &CassandraConfig) -> Vec<String> {
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {} (key blob, sequence bigint, object blob, \
             PRIMARY KEY (key, sequence)) WITH CLUSTERING ORDER BY (sequence DESC)",
            table(config, "objects")
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (key blob, seq bigint, next blob, \
             PRIMARY KEY (key, seq)) WITH CLUSTERING ORDER BY (seq ASC)",
            table(config, "successor")
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (seq bigint, key blob, PRIMARY KEY (seq, key))",
            table(config, "diff")
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (sequence bigint PRIMARY KEY, header blob)",
            table(config, "ledgers")
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (hash blob PRIMARY KEY, sequence bigint)",
            table(config, "ledger_hashes")
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (is_latest boolean PRIMARY KEY, sequence bigint)",
            table(config, "ledger_range")
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (hash blob PRIMARY KEY, ledger_seq bigint, \
             date bigint, transaction blob, metadata blob)",
            table(config, "transactions")
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (ledger_seq bigint, hash blob, \
             PRIMARY KEY (ledger_seq, hash))",
            table(config, "ledger_transactions")
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (account blob, seq_idx tuple<bigint, bigint>, \
             hash blob, PRIMARY KEY (account, seq_idx)) \
             WITH CLUSTERING ORDER BY (seq_idx DESC)",
            table(config, "account_tx")
        ),
    ]
}

fn ttl_suffix(config: &CassandraConfig) -> String {
    if config.ttl_secs > 0 {
        format!(" USING TTL {}", config.ttl_secs)
    } else {
        String::new()
    }
}

/// The prepared-statement catalog. Built at `open`, read-only afterwards.
pub(crate) struct PreparedStatements {
    pub insert_object: PreparedStatement,
    pub insert_successor: PreparedStatement,
    pub insert_diff: PreparedStatement,
    pub insert_ledger_header: PreparedStatement,
    pub insert_ledger_hash: PreparedStatement,
    pub insert_transaction: PreparedStatement,
    pub insert_ledger_transaction: PreparedStatement,
    pub insert_account_tx: PreparedStatement,

    pub select_object: PreparedStatement,
    pub select_successor: PreparedStatement,
    pub select_diff: PreparedStatement,
    pub select_ledger_by_seq: PreparedStatement,
    pub select_ledger_by_hash: PreparedStatement,
    pub select_latest_ledger: PreparedStatement,
    pub select_ledger_range: PreparedStatement,
    pub select_transaction: PreparedStatement,
    pub select_ledger_tx_hashes: PreparedStatement,
    pub select_account_tx: PreparedStatement,
    pub select_account_tx_forward: PreparedStatement,

    /// Serves both rows of the range: binds `(sequence, is_latest,
    /// previous)`; `IN (?, null)` lets the same preparation initialize a
    /// missing row and conditionally advance an existing one.
    pub update_ledger_range: PreparedStatement,

    // Retention
    pub select_object_versions: PreparedStatement,
    pub select_successor_versions: PreparedStatement,
    pub delete_object_version: PreparedStatement,
    pub delete_successor_version: PreparedStatement,
    pub delete_diff: PreparedStatement,
    pub delete_ledger: PreparedStatement,
    pub delete_ledger_hash: PreparedStatement,
    pub delete_ledger_transactions: PreparedStatement,
    pub delete_transaction: PreparedStatement,
}

/// The statement texts, separated from preparation so they can be checked
/// without a session.
pub(crate) struct StatementTexts {
    pub insert_object: String,
    pub insert_successor: String,
    pub insert_diff: String,
    pub insert_ledger_header: String,
    pub insert_ledger_hash: String,
    pub insert_transaction: String,
    pub insert_ledger_transaction: String,
    pub insert_account_tx: String,
    pub select_object: String,
    pub select_successor: String,
    pub select_diff: String,
    pub select_ledger_by_seq: String,
    pub select_ledger_by_hash: String,
    pub select_latest_ledger: String,
    pub select_ledger_range: String,
    pub select_transaction: String,
    pub select_ledger_tx_hashes: String,
    pub select_account_tx: String,
    pub select_account_tx_forward: String,
    pub update_ledger_range: String,
    pub select_object_versions: String,
    pub select_successor_versions: String,
    pub delete_object_version: String,
    pub delete_successor_version: String,
    pub delete_diff: String,
    pub delete_ledger: String,
    pub delete_ledger_hash: String,
    pub delete_ledger_transactions: String,
    pub delete_transaction: String,
}

impl StatementTexts {
    pub(crate) fn new(config: &CassandraConfig) -> Self {
        let ttl = ttl_suffix(config);
        Self {
            insert_object: format!(
                "INSERT INTO {} (key, sequence, object) VALUES (?, ?, ?){ttl}",
                table(config, "objects")
            ),
            insert_successor: format!(
                "INSERT INTO {} (key, seq, next) VALUES (?, ?, ?){ttl}",
                table(config, "successor")
            ),
            insert_diff: format!(
                "INSERT INTO {} (seq, key) VALUES (?, ?){ttl}",
                table(config, "diff")
            ),
            insert_ledger_header: format!(
                "INSERT INTO {} (sequence, header) VALUES (?, ?){ttl}",
                table(config, "ledgers")
            ),
            insert_ledger_hash: format!(
                "INSERT INTO {} (hash, sequence) VALUES (?, ?){ttl}",
                table(config, "ledger_hashes")
            ),
            insert_transaction: format!(
                "INSERT INTO {} (hash, ledger_seq, date, transaction, metadata) \
                 VALUES (?, ?, ?, ?, ?){ttl}",
                table(config, "transactions")
            ),
            insert_ledger_transaction: format!(
                "INSERT INTO {} (ledger_seq, hash) VALUES (?, ?){ttl}",
                table(config, "ledger_transactions")
            ),
            insert_account_tx: format!(
                "INSERT INTO {} (account, seq_idx, hash) VALUES (?, ?, ?){ttl}",
                table(config, "account_tx")
            ),
            select_object: format!(
                "SELECT object FROM {} WHERE key = ? AND sequence <= ? \
                 ORDER BY sequence DESC LIMIT 1",
                table(config, "objects")
            ),
            select_successor: format!(
                "SELECT next FROM {} WHERE key = ? AND seq <= ? ORDER BY seq DESC LIMIT 1",
                table(config, "successor")
            ),
            select_diff: format!("SELECT key FROM {} WHERE seq = ?", table(config, "diff")),
            select_ledger_by_seq: format!(
                "SELECT header FROM {} WHERE sequence = ?",
                table(config, "ledgers")
            ),
            select_ledger_by_hash: format!(
                "SELECT sequence FROM {} WHERE hash = ?",
                table(config, "ledger_hashes")
            ),
            select_latest_ledger: format!(
                "SELECT sequence FROM {} WHERE is_latest = true",
                table(config, "ledger_range")
            ),
            select_ledger_range: format!(
                "SELECT is_latest, sequence FROM {}",
                table(config, "ledger_range")
            ),
            select_transaction: format!(
                "SELECT transaction, metadata, ledger_seq, date FROM {} WHERE hash = ?",
                table(config, "transactions")
            ),
            select_ledger_tx_hashes: format!(
                "SELECT hash FROM {} WHERE ledger_seq = ?",
                table(config, "ledger_transactions")
            ),
            select_account_tx: format!(
                "SELECT hash, seq_idx FROM {} WHERE account = ? AND seq_idx < ? LIMIT ?",
                table(config, "account_tx")
            ),
            select_account_tx_forward: format!(
                "SELECT hash, seq_idx FROM {} WHERE account = ? AND seq_idx > ? \
                 ORDER BY seq_idx ASC LIMIT ?",
                table(config, "account_tx")
            ),
            update_ledger_range: format!(
                "UPDATE {} SET sequence = ? WHERE is_latest = ? IF sequence IN (?, null)",
                table(config, "ledger_range")
            ),
            select_object_versions: format!(
                "SELECT sequence FROM {} WHERE key = ? AND sequence <= ?",
                table(config, "objects")
            ),
            select_successor_versions: format!(
                "SELECT seq FROM {} WHERE key = ? AND seq <= ?",
                table(config, "successor")
            ),
            delete_object_version: format!(
                "DELETE FROM {} WHERE key = ? AND sequence = ?",
                table(config, "objects")
            ),
            delete_successor_version: format!(
                "DELETE FROM {} WHERE key = ? AND seq = ?",
                table(config, "successor")
            ),
            delete_diff: format!("DELETE FROM {} WHERE seq = ?", table(config, "diff")),
            delete_ledger: format!(
                "DELETE FROM {} WHERE sequence = ?",
                table(config, "ledgers")
            ),
            delete_ledger_hash: format!(
                "DELETE FROM {} WHERE hash = ?",
                table(config, "ledger_hashes")
            ),
            delete_ledger_transactions: format!(
                "DELETE FROM {} WHERE ledger_seq = ?",
                table(config, "ledger_transactions")
            ),
            delete_transaction: format!(
                "DELETE FROM {} WHERE hash = ?",
                table(config, "transactions")
            ),
        }
    }
}

async fn prepare(session: &Session, text: String) -> Result<PreparedStatement> {
    let mut prepared = session.prepare(text).await.map_err(classify)?;
    prepared.set_consistency(Consistency::Quorum);
    Ok(prepared)
}

impl PreparedStatements {
    /// Prepares the full catalog. All statements run at QUORUM.
    pub(crate) async fn build(session: &Session, config: &CassandraConfig) -> Result<Self> {
        let texts = StatementTexts::new(config);
        Ok(Self {
            insert_object: prepare(session, texts.insert_object).await?,
            insert_successor: prepare(session, texts.insert_successor).await?,
            insert_diff: prepare(session, texts.insert_diff).await?,
            insert_ledger_header: prepare(session, texts.insert_ledger_header).await?,
            insert_ledger_hash: prepare(session, texts.insert_ledger_hash).await?,
            insert_transaction: prepare(session, texts.insert_transaction).await?,
            insert_ledger_transaction: prepare(session, texts.insert_ledger_transaction).await?,
            insert_account_tx: prepare(session, texts.insert_account_tx).await?,
            select_object: prepare(session, texts.select_object).await?,
            select_successor: prepare(session, texts.select_successor).await?,
            select_diff: prepare(session, texts.select_diff).await?,
            select_ledger_by_seq: prepare(session, texts.select_ledger_by_seq).await?,
            select_ledger_by_hash: prepare(session, texts.select_ledger_by_hash).await?,
            select_latest_ledger: prepare(session, texts.select_latest_ledger).await?,
            select_ledger_range: prepare(session, texts.select_ledger_range).await?,
            select_transaction: prepare(session, texts.select_transaction).await?,
            select_ledger_tx_hashes: prepare(session, texts.select_ledger_tx_hashes).await?,
            select_account_tx: prepare(session, texts.select_account_tx).await?,
            select_account_tx_forward: prepare(session, texts.select_account_tx_forward).await?,
            update_ledger_range: prepare(session, texts.update_ledger_range).await?,
            select_object_versions: prepare(session, texts.select_object_versions).await?,
            select_successor_versions: prepare(session, texts.select_successor_versions).await?,
            delete_object_version: prepare(session, texts.delete_object_version).await?,
            delete_successor_version: prepare(session, texts.delete_successor_version).await?,
            delete_diff: prepare(session, texts.delete_diff).await?,
            delete_ledger: prepare(session, texts.delete_ledger).await?,
            delete_ledger_hash: prepare(session, texts.delete_ledger_hash).await?,
            delete_ledger_transactions: prepare(session, texts.delete_ledger_transactions).await?,
            delete_transaction: prepare(session, texts.delete_transaction).await?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn config(prefix: &str, ttl: u32) -> CassandraConfig {
        CassandraConfig::builder()
            .contact_points(vec!["db:9042".to_string()])
            .table_prefix(prefix)
            .ttl_secs(ttl)
            .build()
            .expect("valid config")
    }

    #[test]
    fn test_table_prefix_applies_everywhere() {
        let config = config("rpt_", 0);
        for ddl in create_tables(&config) {
            assert!(ddl.contains(" rpt_"), "missing prefix in: {ddl}");
        }
        let texts = StatementTexts::new(&config);
        assert!(texts.select_object.contains("rpt_objects"));
        assert!(texts.update_ledger_range.contains("rpt_ledger_range"));
        assert!(texts.insert_account_tx.contains("rpt_account_tx"));
    }

    #[test]
    fn test_ttl_baked_into_inserts_only() {
        let config = config("", 86_400);
        let texts = StatementTexts::new(&config);
        assert!(texts.insert_object.ends_with("USING TTL 86400"));
        assert!(texts.insert_transaction.ends_with("USING TTL 86400"));
        assert!(!texts.select_object.contains("TTL"));
        assert!(!texts.delete_object_version.contains("TTL"));

        let no_ttl = StatementTexts::new(&config_without_ttl());
        assert!(!no_ttl.insert_object.contains("TTL"));
    }

    fn config_without_ttl() -> CassandraConfig {
        config("", 0)
    }

    #[test]
    fn test_keyspace_ddl_uses_replication_factor() {
        let config = CassandraConfig::builder()
            .contact_points(vec!["db:9042".to_string()])
            .replication_factor(5)
            .build()
            .unwrap();
        let ddl = create_keyspace(&config);
        assert!(ddl.contains("'replication_factor': 5"));
        assert!(ddl.contains("chronicle"));
    }

    #[test]
    fn test_nine_tables_created() {
        let config = config("", 0);
        let ddl = create_tables(&config);
        assert_eq!(ddl.len(), 9);
        for (ddl, name) in ddl.iter().zip([
            "objects",
            "successor",
            "diff",
            "ledgers",
            "ledger_hashes",
            "ledger_range",
            "transactions",
            "ledger_transactions",
            "account_tx",
        ]) {
            assert!(ddl.contains(name), "{name} missing in: {ddl}");
        }
    }

    #[test]
    fn test_range_update_is_conditional() {
        let texts = StatementTexts::new(&config("", 0));
        assert!(texts.update_ledger_range.contains("IF sequence IN (?, null)"));
    }
}
