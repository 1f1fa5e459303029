//! Backend configuration.
//!
//! Configuration is loaded from TOML files; every struct validates its
//! values at construction time via a fallible builder, and exposes
//! `validate()` for post-deserialization checks.

// The schemars `JsonSchema` derive macro internally uses `.unwrap()` in its
// expansions. Config types are declarative structs with minimal procedural
// code, so allow it at module level.
#![allow(clippy::disallowed_methods)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Default cap on concurrent in-flight driver requests.
const DEFAULT_MAX_REQUESTS_OUTSTANDING: usize = 10_000;

/// Default cap while the retention procedure runs. Kept small so the
/// cluster retains headroom for live reads.
const DEFAULT_INDEXER_MAX_REQUESTS_OUTSTANDING: usize = 10;

/// Configuration validation error.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

/// Cassandra backend configuration.
///
/// # Validation Rules
///
/// - `contact_points` must be non-empty
/// - `keyspace` and `table_prefix` must match `[a-z][a-z0-9_]*` / `[a-z0-9_]*`
/// - `max_requests_outstanding` must be >= 1
/// - `indexer_max_requests_outstanding` must be >= 1 and <=
///   `max_requests_outstanding`
///
/// # Example
///
/// ```no_run
/// # use chronicle_types::config::CassandraConfig;
/// let config = CassandraConfig::builder()
///     .contact_points(vec!["127.0.0.1:9042".to_string()])
///     .keyspace("chronicle")
///     .build()
///     .expect("valid cassandra config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CassandraConfig {
    /// Cluster contact points, `host:port`.
    pub contact_points: Vec<String>,
    /// Keyspace holding all tables.
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
    /// Username for password authentication.
    #[serde(default)]
    pub username: Option<String>,
    /// Password for password authentication.
    #[serde(default)]
    pub password: Option<String>,
    /// Replication factor used when creating the keyspace.
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u16,
    /// Prefix applied to every table name.
    #[serde(default)]
    pub table_prefix: String,
    /// Row TTL in seconds; 0 keeps rows forever.
    #[serde(default)]
    pub ttl_secs: u32,
    /// Maximum concurrent in-flight driver requests.
    #[serde(default = "default_max_requests_outstanding")]
    pub max_requests_outstanding: usize,
    /// In-flight request cap while the retention procedure runs.
    #[serde(default = "default_indexer_max_requests_outstanding")]
    pub indexer_max_requests_outstanding: usize,
}

#[bon::bon]
impl CassandraConfig {
    /// Creates a new Cassandra configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    #[builder]
    pub fn new(
        contact_points: Vec<String>,
        #[builder(default = default_keyspace(), into)] keyspace: String,
        username: Option<String>,
        password: Option<String>,
        #[builder(default = default_replication_factor())] replication_factor: u16,
        #[builder(default, into)] table_prefix: String,
        #[builder(default)] ttl_secs: u32,
        #[builder(default = default_max_requests_outstanding())] max_requests_outstanding: usize,
        #[builder(default = default_indexer_max_requests_outstanding())]
        indexer_max_requests_outstanding: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            contact_points,
            keyspace,
            username,
            password,
            replication_factor,
            table_prefix,
            ttl_secs,
            max_requests_outstanding,
            indexer_max_requests_outstanding,
        };
        config.validate()?;
        Ok(config)
    }
}

impl CassandraConfig {
    /// Validates the configuration values.
    ///
    /// Call after deserialization to ensure values are within valid ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.contact_points.is_empty() {
            return Err(ConfigError::Validation {
                message: "contact_points must not be empty".to_string(),
            });
        }
        if !is_identifier(&self.keyspace) {
            return Err(ConfigError::Validation {
                message: format!(
                    "keyspace must match [a-z][a-z0-9_]*, got {:?}",
                    self.keyspace
                ),
            });
        }
        if !self.table_prefix.is_empty() && !is_identifier(&self.table_prefix) {
            return Err(ConfigError::Validation {
                message: format!(
                    "table_prefix must match [a-z][a-z0-9_]*, got {:?}",
                    self.table_prefix
                ),
            });
        }
        if self.replication_factor == 0 {
            return Err(ConfigError::Validation {
                message: "replication_factor must be >= 1".to_string(),
            });
        }
        if self.max_requests_outstanding == 0 {
            return Err(ConfigError::Validation {
                message: "max_requests_outstanding must be >= 1".to_string(),
            });
        }
        if self.indexer_max_requests_outstanding == 0
            || self.indexer_max_requests_outstanding > self.max_requests_outstanding
        {
            return Err(ConfigError::Validation {
                message: format!(
                    "indexer_max_requests_outstanding must be in 1..={}, got {}",
                    self.max_requests_outstanding, self.indexer_max_requests_outstanding
                ),
            });
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn default_keyspace() -> String {
    "chronicle".to_string()
}

fn default_replication_factor() -> u16 {
    3
}

fn default_max_requests_outstanding() -> usize {
    DEFAULT_MAX_REQUESTS_OUTSTANDING
}

fn default_indexer_max_requests_outstanding() -> usize {
    DEFAULT_INDEXER_MAX_REQUESTS_OUTSTANDING
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_builder_config() -> CassandraConfig {
        CassandraConfig::builder()
            .contact_points(vec!["127.0.0.1:9042".to_string()])
            .build()
            .expect("defaults should be valid")
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = base_builder_config();
        assert_eq!(config.keyspace, "chronicle");
        assert_eq!(config.replication_factor, 3);
        assert_eq!(config.table_prefix, "");
        assert_eq!(config.ttl_secs, 0);
        assert_eq!(config.max_requests_outstanding, 10_000);
        assert_eq!(config.indexer_max_requests_outstanding, 10);
    }

    #[test]
    fn test_empty_contact_points_rejected() {
        let result = CassandraConfig::builder().contact_points(vec![]).build();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("contact_points"));
    }

    #[test]
    fn test_keyspace_charset() {
        let result = CassandraConfig::builder()
            .contact_points(vec!["db:9042".to_string()])
            .keyspace("Bad-Name")
            .build();
        assert!(result.is_err());

        let result = CassandraConfig::builder()
            .contact_points(vec!["db:9042".to_string()])
            .keyspace("ledger_v2")
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_indexer_cap_bounded_by_main_cap() {
        let result = CassandraConfig::builder()
            .contact_points(vec!["db:9042".to_string()])
            .max_requests_outstanding(5)
            .indexer_max_requests_outstanding(6)
            .build();
        assert!(result.is_err());

        let result = CassandraConfig::builder()
            .contact_points(vec!["db:9042".to_string()])
            .max_requests_outstanding(5)
            .indexer_max_requests_outstanding(5)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_zero_caps_rejected() {
        let result = CassandraConfig::builder()
            .contact_points(vec!["db:9042".to_string()])
            .max_requests_outstanding(0)
            .build();
        assert!(result.is_err());

        let result = CassandraConfig::builder()
            .contact_points(vec!["db:9042".to_string()])
            .indexer_max_requests_outstanding(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialization_applies_defaults() {
        let config: CassandraConfig =
            serde_json::from_str(r#"{"contact_points": ["db:9042"]}"#).unwrap();
        config.validate().unwrap();
        assert_eq!(config.keyspace, "chronicle");
        assert_eq!(config.indexer_max_requests_outstanding, 10);
    }
}
