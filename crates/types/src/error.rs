//! Error taxonomy for backend operations using snafu.
//!
//! Four classes of failure, with distinct propagation rules:
//! - **Timeout-class**: the server did not confirm the request; the outcome
//!   is unknown. Writes re-issue, reads surface `DatabaseTimeout`.
//! - **Invalid query**: the server rejected the statement outright. A
//!   programmer error; fails fast.
//! - **Transient driver errors**: retried on writes, logged and surfaced on
//!   reads.
//! - **Data integrity**: a row with an unexpected shape. Fatal to the call.

use snafu::{Location, Snafu};

/// Unified result type for backend operations.
pub type Result<T, E = BackendError> = std::result::Result<T, E>;

/// Top-level error type for backend operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BackendError {
    /// The server did not confirm the request in time. The request may or
    /// may not have been applied.
    #[snafu(display("database request timed out"))]
    DatabaseTimeout,

    /// The server rejected the query outright.
    #[snafu(display("invalid query at {location}: {message}"))]
    InvalidQuery {
        /// Error description from the server.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// A driver failure that is neither a timeout nor a rejection.
    #[snafu(display("driver error: {message}"))]
    Driver {
        /// Error description.
        message: String,
    },

    /// A fetched row did not have the expected shape.
    #[snafu(display("unexpected row shape at {location}: {message}"))]
    DataIntegrity {
        /// Description of the mismatch.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// The backend has not been opened, or has been closed.
    #[snafu(display("backend is not open"))]
    NotOpen,
}

impl BackendError {
    /// Returns true for timeout-class errors: outcomes the server never
    /// confirmed. Range reads retry on these; all other reads surface them
    /// to the caller as transient failures.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::DatabaseTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        assert!(BackendError::DatabaseTimeout.is_timeout());
        assert!(!BackendError::Driver { message: "broken pipe".to_string() }.is_timeout());
        assert!(!BackendError::NotOpen.is_timeout());
    }

    #[test]
    fn test_error_display() {
        let err = BackendError::Driver { message: "connection reset".to_string() };
        assert_eq!(err.to_string(), "driver error: connection reset");
    }

    #[test]
    fn test_invalid_query_carries_location() {
        let err = InvalidQuerySnafu { message: "unknown column".to_string() }.build();
        let display = err.to_string();
        assert!(display.contains("invalid query"));
        assert!(display.contains("unknown column"));
    }
}
