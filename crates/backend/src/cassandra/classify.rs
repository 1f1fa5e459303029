//! Driver error classification.
//!
//! Maps scylla driver outcomes onto the backend taxonomy. The timeout class
//! covers every outcome the server never confirmed: no hosts reachable,
//! client-side request timeout, server unavailable, server overloaded, and
//! server read/write timeouts. Writes re-issue on these; reads surface
//! `DatabaseTimeout`.

use scylla::transport::errors::{DbError, NewSessionError, QueryError};

use chronicle_types::error::InvalidQuerySnafu;
use chronicle_types::BackendError;

/// Timeout-class outcomes: the request may or may not have been applied.
pub(crate) fn is_timeout(error: &QueryError) -> bool {
    match error {
        QueryError::TimeoutError | QueryError::RequestTimeout(_) => true,
        QueryError::IoError(_) => true,
        QueryError::DbError(db, _) => matches!(
            db,
            DbError::Unavailable { .. }
                | DbError::Overloaded
                | DbError::ReadTimeout { .. }
                | DbError::WriteTimeout { .. }
        ),
        _ => false,
    }
}

/// Server-side rejections of the statement itself. Programmer errors; never
/// retried.
pub(crate) fn is_invalid_query(error: &QueryError) -> bool {
    match error {
        QueryError::BadQuery(_) => true,
        QueryError::DbError(db, _) => {
            matches!(db, DbError::SyntaxError | DbError::Invalid | DbError::Unauthorized)
        }
        _ => false,
    }
}

/// Converts a driver error into the backend taxonomy.
pub(crate) fn classify(error: QueryError) -> BackendError {
    if is_timeout(&error) {
        return BackendError::DatabaseTimeout;
    }
    if is_invalid_query(&error) {
        return InvalidQuerySnafu { message: error.to_string() }.build();
    }
    BackendError::Driver { message: error.to_string() }
}

/// Converts a session construction error.
pub(crate) fn session_error(error: NewSessionError) -> BackendError {
    BackendError::Driver { message: error.to_string() }
}
