//! SQL storage error types.

use idm_storage::StorageError;
use sqlx::Error as SqlxError;

/// Converts a `SQLx` error to a storage error.
#[allow(clippy::needless_pass_by_value)]
pub fn from_sqlx_error(err: SqlxError) -> StorageError {
    match err {
        SqlxError::RowNotFound => StorageError::Internal("Row not found".to_string()),
        SqlxError::Database(db_err) => {
            if db_err.is_unique_violation() {
                StorageError::already_exists("Record", "key", db_err.message())
            } else if db_err.is_foreign_key_violation() {
                StorageError::Internal(format!("Reference violation: {}", db_err.message()))
            } else {
                StorageError::Query(db_err.to_string())
            }
        }
        SqlxError::PoolTimedOut => StorageError::Connection("Connection pool timeout".to_string()),
        SqlxError::PoolClosed => StorageError::Connection("Connection pool closed".to_string()),
        SqlxError::Io(io) => StorageError::Io(io.to_string()),
        SqlxError::ColumnNotFound(column) => {
            StorageError::mapping(format!("column '{column}' missing from result"))
        }
        SqlxError::ColumnDecode { index, source } => {
            StorageError::mapping(format!("column {index} cannot be decoded: {source}"))
        }
        _ => StorageError::Internal(err.to_string()),
    }
}

/// Wraps a failure to start or finish a transaction.
#[allow(clippy::needless_pass_by_value)]
pub fn transaction_error(err: SqlxError) -> StorageError {
    StorageError::Transaction(err.to_string())
}
