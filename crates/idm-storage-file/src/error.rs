//! File backend error conversion.

use std::path::Path;

use idm_storage::StorageError;

/// Converts an I/O failure on `path` to a storage error.
#[must_use]
pub fn io_error(path: &Path, err: &std::io::Error) -> StorageError {
    StorageError::Io(format!("{}: {err}", path.display()))
}

/// Converts a malformed region file to a storage error.
#[must_use]
pub fn format_error(path: &Path, err: &serde_json::Error) -> StorageError {
    StorageError::Serialization(format!("{}: {err}", path.display()))
}
