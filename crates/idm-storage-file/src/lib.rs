//! # idm-storage-file
//!
//! Flat-file backend for the identity management engine.
//!
//! Every region lives in memory as an immutable [`snapshot::Snapshot`].
//! A commit clones the snapshot, applies the batch, and stages each touched
//! region file. A [`journal::Journal`] then records the renames that put
//! the staged files in place, so a crash mid-commit is finished on the next
//! open. Only then is the new snapshot published to readers.
//!
//! ## Example
//!
//! ```rust,ignore
//! use idm_core::FileStoreConfig;
//! use idm_storage_file::FileBackend;
//!
//! let backend = FileBackend::open(&FileStoreConfig::new("/var/lib/idm")).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod journal;
pub mod snapshot;

pub use backend::FileBackend;
pub use error::io_error;
