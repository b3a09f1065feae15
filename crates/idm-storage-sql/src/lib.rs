//! # idm-storage-sql
//!
//! SQLx-based storage implementation for the identity management engine.
//!
//! Tables are generated from the mapping registry: one table per physical
//! unit, with columns typed from the field kinds. Each commit runs in one
//! transaction.
//!
//! - [`SqlBackend`] - the [`idm_storage::Backend`] over a `SQLite` pool
//! - [`PoolConfig`] - pool sizing and timeouts
//! - [`schema`] - DDL derived from [`idm_storage::MappingRegistry`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod convert;
pub mod error;
pub mod pool;
pub mod schema;

pub use backend::SqlBackend;
pub use error::from_sqlx_error;
pub use pool::{create_pool, PoolConfig};
