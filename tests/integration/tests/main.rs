//! End-to-end integration tests.
//!
//! Every scenario runs against the file backend (temporary directory) and
//! the SQL backend (in-memory SQLite).

mod common;
mod credentials;
mod identities;
mod mapping;
mod partitions;
mod queries;
mod relationships;
