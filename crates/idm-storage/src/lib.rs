//! # idm-storage
//!
//! Storage contract for the identity management engine.
//!
//! This crate defines everything a persistence backend and the engine
//! agree on, without assuming how bytes are stored:
//!
//! - [`StorageError`] - the engine-wide error taxonomy
//! - [`mapping`] - declarative binding of domain types to physical units,
//!   with [`MappingRegistry::materialize`] and
//!   [`MappingRegistry::dematerialize`]
//! - [`Backend`] - region loads and atomic [`WriteBatch`] commits
//! - [`query`] - identity and relationship query definitions

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod mapping;
pub mod query;
pub mod stored;

pub use backend::{Backend, Region, StoreSnapshot, WriteBatch, WriteOp};
pub use error::{StorageError, StorageResult};
pub use mapping::{EntityRecord, FieldKind, FieldValue, Mapped, MappingRegistry, PhysicalRecord, TypeKey};
pub use query::{
    IdentityParameter, IdentityQuery, IdentityRef, Page, QueryValue, RelationshipParameter,
    RelationshipQuery, Sort,
};
pub use stored::StoredRelationship;
