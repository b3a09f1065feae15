//! Backend-agnostic query definitions.
//!
//! Queries are plain values: the engine evaluates them against materialized
//! entities, so every backend answers them the same way.

pub mod identity;
pub mod parameter;
pub mod relationship;
pub mod sort;

pub use identity::IdentityQuery;
pub use parameter::{IdentityParameter, IdentityRef, QueryValue, Stage};
pub use relationship::{RelationshipParameter, RelationshipQuery};
pub use sort::{default_keys, Page, Sort};
