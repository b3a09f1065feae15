//! # idm-manager
//!
//! The identity management engine.
//!
//! [`IdentityManager`] runs every operation against a [`Backend`]:
//!
//! - partitions: realms and tiers, with a lazily created default realm
//! - identities: agents, users, groups and roles with attribute bags
//! - relationships: grants, group memberships and group roles
//! - queries: predicate filtering, sorting and pagination
//! - credentials: time-windowed history plus handler dispatch
//!
//! Mutations are serialized through one write lock and committed as a
//! single batch, so readers never see half of a cascade.
//!
//! ```no_run
//! use idm_core::Config;
//! use idm_model::IdentityType;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = idm_manager::open(&Config::default()).await?;
//! let ctx = manager.default_context().await?;
//! manager.add_identity(&ctx, IdentityType::user("alice")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`Backend`]: idm_storage::Backend

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod attributed;
mod credential;
mod identity;
mod manager;
mod partition;
mod query;
mod relationship;
mod view;

pub use manager::{open, open_backend, open_with, IdentityManager, IdentityManagerBuilder};
