//! # idm-spi
//!
//! Extension points for the identity management engine.
//!
//! ## Design
//!
//! Pluggable behavior is expressed as traits and wired through an explicit
//! registry built at startup:
//! - [`IdentityContext`] - ambient partition and caller for one unit of work
//! - [`CredentialHandler`] - validates and updates one credential type
//! - [`CredentialStore`] - the history operations handlers may use
//! - [`CredentialHandlerRegistry`] - handlers keyed by credential type

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod handler;
pub mod registry;

pub use context::IdentityContext;
pub use handler::{CredentialHandler, CredentialStore};
pub use registry::CredentialHandlerRegistry;
