//! # idm-model
//!
//! Domain models for the identity management engine.
//!
//! - [`Partition`] - Realm and Tier scoping units
//! - [`IdentityType`] - polymorphic identity over [`IdentityKind`]
//! - [`Attributes`] - multi-valued attribute bag
//! - [`Relationship`] - N-ary typed association over [`RelationshipKind`]
//! - [`CredentialStorage`] - one record of a credential history

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attribute;
pub mod attributed;
pub mod credential;
pub mod error;
pub mod identity;
pub mod partition;
pub mod relationship;

pub use attribute::{AttributeValue, Attributes, Scalar};
pub use attributed::AttributedType;
pub use credential::{
    CredentialStorage, CredentialType, CredentialUpdate, Credentials, ValidationResult,
    ValidationStatus,
};
pub use error::{ModelError, ModelResult};
pub use identity::{Agent, Group, IdentityClass, IdentityKind, IdentityType, Role, User};
pub use partition::{Partition, PartitionKind};
pub use relationship::{descriptor, MemberSlot, Relationship, RelationshipKind};
