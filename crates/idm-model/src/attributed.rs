//! Attributed types accepted by the generic add/update/remove surface.

use uuid::Uuid;

use crate::attribute::Attributes;
use crate::identity::IdentityType;
use crate::relationship::Relationship;

/// Anything the engine can add, update, or remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributedType {
    /// An identity.
    Identity(IdentityType),
    /// A relationship.
    Relationship(Relationship),
}

impl AttributedType {
    /// Returns the id, if assigned.
    #[must_use]
    pub const fn id(&self) -> Option<Uuid> {
        match self {
            Self::Identity(identity) => identity.id,
            Self::Relationship(relationship) => relationship.id,
        }
    }

    /// Returns the attribute bag.
    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        match self {
            Self::Identity(identity) => &identity.attributes,
            Self::Relationship(relationship) => &relationship.attributes,
        }
    }

    /// Returns the concrete type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Identity(identity) => identity.type_name(),
            Self::Relationship(relationship) => relationship.kind.as_str(),
        }
    }
}

impl From<IdentityType> for AttributedType {
    fn from(value: IdentityType) -> Self {
        Self::Identity(value)
    }
}

impl From<Relationship> for AttributedType {
    fn from(value: Relationship) -> Self {
        Self::Relationship(value)
    }
}
