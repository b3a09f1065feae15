//! Relationship domain model.
//!
//! A relationship is an N-ary association between identities. Its shape is
//! declared once per [`RelationshipKind`] as a table of [`MemberSlot`]s, each
//! named by a descriptor and restricted to an identity class.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attribute::{AttributeValue, Attributes};
use crate::error::{ModelError, ModelResult};
use crate::identity::{IdentityClass, IdentityType};

/// Member slot descriptors.
pub mod descriptor {
    /// Identity receiving a role.
    pub const ASSIGNEE: &str = "assignee";
    /// Role being granted.
    pub const ROLE: &str = "role";
    /// Agent belonging to a group.
    pub const MEMBER: &str = "member";
    /// Group being joined.
    pub const GROUP: &str = "group";
}

/// One typed member slot of a relationship kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberSlot {
    /// Stable slot name.
    pub descriptor: &'static str,
    /// Identity class the slot accepts.
    pub accepts: IdentityClass,
}

const GRANT_SLOTS: &[MemberSlot] = &[
    MemberSlot {
        descriptor: descriptor::ASSIGNEE,
        accepts: IdentityClass::Any,
    },
    MemberSlot {
        descriptor: descriptor::ROLE,
        accepts: IdentityClass::Role,
    },
];

const GROUP_MEMBERSHIP_SLOTS: &[MemberSlot] = &[
    MemberSlot {
        descriptor: descriptor::MEMBER,
        accepts: IdentityClass::Agent,
    },
    MemberSlot {
        descriptor: descriptor::GROUP,
        accepts: IdentityClass::Group,
    },
];

const GROUP_ROLE_SLOTS: &[MemberSlot] = &[
    MemberSlot {
        descriptor: descriptor::MEMBER,
        accepts: IdentityClass::Agent,
    },
    MemberSlot {
        descriptor: descriptor::GROUP,
        accepts: IdentityClass::Group,
    },
    MemberSlot {
        descriptor: descriptor::ROLE,
        accepts: IdentityClass::Role,
    },
];

/// Built-in relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// `{assignee, role}`.
    Grant,
    /// `{member, group}`.
    GroupMembership,
    /// `{member, group, role}`; expands into a Grant and a GroupMembership.
    GroupRole,
}

impl RelationshipKind {
    /// All built-in kinds.
    pub const ALL: [Self; 3] = [Self::Grant, Self::GroupMembership, Self::GroupRole];

    /// Returns the member slots, in declaration order.
    #[must_use]
    pub const fn slots(&self) -> &'static [MemberSlot] {
        match self {
            Self::Grant => GRANT_SLOTS,
            Self::GroupMembership => GROUP_MEMBERSHIP_SLOTS,
            Self::GroupRole => GROUP_ROLE_SLOTS,
        }
    }

    /// Looks up a slot by descriptor.
    #[must_use]
    pub fn slot(&self, descriptor: &str) -> Option<&'static MemberSlot> {
        self.slots().iter().find(|s| s.descriptor == descriptor)
    }

    /// Returns the type name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "Grant",
            Self::GroupMembership => "GroupMembership",
            Self::GroupRole => "GroupRole",
        }
    }

    /// Returns whether the kind has a `group` slot that participates in
    /// hierarchical group matching.
    #[must_use]
    pub const fn is_group_scoped(&self) -> bool {
        matches!(self, Self::GroupMembership | Self::GroupRole)
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An N-ary relationship between identities.
///
/// Members are snapshots: the engine persists only their ids and resolves
/// fresh copies when the relationship is read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Stable identifier, independent of the members.
    pub id: Option<Uuid>,
    /// Relationship type.
    pub kind: RelationshipKind,
    /// Members keyed by descriptor.
    pub members: BTreeMap<String, IdentityType>,
    /// Attribute bag.
    pub attributes: Attributes,
}

impl Relationship {
    /// Creates an empty relationship of `kind`.
    #[must_use]
    pub fn new(kind: RelationshipKind) -> Self {
        Self {
            id: None,
            kind,
            members: BTreeMap::new(),
            attributes: Attributes::new(),
        }
    }

    /// Creates a role grant.
    #[must_use]
    pub fn grant(assignee: &IdentityType, role: &IdentityType) -> Self {
        Self::new(RelationshipKind::Grant)
            .with_member(descriptor::ASSIGNEE, assignee)
            .with_member(descriptor::ROLE, role)
    }

    /// Creates a group membership.
    #[must_use]
    pub fn group_membership(member: &IdentityType, group: &IdentityType) -> Self {
        Self::new(RelationshipKind::GroupMembership)
            .with_member(descriptor::MEMBER, member)
            .with_member(descriptor::GROUP, group)
    }

    /// Creates a group-scoped role.
    #[must_use]
    pub fn group_role(member: &IdentityType, group: &IdentityType, role: &IdentityType) -> Self {
        Self::new(RelationshipKind::GroupRole)
            .with_member(descriptor::MEMBER, member)
            .with_member(descriptor::GROUP, group)
            .with_member(descriptor::ROLE, role)
    }

    /// Sets a member slot to a copy of `identity`.
    #[must_use]
    pub fn with_member(mut self, descriptor: impl Into<String>, identity: &IdentityType) -> Self {
        self.members.insert(descriptor.into(), identity.clone());
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.set(name, value);
        self
    }

    /// Returns the member in a slot.
    #[must_use]
    pub fn member(&self, descriptor: &str) -> Option<&IdentityType> {
        self.members.get(descriptor)
    }

    /// Returns member ids keyed by descriptor.
    ///
    /// ## Errors
    ///
    /// Returns an error if a member has never been stored.
    pub fn member_ids(&self) -> ModelResult<BTreeMap<String, Uuid>> {
        self.members
            .iter()
            .map(|(descriptor, identity)| {
                identity
                    .id
                    .map(|id| (descriptor.clone(), id))
                    .ok_or_else(|| {
                        ModelError::invalid(
                            "Relationship",
                            format!("member '{descriptor}' has not been stored"),
                        )
                    })
            })
            .collect()
    }

    /// Checks that members fill exactly the declared slots with accepted
    /// identity classes.
    ///
    /// ## Errors
    ///
    /// Returns an error for a missing, unknown, or mistyped member.
    pub fn validate(&self) -> ModelResult<()> {
        for slot in self.kind.slots() {
            let Some(member) = self.members.get(slot.descriptor) else {
                return Err(ModelError::invalid(
                    "Relationship",
                    format!("{} requires member '{}'", self.kind, slot.descriptor),
                ));
            };
            if !slot.accepts.covers(member.class()) {
                return Err(ModelError::invalid(
                    "Relationship",
                    format!(
                        "{} member '{}' must be {}, got {}",
                        self.kind,
                        slot.descriptor,
                        slot.accepts.as_str(),
                        member.type_name()
                    ),
                ));
            }
        }
        if let Some(unknown) = self.members.keys().find(|d| self.kind.slot(d).is_none()) {
            return Err(ModelError::invalid(
                "Relationship",
                format!("{} has no member slot '{unknown}'", self.kind),
            ));
        }
        self.attributes.validate()
    }
}
