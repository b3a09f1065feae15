//! Identity query parameters and values.

use std::fmt;

use chrono::{DateTime, Utc};
use idm_model::{IdentityClass, IdentityType, Partition, Scalar};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A predicate an identity query can filter on.
///
/// Names are the stable upper-case vocabulary (`ID`, `HAS_ROLE`, ...);
/// any other name filters on the attribute of that name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdentityParameter {
    /// Identity id.
    Id,
    /// Owning partition id.
    Partition,
    /// Enabled flag.
    Enabled,
    /// Exact creation timestamp.
    CreatedDate,
    /// Created at or before.
    CreatedBefore,
    /// Created at or after.
    CreatedAfter,
    /// Exact expiration timestamp.
    ExpiryDate,
    /// Expires at or before.
    ExpiryBefore,
    /// Expires at or after.
    ExpiryAfter,
    /// Agent and user login name.
    LoginName,
    /// User given name.
    FirstName,
    /// User family name.
    LastName,
    /// User email.
    Email,
    /// Group or role name.
    Name,
    /// Group path.
    Path,
    /// Parent group.
    Parent,
    /// Granted a role.
    HasRole,
    /// Member of a group.
    MemberOf,
    /// Holds a role within a group.
    HasGroupRole,
    /// Role granted to an assignee.
    RoleOf,
    /// Group containing a member.
    HasMember,
    /// Generic attribute, by name.
    Attribute(String),
}

/// Evaluation stage of a parameter; cheaper stages run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Identifier check.
    Identifier,
    /// Partition check.
    Partition,
    /// Enabled flag.
    Enabled,
    /// Creation and expiry dates.
    Dates,
    /// Type-specific fields.
    Fields,
    /// Relationship-derived predicates.
    Relationships,
    /// Generic attributes.
    Attributes,
}

const NAMED: &[IdentityParameter] = &[
    IdentityParameter::Id,
    IdentityParameter::Partition,
    IdentityParameter::Enabled,
    IdentityParameter::CreatedDate,
    IdentityParameter::CreatedBefore,
    IdentityParameter::CreatedAfter,
    IdentityParameter::ExpiryDate,
    IdentityParameter::ExpiryBefore,
    IdentityParameter::ExpiryAfter,
    IdentityParameter::LoginName,
    IdentityParameter::FirstName,
    IdentityParameter::LastName,
    IdentityParameter::Email,
    IdentityParameter::Name,
    IdentityParameter::Path,
    IdentityParameter::Parent,
    IdentityParameter::HasRole,
    IdentityParameter::MemberOf,
    IdentityParameter::HasGroupRole,
    IdentityParameter::RoleOf,
    IdentityParameter::HasMember,
];

impl IdentityParameter {
    /// Creates an attribute parameter.
    #[must_use]
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute(name.into())
    }

    /// Returns the parameter's vocabulary name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Id => "ID",
            Self::Partition => "PARTITION",
            Self::Enabled => "ENABLED",
            Self::CreatedDate => "CREATED_DATE",
            Self::CreatedBefore => "CREATED_BEFORE",
            Self::CreatedAfter => "CREATED_AFTER",
            Self::ExpiryDate => "EXPIRY_DATE",
            Self::ExpiryBefore => "EXPIRY_BEFORE",
            Self::ExpiryAfter => "EXPIRY_AFTER",
            Self::LoginName => "LOGIN_NAME",
            Self::FirstName => "FIRST_NAME",
            Self::LastName => "LAST_NAME",
            Self::Email => "EMAIL",
            Self::Name => "NAME",
            Self::Path => "PATH",
            Self::Parent => "PARENT",
            Self::HasRole => "HAS_ROLE",
            Self::MemberOf => "MEMBER_OF",
            Self::HasGroupRole => "HAS_GROUP_ROLE",
            Self::RoleOf => "ROLE_OF",
            Self::HasMember => "HAS_MEMBER",
            Self::Attribute(name) => name,
        }
    }

    /// Parses a vocabulary name; unknown names become attribute parameters.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        NAMED
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .unwrap_or_else(|| Self::Attribute(name.to_string()))
    }

    /// Returns the evaluation stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Id => Stage::Identifier,
            Self::Partition => Stage::Partition,
            Self::Enabled => Stage::Enabled,
            Self::CreatedDate
            | Self::CreatedBefore
            | Self::CreatedAfter
            | Self::ExpiryDate
            | Self::ExpiryBefore
            | Self::ExpiryAfter => Stage::Dates,
            Self::LoginName
            | Self::FirstName
            | Self::LastName
            | Self::Email
            | Self::Name
            | Self::Path
            | Self::Parent => Stage::Fields,
            Self::HasRole | Self::MemberOf | Self::HasGroupRole | Self::RoleOf | Self::HasMember => {
                Stage::Relationships
            }
            Self::Attribute(_) => Stage::Attributes,
        }
    }

    /// Returns whether the parameter can filter identities of `class`.
    ///
    /// Queries over [`IdentityClass::Any`] accept every parameter; candidates
    /// lacking the field simply do not match.
    #[must_use]
    pub const fn applies_to(&self, class: IdentityClass) -> bool {
        use IdentityClass as C;
        match self {
            Self::Id
            | Self::Partition
            | Self::Enabled
            | Self::CreatedDate
            | Self::CreatedBefore
            | Self::CreatedAfter
            | Self::ExpiryDate
            | Self::ExpiryBefore
            | Self::ExpiryAfter
            | Self::HasRole
            | Self::Attribute(_) => true,
            Self::LoginName | Self::MemberOf | Self::HasGroupRole => {
                matches!(class, C::Any | C::Agent | C::User)
            }
            Self::FirstName | Self::LastName | Self::Email => matches!(class, C::Any | C::User),
            Self::Name => matches!(class, C::Any | C::Group | C::Role),
            Self::Path | Self::Parent | Self::HasMember => matches!(class, C::Any | C::Group),
            Self::RoleOf => matches!(class, C::Any | C::Role),
        }
    }

    /// Returns whether results can be ordered by this parameter.
    #[must_use]
    pub const fn is_sortable(&self) -> bool {
        matches!(
            self,
            Self::Id
                | Self::Enabled
                | Self::CreatedDate
                | Self::ExpiryDate
                | Self::LoginName
                | Self::FirstName
                | Self::LastName
                | Self::Email
                | Self::Name
                | Self::Path
        )
    }

    /// Returns whether `value` has a type this parameter compares against.
    #[must_use]
    pub const fn accepts(&self, value: &QueryValue) -> bool {
        use QueryValue as V;
        match self {
            Self::Id | Self::Partition => matches!(value, V::Id(_)),
            Self::Enabled => matches!(value, V::Bool(_)),
            Self::CreatedDate
            | Self::CreatedBefore
            | Self::CreatedAfter
            | Self::ExpiryDate
            | Self::ExpiryBefore
            | Self::ExpiryAfter => matches!(value, V::Timestamp(_)),
            Self::LoginName
            | Self::FirstName
            | Self::LastName
            | Self::Email
            | Self::Name
            | Self::Path => matches!(value, V::Text(_)),
            Self::Parent | Self::HasRole | Self::MemberOf | Self::RoleOf | Self::HasMember => {
                matches!(value, V::Id(_) | V::Text(_))
            }
            Self::HasGroupRole => matches!(value, V::GroupRole { .. }),
            Self::Attribute(_) => matches!(
                value,
                V::Bool(_) | V::Integer(_) | V::Text(_) | V::Timestamp(_)
            ),
        }
    }
}

impl fmt::Display for IdentityParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reference to a stored identity, by id or by name.
///
/// Names are login names for agents, names or paths for groups, and names
/// for roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityRef {
    /// Identity id.
    Id(Uuid),
    /// Login name, group path, or role/group name.
    Name(String),
}

impl From<Uuid> for IdentityRef {
    fn from(id: Uuid) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for IdentityRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<&IdentityType> for IdentityRef {
    fn from(identity: &IdentityType) -> Self {
        match identity.id {
            Some(id) => Self::Id(id),
            None => Self::Name(
                identity
                    .as_group()
                    .map(|g| g.path.clone())
                    .or_else(|| identity.login_name().or_else(|| identity.name()).map(str::to_string))
                    .unwrap_or_default(),
            ),
        }
    }
}

impl fmt::Display for IdentityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// A value a query parameter is compared against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryValue {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// Text.
    Text(String),
    /// Timestamp.
    Timestamp(DateTime<Utc>),
    /// Identifier.
    Id(Uuid),
    /// Group-scoped role.
    GroupRole {
        /// Group holding the role.
        group: IdentityRef,
        /// Role held.
        role: IdentityRef,
    },
}

impl QueryValue {
    /// Creates a group-role value.
    #[must_use]
    pub fn group_role(group: impl Into<IdentityRef>, role: impl Into<IdentityRef>) -> Self {
        Self::GroupRole {
            group: group.into(),
            role: role.into(),
        }
    }

    /// Converts a scalar value to an attribute scalar.
    #[must_use]
    pub fn to_scalar(&self) -> Option<Scalar> {
        match self {
            Self::Bool(b) => Some(Scalar::Boolean(*b)),
            Self::Integer(i) => Some(Scalar::Integer(*i)),
            Self::Text(text) => Some(Scalar::Text(text.clone())),
            Self::Timestamp(t) => Some(Scalar::Timestamp(*t)),
            Self::Id(id) => Some(Scalar::Text(id.to_string())),
            Self::GroupRole { .. } => None,
        }
    }

    /// Returns the identity reference carried by an id or text value.
    #[must_use]
    pub fn as_identity_ref(&self) -> Option<IdentityRef> {
        match self {
            Self::Id(id) => Some(IdentityRef::Id(*id)),
            Self::Text(name) => Some(IdentityRef::Name(name.clone())),
            _ => None,
        }
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for QueryValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Uuid> for QueryValue {
    fn from(value: Uuid) -> Self {
        Self::Id(value)
    }
}

impl From<&IdentityType> for QueryValue {
    fn from(identity: &IdentityType) -> Self {
        match IdentityRef::from(identity) {
            IdentityRef::Id(id) => Self::Id(id),
            IdentityRef::Name(name) => Self::Text(name),
        }
    }
}

impl From<&Partition> for QueryValue {
    fn from(partition: &Partition) -> Self {
        partition
            .id
            .map_or_else(|| Self::Text(partition.name.clone()), Self::Id)
    }
}

impl From<Scalar> for QueryValue {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Text(text) => Self::Text(text),
            Scalar::Integer(i) => Self::Integer(i),
            Scalar::Boolean(b) => Self::Bool(b),
            Scalar::Timestamp(t) => Self::Timestamp(t),
        }
    }
}
