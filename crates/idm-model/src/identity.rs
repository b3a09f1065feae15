//! Identity domain model.
//!
//! Every identity shares the common [`IdentityType`] fields; the concrete
//! variant lives in [`IdentityKind`]. A User is a specialization of Agent:
//! anything that selects agents also selects users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attribute::{AttributeValue, Attributes};
use crate::error::{ModelError, ModelResult};

/// An identity stored in a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityType {
    // === Identity ===
    /// Unique identifier, assigned by the engine on add.
    pub id: Option<Uuid>,
    /// Owning partition, assigned by the engine on add.
    pub partition_id: Option<Uuid>,

    // === State ===
    /// Whether the identity is enabled.
    pub enabled: bool,
    /// When the identity was created.
    pub created_date: DateTime<Utc>,
    /// When the identity stops being valid.
    pub expiration_date: Option<DateTime<Utc>>,

    // === Custom Attributes ===
    /// Attribute bag.
    pub attributes: Attributes,

    // === Variant ===
    /// Concrete identity data.
    pub kind: IdentityKind,
}

/// Concrete identity variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IdentityKind {
    /// A non-human or generic agent.
    Agent(Agent),
    /// A person.
    User(User),
    /// A node in the group tree.
    Group(Group),
    /// A named role.
    Role(Role),
}

/// Agent data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Login name, unique within the realm.
    pub login_name: String,
}

impl Agent {
    /// Creates an agent.
    #[must_use]
    pub fn new(login_name: impl Into<String>) -> Self {
        Self {
            login_name: login_name.into(),
        }
    }
}

/// User data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Login name, unique within the realm.
    pub login_name: String,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Email address.
    pub email: Option<String>,
}

impl User {
    /// Creates a user.
    #[must_use]
    pub fn new(login_name: impl Into<String>) -> Self {
        Self {
            login_name: login_name.into(),
            first_name: None,
            last_name: None,
            email: None,
        }
    }

    /// Sets the given name.
    #[must_use]
    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    /// Sets the family name.
    #[must_use]
    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Group data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group name, unique within the partition.
    pub name: String,
    /// Slash-separated path from the root group, maintained by the engine.
    pub path: String,
    /// Parent group (None for top-level groups).
    pub parent_id: Option<Uuid>,
}

impl Group {
    /// Creates a top-level group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: format!("/{name}"),
            name,
            parent_id: None,
        }
    }

    /// Creates a group under `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: &IdentityType) -> Self {
        self.parent_id = parent.id;
        if let Some(parent_group) = parent.as_group() {
            self.path = format!("{}/{}", parent_group.path, self.name);
        }
        self
    }

    /// Checks if this is a top-level group.
    #[must_use]
    pub const fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Role data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role name, unique within the partition.
    pub name: String,
}

impl Role {
    /// Creates a role.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Selects one or more identity variants.
///
/// `Agent` selects agents and users; `Any` selects everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityClass {
    /// Every variant.
    Any,
    /// Agents and users.
    Agent,
    /// Users only.
    User,
    /// Groups only.
    Group,
    /// Roles only.
    Role,
}

impl IdentityClass {
    /// Returns whether `kind` belongs to this class.
    #[must_use]
    pub const fn includes(&self, kind: &IdentityKind) -> bool {
        match self {
            Self::Any => true,
            Self::Agent => matches!(kind, IdentityKind::Agent(_) | IdentityKind::User(_)),
            Self::User => matches!(kind, IdentityKind::User(_)),
            Self::Group => matches!(kind, IdentityKind::Group(_)),
            Self::Role => matches!(kind, IdentityKind::Role(_)),
        }
    }

    /// Returns whether every member of `other` belongs to this class.
    #[must_use]
    pub const fn covers(&self, other: Self) -> bool {
        match (self, other) {
            (Self::Any, _) => true,
            (Self::Agent, Self::Agent | Self::User) => true,
            (Self::User, Self::User) | (Self::Group, Self::Group) | (Self::Role, Self::Role) => {
                true
            }
            _ => false,
        }
    }

    /// Returns the class name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "IdentityType",
            Self::Agent => "Agent",
            Self::User => "User",
            Self::Group => "Group",
            Self::Role => "Role",
        }
    }
}

impl IdentityType {
    /// Creates an enabled identity of the given kind.
    #[must_use]
    pub fn new(kind: impl Into<IdentityKind>) -> Self {
        Self {
            id: None,
            partition_id: None,
            enabled: true,
            created_date: Utc::now(),
            expiration_date: None,
            attributes: Attributes::new(),
            kind: kind.into(),
        }
    }

    /// Creates an agent.
    #[must_use]
    pub fn agent(login_name: impl Into<String>) -> Self {
        Self::new(Agent::new(login_name))
    }

    /// Creates a user.
    #[must_use]
    pub fn user(login_name: impl Into<String>) -> Self {
        Self::new(User::new(login_name))
    }

    /// Creates a top-level group.
    #[must_use]
    pub fn group(name: impl Into<String>) -> Self {
        Self::new(Group::new(name))
    }

    /// Creates a role.
    #[must_use]
    pub fn role(name: impl Into<String>) -> Self {
        Self::new(Role::new(name))
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the expiration date.
    #[must_use]
    pub fn with_expiration_date(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration_date = Some(expiration);
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.set(name, value);
        self
    }

    /// Returns the concrete class of this identity.
    #[must_use]
    pub const fn class(&self) -> IdentityClass {
        match self.kind {
            IdentityKind::Agent(_) => IdentityClass::Agent,
            IdentityKind::User(_) => IdentityClass::User,
            IdentityKind::Group(_) => IdentityClass::Group,
            IdentityKind::Role(_) => IdentityClass::Role,
        }
    }

    /// Returns the concrete type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.class().as_str()
    }

    /// Returns the login name for agents and users.
    #[must_use]
    pub fn login_name(&self) -> Option<&str> {
        match &self.kind {
            IdentityKind::Agent(agent) => Some(&agent.login_name),
            IdentityKind::User(user) => Some(&user.login_name),
            _ => None,
        }
    }

    /// Returns the name for groups and roles.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            IdentityKind::Group(group) => Some(&group.name),
            IdentityKind::Role(role) => Some(&role.name),
            _ => None,
        }
    }

    /// Returns the user data, if this is a user.
    #[must_use]
    pub const fn as_user(&self) -> Option<&User> {
        match &self.kind {
            IdentityKind::User(user) => Some(user),
            _ => None,
        }
    }

    /// Returns the group data, if this is a group.
    #[must_use]
    pub const fn as_group(&self) -> Option<&Group> {
        match &self.kind {
            IdentityKind::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Returns mutable group data, if this is a group.
    pub fn as_group_mut(&mut self) -> Option<&mut Group> {
        match &mut self.kind {
            IdentityKind::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Returns whether this identity is an agent or a user.
    #[must_use]
    pub const fn is_agent(&self) -> bool {
        matches!(self.kind, IdentityKind::Agent(_) | IdentityKind::User(_))
    }

    /// Validates required fields before the identity is stored.
    ///
    /// ## Errors
    ///
    /// Returns an error for a blank login name or name, a group name
    /// containing `/`, or an invalid attribute.
    pub fn validate(&self) -> ModelResult<()> {
        let entity = self.type_name();
        match &self.kind {
            IdentityKind::Agent(Agent { login_name }) | IdentityKind::User(User { login_name, .. }) => {
                if login_name.trim().is_empty() {
                    return Err(ModelError::missing(entity, "login_name"));
                }
            }
            IdentityKind::Group(group) => {
                if group.name.trim().is_empty() {
                    return Err(ModelError::missing(entity, "name"));
                }
                if group.name.contains('/') {
                    return Err(ModelError::invalid(entity, "group name cannot contain '/'"));
                }
            }
            IdentityKind::Role(role) => {
                if role.name.trim().is_empty() {
                    return Err(ModelError::missing(entity, "name"));
                }
            }
        }
        self.attributes.validate()
    }
}

impl From<Agent> for IdentityKind {
    fn from(value: Agent) -> Self {
        Self::Agent(value)
    }
}

impl From<User> for IdentityKind {
    fn from(value: User) -> Self {
        Self::User(value)
    }
}

impl From<Group> for IdentityKind {
    fn from(value: Group) -> Self {
        Self::Group(value)
    }
}

impl From<Role> for IdentityKind {
    fn from(value: Role) -> Self {
        Self::Role(value)
    }
}
