//! Declarative mapping tables.
//!
//! A [`TypeMapping`] lists, for one concrete domain type, the physical units
//! it is spread over (root first), how each property binds to a column, which
//! root column carries the type discriminator, and which units hold the
//! type's attributes, relationship members, and credentials.

use std::fmt;

use idm_model::{IdentityKind, PartitionKind, RelationshipKind};
use serde::{Deserialize, Serialize};

use super::value::FieldKind;

/// Concrete mapped domain types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeKey {
    /// Realm partition.
    Realm,
    /// Tier partition.
    Tier,
    /// Agent identity.
    Agent,
    /// User identity.
    User,
    /// Group identity.
    Group,
    /// Role identity.
    Role,
    /// Grant relationship.
    Grant,
    /// Group membership relationship.
    GroupMembership,
    /// Group role relationship.
    GroupRole,
    /// Credential history record.
    Credential,
}

impl TypeKey {
    /// Returns the value written to the discriminator column.
    #[must_use]
    pub const fn discriminator(&self) -> &'static str {
        match self {
            Self::Realm => "realm",
            Self::Tier => "tier",
            Self::Agent => "agent",
            Self::User => "user",
            Self::Group => "group",
            Self::Role => "role",
            Self::Grant => "grant",
            Self::GroupMembership => "group_membership",
            Self::GroupRole => "group_role",
            Self::Credential => "credential",
        }
    }

    /// Returns whether this key names an identity type.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        matches!(self, Self::Agent | Self::User | Self::Group | Self::Role)
    }

    /// Returns the key of an identity variant.
    #[must_use]
    pub const fn for_identity(kind: &IdentityKind) -> Self {
        match kind {
            IdentityKind::Agent(_) => Self::Agent,
            IdentityKind::User(_) => Self::User,
            IdentityKind::Group(_) => Self::Group,
            IdentityKind::Role(_) => Self::Role,
        }
    }

    /// Returns the key of a relationship kind.
    #[must_use]
    pub const fn for_relationship(kind: RelationshipKind) -> Self {
        match kind {
            RelationshipKind::Grant => Self::Grant,
            RelationshipKind::GroupMembership => Self::GroupMembership,
            RelationshipKind::GroupRole => Self::GroupRole,
        }
    }

    /// Returns the key of a partition kind.
    #[must_use]
    pub const fn for_partition(kind: PartitionKind) -> Self {
        match kind {
            PartitionKind::Realm => Self::Realm,
            PartitionKind::Tier => Self::Tier,
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// What a field contributes to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// The entity id on the root unit.
    Identifier,
    /// The entity id on a child unit, linking it to the root row.
    OwnerReference,
    /// An ordinary property.
    Property,
}

/// Binding of one property to one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Domain property name.
    pub property: String,
    /// Physical column name.
    pub column: String,
    /// Storage type.
    pub kind: FieldKind,
    /// Role of the field.
    pub role: FieldRole,
    /// Whether the column admits null.
    pub nullable: bool,
}

/// Property name bound by identifier and owner reference fields.
pub const ID_PROPERTY: &str = "id";

/// Mapping of a type's properties onto one physical unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMapping {
    /// Physical unit name.
    pub unit: String,
    /// Column bindings.
    pub fields: Vec<FieldDescriptor>,
    /// Column carrying the type discriminator (root units only).
    pub discriminator: Option<String>,
}

impl EntityMapping {
    /// Starts a root unit keyed by `id_column`.
    #[must_use]
    pub fn root(unit: impl Into<String>, id_column: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            fields: vec![FieldDescriptor {
                property: ID_PROPERTY.to_string(),
                column: id_column.into(),
                kind: FieldKind::Id,
                role: FieldRole::Identifier,
                nullable: false,
            }],
            discriminator: None,
        }
    }

    /// Starts a child unit linked to the root row through `owner_column`.
    #[must_use]
    pub fn child(unit: impl Into<String>, owner_column: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            fields: vec![FieldDescriptor {
                property: ID_PROPERTY.to_string(),
                column: owner_column.into(),
                kind: FieldKind::Id,
                role: FieldRole::OwnerReference,
                nullable: false,
            }],
            discriminator: None,
        }
    }

    /// Binds a required property to a column of the same name.
    #[must_use]
    pub fn property(self, name: &str, kind: FieldKind) -> Self {
        self.bind(name, name, kind, false)
    }

    /// Binds a nullable property to a column of the same name.
    #[must_use]
    pub fn optional(self, name: &str, kind: FieldKind) -> Self {
        self.bind(name, name, kind, true)
    }

    /// Binds a property to a differently named column.
    #[must_use]
    pub fn bind(mut self, property: &str, column: &str, kind: FieldKind, nullable: bool) -> Self {
        self.fields.push(FieldDescriptor {
            property: property.to_string(),
            column: column.to_string(),
            kind,
            role: FieldRole::Property,
            nullable,
        });
        self
    }

    /// Sets the discriminator column.
    #[must_use]
    pub fn discriminator(mut self, column: impl Into<String>) -> Self {
        self.discriminator = Some(column.into());
        self
    }

    /// Returns the identifier or owner reference field.
    #[must_use]
    pub fn key_field(&self) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| matches!(f.role, FieldRole::Identifier | FieldRole::OwnerReference))
    }

    /// Returns the column linking rows of this unit to the entity id.
    #[must_use]
    pub fn key_column(&self) -> &str {
        self.key_field().map_or(ID_PROPERTY, |f| f.column.as_str())
    }

    /// Returns whether this unit is keyed by the entity's own identifier.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.fields.iter().any(|f| f.role == FieldRole::Identifier)
    }

    /// Looks up the field bound to `property`.
    #[must_use]
    pub fn field(&self, property: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.property == property)
    }
}

/// Mapping of a keyed collection (attributes, members) onto a unit with one
/// row per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionMapping {
    /// Physical unit name.
    pub unit: String,
    /// Column holding the owning entity id.
    pub owner_column: String,
    /// Column holding the entry key.
    pub key_column: String,
    /// Column holding the entry value.
    pub value_column: String,
    /// Storage type of the value column.
    pub value_kind: FieldKind,
}

impl CollectionMapping {
    /// Creates a collection mapping.
    #[must_use]
    pub fn new(
        unit: impl Into<String>,
        owner_column: impl Into<String>,
        key_column: impl Into<String>,
        value_column: impl Into<String>,
        value_kind: FieldKind,
    ) -> Self {
        Self {
            unit: unit.into(),
            owner_column: owner_column.into(),
            key_column: key_column.into(),
            value_column: value_column.into(),
            value_kind,
        }
    }
}

/// Full mapping of one concrete domain type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    /// Mapped type.
    pub key: TypeKey,
    units: Vec<EntityMapping>,
    /// Unit holding the type's attributes.
    pub attributes: Option<CollectionMapping>,
    /// Unit holding relationship members.
    pub members: Option<CollectionMapping>,
    /// Root unit of credential records owned by this type.
    pub credentials: Option<String>,
}

impl TypeMapping {
    /// Creates a mapping with its root unit.
    #[must_use]
    pub fn new(key: TypeKey, root: EntityMapping) -> Self {
        Self {
            key,
            units: vec![root],
            attributes: None,
            members: None,
            credentials: None,
        }
    }

    /// Adds a child unit.
    #[must_use]
    pub fn with_unit(mut self, unit: EntityMapping) -> Self {
        self.units.push(unit);
        self
    }

    /// Sets the attribute collection.
    #[must_use]
    pub fn with_attributes(mut self, attributes: CollectionMapping) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Sets the member collection.
    #[must_use]
    pub fn with_members(mut self, members: CollectionMapping) -> Self {
        self.members = Some(members);
        self
    }

    /// Sets the credential root unit.
    #[must_use]
    pub fn with_credentials(mut self, unit: impl Into<String>) -> Self {
        self.credentials = Some(unit.into());
        self
    }

    /// Returns the participating units, root first.
    #[must_use]
    pub fn mappings(&self) -> &[EntityMapping] {
        &self.units
    }

    /// Returns the root unit mapping.
    #[must_use]
    pub fn root(&self) -> &EntityMapping {
        &self.units[0]
    }

    /// Returns the collection mappings in a fixed order.
    pub fn collections(&self) -> impl Iterator<Item = &CollectionMapping> {
        self.attributes.iter().chain(self.members.iter())
    }

    /// Returns every unit name this type writes to, root first.
    #[must_use]
    pub fn unit_names(&self) -> Vec<&str> {
        self.units
            .iter()
            .map(|u| u.unit.as_str())
            .chain(self.collections().map(|c| c.unit.as_str()))
            .collect()
    }
}
