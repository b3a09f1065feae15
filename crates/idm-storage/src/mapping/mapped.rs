//! Domain types bound through the mapping layer.
//!
//! A mapped type exposes its properties as a flat [`PropertyMap`] plus its
//! keyed collections, and rebuilds itself from the same parts. The mapping
//! registry decides where each part lives physically.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use idm_model::{
    Agent, AttributeValue, Attributes, CredentialStorage, CredentialType, Group, IdentityKind,
    IdentityType, Partition, PartitionKind, Role, User,
};
use uuid::Uuid;

use super::descriptor::{TypeKey, ID_PROPERTY};
use super::value::FieldValue;
use crate::error::{StorageError, StorageResult};
use crate::stored::StoredRelationship;

/// Property names shared by the standard mappings.
pub mod property {
    /// Owning partition of an identity.
    pub const PARTITION: &str = "partition";
    /// Enabled flag.
    pub const ENABLED: &str = "enabled";
    /// Creation timestamp.
    pub const CREATED_DATE: &str = "created_date";
    /// Expiration timestamp.
    pub const EXPIRATION_DATE: &str = "expiration_date";
    /// Agent and user login name.
    pub const LOGIN_NAME: &str = "login_name";
    /// User given name.
    pub const FIRST_NAME: &str = "first_name";
    /// User family name.
    pub const LAST_NAME: &str = "last_name";
    /// User email.
    pub const EMAIL: &str = "email";
    /// Group, role, and partition name.
    pub const NAME: &str = "name";
    /// Group path.
    pub const PATH: &str = "path";
    /// Parent group id.
    pub const PARENT_GROUP: &str = "parent_group";
    /// Parent tier id.
    pub const PARENT: &str = "parent";
    /// Credential owner.
    pub const OWNER: &str = "owner";
    /// Credential type name.
    pub const CREDENTIAL_TYPE: &str = "credential_type";
    /// Credential effective date.
    pub const EFFECTIVE_DATE: &str = "effective_date";
    /// Credential expiry date.
    pub const EXPIRY_DATE: &str = "expiry_date";
    /// Credential history position.
    pub const REVISION: &str = "revision";
    /// Credential material.
    pub const FIELDS: &str = "fields";
}

/// Flat property values keyed by property name.
pub type PropertyMap = BTreeMap<String, FieldValue>;

/// Everything the registry reads back for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedParts {
    /// Scalar properties, including `id`.
    pub properties: PropertyMap,
    /// Attribute collection.
    pub attributes: Attributes,
    /// Relationship members keyed by descriptor.
    pub members: BTreeMap<String, Uuid>,
}

impl MappedParts {
    fn take(&mut self, name: &str) -> FieldValue {
        self.properties.remove(name).unwrap_or(FieldValue::Null)
    }

    fn mismatch(name: &str, expected: &str, got: &FieldValue) -> StorageError {
        StorageError::mapping(format!("property '{name}' expected {expected}, got {got:?}"))
    }

    /// Takes a required identifier.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if the property is absent or mistyped.
    pub fn id(&mut self, name: &str) -> StorageResult<Uuid> {
        match self.take(name) {
            FieldValue::Id(id) => Ok(id),
            other => Err(Self::mismatch(name, "id", &other)),
        }
    }

    /// Takes an optional identifier.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if the property is mistyped.
    pub fn opt_id(&mut self, name: &str) -> StorageResult<Option<Uuid>> {
        match self.take(name) {
            FieldValue::Null => Ok(None),
            FieldValue::Id(id) => Ok(Some(id)),
            other => Err(Self::mismatch(name, "id", &other)),
        }
    }

    /// Takes required text.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if the property is absent or mistyped.
    pub fn text(&mut self, name: &str) -> StorageResult<String> {
        match self.take(name) {
            FieldValue::Text(text) => Ok(text),
            other => Err(Self::mismatch(name, "text", &other)),
        }
    }

    /// Takes optional text.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if the property is mistyped.
    pub fn opt_text(&mut self, name: &str) -> StorageResult<Option<String>> {
        match self.take(name) {
            FieldValue::Null => Ok(None),
            FieldValue::Text(text) => Ok(Some(text)),
            other => Err(Self::mismatch(name, "text", &other)),
        }
    }

    /// Takes a required boolean.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if the property is absent or mistyped.
    pub fn bool(&mut self, name: &str) -> StorageResult<bool> {
        match self.take(name) {
            FieldValue::Bool(b) => Ok(b),
            other => Err(Self::mismatch(name, "bool", &other)),
        }
    }

    /// Takes a required integer.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if the property is absent or mistyped.
    pub fn integer(&mut self, name: &str) -> StorageResult<i64> {
        match self.take(name) {
            FieldValue::Integer(i) => Ok(i),
            other => Err(Self::mismatch(name, "integer", &other)),
        }
    }

    /// Takes a required timestamp.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if the property is absent or mistyped.
    pub fn timestamp(&mut self, name: &str) -> StorageResult<DateTime<Utc>> {
        match self.take(name) {
            FieldValue::Timestamp(t) => Ok(t),
            other => Err(Self::mismatch(name, "timestamp", &other)),
        }
    }

    /// Takes an optional timestamp.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if the property is mistyped.
    pub fn opt_timestamp(&mut self, name: &str) -> StorageResult<Option<DateTime<Utc>>> {
        match self.take(name) {
            FieldValue::Null => Ok(None),
            FieldValue::Timestamp(t) => Ok(Some(t)),
            other => Err(Self::mismatch(name, "timestamp", &other)),
        }
    }

    /// Takes a required JSON document.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if the property is absent or mistyped.
    pub fn json(&mut self, name: &str) -> StorageResult<serde_json::Value> {
        match self.take(name) {
            FieldValue::Json(value) => Ok(value),
            other => Err(Self::mismatch(name, "json", &other)),
        }
    }
}

/// A domain type the mapping registry can materialize and dematerialize.
pub trait Mapped: Sized {
    /// Every concrete key values of this type may carry.
    fn type_keys() -> &'static [TypeKey];

    /// Concrete key of this value.
    fn type_key(&self) -> TypeKey;

    /// Entity id, if assigned.
    fn entity_id(&self) -> Option<Uuid>;

    /// Scalar properties, excluding `id`.
    ///
    /// ## Errors
    ///
    /// Returns an error if a property cannot be encoded.
    fn properties(&self) -> StorageResult<PropertyMap>;

    /// Attribute collection, for attributed types.
    fn attributes(&self) -> Option<&Attributes> {
        None
    }

    /// Relationship members, for relationships.
    fn members(&self) -> Option<&BTreeMap<String, Uuid>> {
        None
    }

    /// Rebuilds a value from its parts.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if a required part is missing or mistyped.
    fn from_parts(key: TypeKey, parts: MappedParts) -> StorageResult<Self>;
}

fn entries(pairs: impl IntoIterator<Item = (&'static str, FieldValue)>) -> PropertyMap {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

impl Mapped for Partition {
    fn type_keys() -> &'static [TypeKey] {
        &[TypeKey::Realm, TypeKey::Tier]
    }

    fn type_key(&self) -> TypeKey {
        TypeKey::for_partition(self.kind)
    }

    fn entity_id(&self) -> Option<Uuid> {
        self.id
    }

    fn properties(&self) -> StorageResult<PropertyMap> {
        Ok(entries([
            (property::NAME, FieldValue::Text(self.name.clone())),
            (property::PARENT, FieldValue::opt_id(self.parent_id)),
        ]))
    }

    fn from_parts(key: TypeKey, mut parts: MappedParts) -> StorageResult<Self> {
        let kind = match key {
            TypeKey::Realm => PartitionKind::Realm,
            TypeKey::Tier => PartitionKind::Tier,
            other => return Err(StorageError::UnsupportedAttributedType(other.to_string())),
        };
        Ok(Self {
            id: Some(parts.id(ID_PROPERTY)?),
            name: parts.text(property::NAME)?,
            kind,
            parent_id: parts.opt_id(property::PARENT)?,
        })
    }
}

impl Mapped for IdentityType {
    fn type_keys() -> &'static [TypeKey] {
        &[TypeKey::Agent, TypeKey::User, TypeKey::Group, TypeKey::Role]
    }

    fn type_key(&self) -> TypeKey {
        TypeKey::for_identity(&self.kind)
    }

    fn entity_id(&self) -> Option<Uuid> {
        self.id
    }

    fn properties(&self) -> StorageResult<PropertyMap> {
        let partition = self
            .partition_id
            .ok_or_else(|| StorageError::mapping(format!("{} has no partition", self.type_name())))?;
        let mut props = entries([
            (property::PARTITION, FieldValue::Id(partition)),
            (property::ENABLED, FieldValue::Bool(self.enabled)),
            (property::CREATED_DATE, FieldValue::Timestamp(self.created_date)),
            (
                property::EXPIRATION_DATE,
                FieldValue::opt_timestamp(self.expiration_date),
            ),
        ]);
        let specific = match &self.kind {
            IdentityKind::Agent(agent) => entries([(
                property::LOGIN_NAME,
                FieldValue::Text(agent.login_name.clone()),
            )]),
            IdentityKind::User(user) => entries([
                (property::LOGIN_NAME, FieldValue::Text(user.login_name.clone())),
                (property::FIRST_NAME, FieldValue::opt_text(user.first_name.as_deref())),
                (property::LAST_NAME, FieldValue::opt_text(user.last_name.as_deref())),
                (property::EMAIL, FieldValue::opt_text(user.email.as_deref())),
            ]),
            IdentityKind::Group(group) => entries([
                (property::NAME, FieldValue::Text(group.name.clone())),
                (property::PATH, FieldValue::Text(group.path.clone())),
                (property::PARENT_GROUP, FieldValue::opt_id(group.parent_id)),
            ]),
            IdentityKind::Role(role) => {
                entries([(property::NAME, FieldValue::Text(role.name.clone()))])
            }
        };
        props.extend(specific);
        Ok(props)
    }

    fn attributes(&self) -> Option<&Attributes> {
        Some(&self.attributes)
    }

    fn from_parts(key: TypeKey, mut parts: MappedParts) -> StorageResult<Self> {
        let kind = match key {
            TypeKey::Agent => IdentityKind::Agent(Agent {
                login_name: parts.text(property::LOGIN_NAME)?,
            }),
            TypeKey::User => IdentityKind::User(User {
                login_name: parts.text(property::LOGIN_NAME)?,
                first_name: parts.opt_text(property::FIRST_NAME)?,
                last_name: parts.opt_text(property::LAST_NAME)?,
                email: parts.opt_text(property::EMAIL)?,
            }),
            TypeKey::Group => IdentityKind::Group(Group {
                name: parts.text(property::NAME)?,
                path: parts.text(property::PATH)?,
                parent_id: parts.opt_id(property::PARENT_GROUP)?,
            }),
            TypeKey::Role => IdentityKind::Role(Role {
                name: parts.text(property::NAME)?,
            }),
            other => return Err(StorageError::UnsupportedIdentityType(other.to_string())),
        };
        Ok(Self {
            id: Some(parts.id(ID_PROPERTY)?),
            partition_id: Some(parts.id(property::PARTITION)?),
            enabled: parts.bool(property::ENABLED)?,
            created_date: parts.timestamp(property::CREATED_DATE)?,
            expiration_date: parts.opt_timestamp(property::EXPIRATION_DATE)?,
            attributes: parts.attributes,
            kind,
        })
    }
}

impl Mapped for StoredRelationship {
    fn type_keys() -> &'static [TypeKey] {
        &[TypeKey::Grant, TypeKey::GroupMembership, TypeKey::GroupRole]
    }

    fn type_key(&self) -> TypeKey {
        TypeKey::for_relationship(self.kind)
    }

    fn entity_id(&self) -> Option<Uuid> {
        Some(self.id)
    }

    fn properties(&self) -> StorageResult<PropertyMap> {
        Ok(PropertyMap::new())
    }

    fn attributes(&self) -> Option<&Attributes> {
        Some(&self.attributes)
    }

    fn members(&self) -> Option<&BTreeMap<String, Uuid>> {
        Some(&self.members)
    }

    fn from_parts(key: TypeKey, mut parts: MappedParts) -> StorageResult<Self> {
        let kind = match key {
            TypeKey::Grant => idm_model::RelationshipKind::Grant,
            TypeKey::GroupMembership => idm_model::RelationshipKind::GroupMembership,
            TypeKey::GroupRole => idm_model::RelationshipKind::GroupRole,
            other => return Err(StorageError::UnsupportedAttributedType(other.to_string())),
        };
        Ok(Self {
            id: parts.id(ID_PROPERTY)?,
            kind,
            members: parts.members,
            attributes: parts.attributes,
        })
    }
}

impl Mapped for CredentialStorage {
    fn type_keys() -> &'static [TypeKey] {
        &[TypeKey::Credential]
    }

    fn type_key(&self) -> TypeKey {
        TypeKey::Credential
    }

    fn entity_id(&self) -> Option<Uuid> {
        Some(self.id)
    }

    fn properties(&self) -> StorageResult<PropertyMap> {
        let owner = self
            .owner_agent_id
            .ok_or_else(|| StorageError::mapping("credential record has no owner"))?;
        Ok(entries([
            (property::OWNER, FieldValue::Id(owner)),
            (
                property::CREDENTIAL_TYPE,
                FieldValue::Text(self.credential_type.as_str().to_string()),
            ),
            (
                property::EFFECTIVE_DATE,
                FieldValue::opt_timestamp(self.effective_date),
            ),
            (property::EXPIRY_DATE, FieldValue::opt_timestamp(self.expiry_date)),
            (property::REVISION, FieldValue::Integer(self.revision)),
            (property::FIELDS, FieldValue::Json(serde_json::to_value(&self.fields)?)),
        ]))
    }

    fn from_parts(_key: TypeKey, mut parts: MappedParts) -> StorageResult<Self> {
        let fields: BTreeMap<String, AttributeValue> =
            serde_json::from_value(parts.json(property::FIELDS)?)?;
        Ok(Self {
            id: parts.id(ID_PROPERTY)?,
            owner_agent_id: Some(parts.id(property::OWNER)?),
            credential_type: CredentialType::from_name(&parts.text(property::CREDENTIAL_TYPE)?),
            effective_date: parts.opt_timestamp(property::EFFECTIVE_DATE)?,
            expiry_date: parts.opt_timestamp(property::EXPIRY_DATE)?,
            revision: parts.integer(property::REVISION)?,
            fields,
        })
    }
}
