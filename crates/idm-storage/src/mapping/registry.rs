//! Mapping registry.
//!
//! The registry is built once, validated, and shared by the engine and the
//! backends. It is the only place that knows how a domain value is spread
//! across physical units.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use idm_model::AttributeValue;

use super::descriptor::{
    CollectionMapping, EntityMapping, FieldRole, TypeKey, TypeMapping, ID_PROPERTY,
};
use super::mapped::{property, Mapped, MappedParts};
use super::record::{EntityRecord, PhysicalRecord};
use super::value::{FieldKind, FieldValue};
use crate::backend::Region;
use crate::error::{StorageError, StorageResult};

/// Unit and column names of the standard schema.
pub mod standard {
    /// Partition root unit.
    pub const PARTITION: &str = "partition";
    /// Identity root unit.
    pub const IDENTITY_TYPE: &str = "identity_type";
    /// Agent and user login unit.
    pub const AGENT: &str = "agent";
    /// User profile unit.
    pub const USER_PROFILE: &str = "user_profile";
    /// Group unit.
    pub const IDENTITY_GROUP: &str = "identity_group";
    /// Role unit.
    pub const IDENTITY_ROLE: &str = "identity_role";
    /// Identity attribute unit.
    pub const IDENTITY_ATTRIBUTE: &str = "identity_attribute";
    /// Relationship root unit.
    pub const RELATIONSHIP: &str = "relationship";
    /// Relationship attribute unit.
    pub const RELATIONSHIP_ATTRIBUTE: &str = "relationship_attribute";
    /// Relationship member unit.
    pub const RELATIONSHIP_MEMBER: &str = "relationship_member";
    /// Credential root unit.
    pub const CREDENTIAL: &str = "credential";
    /// Discriminator column on root units.
    pub const TYPE_NAME: &str = "type_name";
}

/// A physical column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Storage type.
    pub kind: FieldKind,
}

/// Every column any mapping writes to one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSchema {
    /// Unit name.
    pub name: String,
    /// Whether the unit is a root unit.
    pub root: bool,
    /// Column rows are keyed or linked by.
    pub key_column: String,
    /// Columns in first-declared order.
    pub columns: Vec<ColumnSchema>,
}

/// Validated set of type mappings.
#[derive(Debug, Clone)]
pub struct MappingRegistry {
    types: HashMap<TypeKey, TypeMapping>,
}

/// Builder for [`MappingRegistry`].
#[derive(Debug, Default)]
pub struct MappingRegistryBuilder {
    types: Vec<TypeMapping>,
}

impl MappingRegistryBuilder {
    /// Adds or replaces the mapping for a type.
    #[must_use]
    pub fn map(mut self, mapping: TypeMapping) -> Self {
        self.types.retain(|m| m.key != mapping.key);
        self.types.push(mapping);
        self
    }

    /// Adds every standard mapping not yet mapped.
    #[must_use]
    pub fn with_standard(mut self) -> Self {
        for mapping in standard_mappings() {
            if !self.types.iter().any(|m| m.key == mapping.key) {
                self.types.push(mapping);
            }
        }
        self
    }

    /// Validates and builds the registry.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Mapping` describing the first inconsistency.
    pub fn build(self) -> StorageResult<MappingRegistry> {
        for mapping in &self.types {
            validate_type(mapping)?;
        }
        let registry = MappingRegistry {
            types: self.types.into_iter().map(|m| (m.key, m)).collect(),
        };
        registry.validate_shared_units()?;
        let units = registry.unit_schemas()?.len();
        tracing::debug!(types = registry.types.len(), units, "mapping registry built");
        Ok(registry)
    }
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl MappingRegistry {
    /// Starts an empty builder.
    #[must_use]
    pub fn builder() -> MappingRegistryBuilder {
        MappingRegistryBuilder::default()
    }

    /// Returns the registry for the standard schema.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            types: standard_mappings().into_iter().map(|m| (m.key, m)).collect(),
        }
    }

    /// Resolves the mapping of a concrete type; its units are ordered root
    /// first.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedIdentityType` or `UnsupportedAttributedType` if
    /// the type is not mapped.
    pub fn resolve_mapper(&self, key: TypeKey) -> StorageResult<&TypeMapping> {
        self.types.get(&key).ok_or_else(|| {
            if key.is_identity() {
                StorageError::UnsupportedIdentityType(key.to_string())
            } else {
                StorageError::UnsupportedAttributedType(key.to_string())
            }
        })
    }

    /// Returns whether a type is mapped.
    #[must_use]
    pub fn supports(&self, key: TypeKey) -> bool {
        self.types.contains_key(&key)
    }

    /// Returns the mappings of every type stored in `region`.
    #[must_use]
    pub fn mappings_for(&self, region: Region) -> Vec<&TypeMapping> {
        region
            .type_keys()
            .iter()
            .filter_map(|key| self.types.get(key))
            .collect()
    }

    /// Determines which of `candidates` a record holds.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if no candidate matches the root row.
    pub fn type_of(&self, record: &EntityRecord, candidates: &[TypeKey]) -> StorageResult<TypeKey> {
        let root = record
            .root()
            .ok_or_else(|| StorageError::mapping(format!("record {} has no rows", record.id)))?;
        let mut undiscriminated = None;
        for key in candidates {
            let Some(mapping) = self.types.get(key) else {
                continue;
            };
            if mapping.root().unit != root.unit {
                continue;
            }
            match &mapping.root().discriminator {
                Some(column) => {
                    if root.get(column).and_then(FieldValue::as_text) == Some(key.discriminator()) {
                        return Ok(*key);
                    }
                }
                None => undiscriminated = Some(*key),
            }
        }
        undiscriminated.ok_or_else(|| {
            StorageError::mapping(format!(
                "record {} in unit '{}' matches none of {candidates:?}",
                record.id, root.unit
            ))
        })
    }

    /// Rebuilds a domain value from its physical rows.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if a row or column is missing or mistyped.
    pub fn materialize<T: Mapped>(&self, record: &EntityRecord) -> StorageResult<T> {
        let key = self.type_of(record, T::type_keys())?;
        let mapping = self.resolve_mapper(key)?;
        let mut parts = MappedParts::default();

        for unit in mapping.mappings() {
            let row = match record.unit(&unit.unit) {
                Some(row) => Some(row),
                None if unit.fields.iter().all(|f| f.nullable || f.role != FieldRole::Property) => None,
                None => {
                    return Err(StorageError::mapping(format!(
                        "{key} record {} lacks a '{}' row",
                        record.id, unit.unit
                    )))
                }
            };
            for field in &unit.fields {
                let value = row
                    .and_then(|r| r.get(&field.column))
                    .cloned()
                    .unwrap_or(FieldValue::Null);
                match field.role {
                    FieldRole::OwnerReference => {
                        if row.is_some() && value.as_id() != Some(record.id) {
                            return Err(StorageError::mapping(format!(
                                "'{}' row of {} is linked to {value:?}",
                                unit.unit, record.id
                            )));
                        }
                    }
                    FieldRole::Identifier | FieldRole::Property => {
                        if !value.fits(field.kind, field.nullable) {
                            return Err(StorageError::mapping(format!(
                                "column '{}.{}' expected {:?}, got {value:?}",
                                unit.unit, field.column, field.kind
                            )));
                        }
                        parts.properties.insert(field.property.clone(), value);
                    }
                }
            }
        }

        if let Some(attributes) = &mapping.attributes {
            for row in record.rows(&attributes.unit) {
                let (name, value) = collection_entry(row, attributes)?;
                let FieldValue::Json(json) = value else {
                    return Err(StorageError::mapping(format!(
                        "attribute '{name}' of {} is not a JSON value",
                        record.id
                    )));
                };
                let value: AttributeValue = serde_json::from_value(json.clone())?;
                parts.attributes.set(name, value);
            }
        }

        if let Some(members) = &mapping.members {
            for row in record.rows(&members.unit) {
                let (descriptor, value) = collection_entry(row, members)?;
                let member = value.as_id().ok_or_else(|| {
                    StorageError::mapping(format!("member '{descriptor}' of {} has no id", record.id))
                })?;
                parts.members.insert(descriptor.to_string(), member);
            }
        }

        T::from_parts(key, parts)
    }

    /// Spreads a domain value over its physical rows, root row first.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if the value has no id, a property has no
    /// column, or a value does not fit its column.
    pub fn dematerialize<T: Mapped>(&self, value: &T) -> StorageResult<EntityRecord> {
        let key = value.type_key();
        let mapping = self.resolve_mapper(key)?;
        let id = value
            .entity_id()
            .ok_or_else(|| StorageError::mapping(format!("{key} value has no id")))?;
        let properties = value.properties()?;

        let mut consumed = BTreeSet::new();
        let mut records = Vec::with_capacity(mapping.mappings().len());
        for unit in mapping.mappings() {
            let mut row = PhysicalRecord::new(unit.unit.clone());
            if let Some(column) = &unit.discriminator {
                row.set(column.clone(), FieldValue::Text(key.discriminator().to_string()));
            }
            for field in &unit.fields {
                let field_value = match field.role {
                    FieldRole::Identifier | FieldRole::OwnerReference => FieldValue::Id(id),
                    FieldRole::Property => {
                        consumed.insert(field.property.as_str());
                        properties.get(&field.property).cloned().unwrap_or(FieldValue::Null)
                    }
                };
                if !field_value.fits(field.kind, field.nullable) {
                    return Err(StorageError::mapping(format!(
                        "{key} property '{}' does not fit column '{}.{}'",
                        field.property, unit.unit, field.column
                    )));
                }
                row.set(field.column.clone(), field_value);
            }
            records.push(row);
        }

        if let Some((name, _)) = properties
            .iter()
            .find(|(name, v)| !v.is_null() && !consumed.contains(name.as_str()))
        {
            return Err(StorageError::mapping(format!(
                "{key} property '{name}' has no column"
            )));
        }

        if let Some(attributes) = value.attributes() {
            match &mapping.attributes {
                Some(collection) => {
                    for (name, attribute) in attributes.iter() {
                        records.push(collection_row(
                            collection,
                            id,
                            name,
                            FieldValue::Json(serde_json::to_value(attribute)?),
                        ));
                    }
                }
                None if attributes.is_empty() => {}
                None => {
                    return Err(StorageError::UnsupportedAttributedType(format!(
                        "{key} has no attribute storage"
                    )))
                }
            }
        }

        if let Some(members) = value.members() {
            let collection = mapping.members.as_ref().ok_or_else(|| {
                StorageError::UnsupportedAttributedType(format!("{key} has no member storage"))
            })?;
            for (descriptor, member) in members {
                records.push(collection_row(collection, id, descriptor, FieldValue::Id(*member)));
            }
        }

        Ok(EntityRecord::new(id, records))
    }

    /// Collects the physical schema of every unit, merging units shared by
    /// several types.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if two types disagree on a column's type or
    /// on a unit's role.
    pub fn unit_schemas(&self) -> StorageResult<Vec<UnitSchema>> {
        let mut units: BTreeMap<String, UnitSchema> = BTreeMap::new();
        let mut keys: Vec<&TypeKey> = self.types.keys().collect();
        keys.sort();

        for key in keys {
            let mapping = &self.types[key];
            for unit in mapping.mappings() {
                let mut columns: Vec<ColumnSchema> = unit
                    .discriminator
                    .iter()
                    .map(|c| ColumnSchema {
                        name: c.clone(),
                        kind: FieldKind::Text,
                    })
                    .collect();
                columns.extend(unit.fields.iter().map(|f| ColumnSchema {
                    name: f.column.clone(),
                    kind: f.kind,
                }));
                merge_unit(&mut units, &unit.unit, unit.is_root(), unit.key_column(), columns)?;
            }
            for collection in mapping.collections() {
                let columns = vec![
                    ColumnSchema {
                        name: collection.owner_column.clone(),
                        kind: FieldKind::Id,
                    },
                    ColumnSchema {
                        name: collection.key_column.clone(),
                        kind: FieldKind::Text,
                    },
                    ColumnSchema {
                        name: collection.value_column.clone(),
                        kind: collection.value_kind,
                    },
                ];
                merge_unit(&mut units, &collection.unit, false, &collection.owner_column, columns)?;
            }
        }
        Ok(units.into_values().collect())
    }

    fn validate_shared_units(&self) -> StorageResult<()> {
        let mut by_root: BTreeMap<&str, Vec<&TypeMapping>> = BTreeMap::new();
        for mapping in self.types.values() {
            by_root.entry(mapping.root().unit.as_str()).or_default().push(mapping);
        }
        for (unit, mappings) in by_root {
            if mappings.len() > 1 {
                let columns: BTreeSet<Option<&String>> = mappings
                    .iter()
                    .map(|m| m.root().discriminator.as_ref())
                    .collect();
                if columns.len() != 1 || columns.contains(&None) {
                    return Err(StorageError::mapping(format!(
                        "root unit '{unit}' is shared by several types and needs one discriminator column"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn merge_unit(
    units: &mut BTreeMap<String, UnitSchema>,
    name: &str,
    root: bool,
    key_column: &str,
    columns: Vec<ColumnSchema>,
) -> StorageResult<()> {
    let schema = units.entry(name.to_string()).or_insert_with(|| UnitSchema {
        name: name.to_string(),
        root,
        key_column: key_column.to_string(),
        columns: Vec::new(),
    });
    if schema.root != root || schema.key_column != key_column {
        return Err(StorageError::mapping(format!(
            "unit '{name}' is mapped both as root and as child, or with two key columns"
        )));
    }
    for column in columns {
        match schema.columns.iter().find(|c| c.name == column.name) {
            Some(existing) if existing.kind != column.kind => {
                return Err(StorageError::mapping(format!(
                    "column '{name}.{}' mapped as {:?} and {:?}",
                    column.name, existing.kind, column.kind
                )))
            }
            Some(_) => {}
            None => schema.columns.push(column),
        }
    }
    Ok(())
}

fn collection_entry<'a>(
    row: &'a PhysicalRecord,
    collection: &CollectionMapping,
) -> StorageResult<(&'a str, &'a FieldValue)> {
    let key = row
        .get(&collection.key_column)
        .and_then(FieldValue::as_text)
        .ok_or_else(|| {
            StorageError::mapping(format!(
                "'{}' row lacks key column '{}'",
                collection.unit, collection.key_column
            ))
        })?;
    let value = row.get(&collection.value_column).ok_or_else(|| {
        StorageError::mapping(format!(
            "'{}' row lacks value column '{}'",
            collection.unit, collection.value_column
        ))
    })?;
    Ok((key, value))
}

fn collection_row(
    collection: &CollectionMapping,
    owner: uuid::Uuid,
    key: &str,
    value: FieldValue,
) -> PhysicalRecord {
    PhysicalRecord::new(collection.unit.clone())
        .with(collection.owner_column.clone(), FieldValue::Id(owner))
        .with(collection.key_column.clone(), FieldValue::Text(key.to_string()))
        .with(collection.value_column.clone(), value)
}

/// Returns whether `name` is usable as a unit or column name.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn check_identifier(name: &str) -> StorageResult<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(StorageError::mapping(format!("'{name}' is not a valid unit or column name")))
    }
}

fn validate_type(mapping: &TypeMapping) -> StorageResult<()> {
    let key = mapping.key;
    let mut properties = BTreeSet::new();
    for (index, unit) in mapping.mappings().iter().enumerate() {
        check_identifier(&unit.unit)?;
        let identifiers = unit.fields.iter().filter(|f| f.role == FieldRole::Identifier).count();
        let owners = unit
            .fields
            .iter()
            .filter(|f| f.role == FieldRole::OwnerReference)
            .count();
        let well_keyed = if index == 0 {
            identifiers == 1 && owners == 0
        } else {
            identifiers == 0 && owners == 1 && unit.discriminator.is_none()
        };
        if !well_keyed {
            return Err(StorageError::mapping(format!(
                "{key}: unit '{}' must be keyed by exactly one {} field",
                unit.unit,
                if index == 0 { "identifier" } else { "owner reference" }
            )));
        }
        let mut columns = BTreeSet::new();
        for column in unit.discriminator.iter().chain(unit.fields.iter().map(|f| &f.column)) {
            check_identifier(column)?;
            if !columns.insert(column.as_str()) {
                return Err(StorageError::mapping(format!(
                    "{key}: column '{}.{column}' is bound twice",
                    unit.unit
                )));
            }
        }
        for field in unit.fields.iter().filter(|f| f.role == FieldRole::Property) {
            if field.property == ID_PROPERTY || !properties.insert(field.property.as_str()) {
                return Err(StorageError::mapping(format!(
                    "{key}: property '{}' is bound twice",
                    field.property
                )));
            }
        }
    }
    for collection in mapping.collections() {
        for name in [
            &collection.unit,
            &collection.owner_column,
            &collection.key_column,
            &collection.value_column,
        ] {
            check_identifier(name)?;
        }
    }
    if let Some(unit) = &mapping.credentials {
        check_identifier(unit)?;
    }
    Ok(())
}

fn identity_root() -> EntityMapping {
    EntityMapping::root(standard::IDENTITY_TYPE, "id")
        .bind(property::PARTITION, "partition_id", FieldKind::Id, false)
        .property(property::ENABLED, FieldKind::Bool)
        .property(property::CREATED_DATE, FieldKind::Timestamp)
        .optional(property::EXPIRATION_DATE, FieldKind::Timestamp)
        .discriminator(standard::TYPE_NAME)
}

fn identity_attributes() -> CollectionMapping {
    CollectionMapping::new(standard::IDENTITY_ATTRIBUTE, "owner_id", "name", "value", FieldKind::Json)
}

fn agent_unit() -> EntityMapping {
    EntityMapping::child(standard::AGENT, "identity_id").property(property::LOGIN_NAME, FieldKind::Text)
}

fn relationship_mapping(key: TypeKey) -> TypeMapping {
    TypeMapping::new(
        key,
        EntityMapping::root(standard::RELATIONSHIP, "id").discriminator(standard::TYPE_NAME),
    )
    .with_attributes(CollectionMapping::new(
        standard::RELATIONSHIP_ATTRIBUTE,
        "owner_id",
        "name",
        "value",
        FieldKind::Json,
    ))
    .with_members(CollectionMapping::new(
        standard::RELATIONSHIP_MEMBER,
        "relationship_id",
        "descriptor",
        "identity_id",
        FieldKind::Id,
    ))
}

fn partition_mapping(key: TypeKey) -> TypeMapping {
    TypeMapping::new(
        key,
        EntityMapping::root(standard::PARTITION, "id")
            .property(property::NAME, FieldKind::Text)
            .bind(property::PARENT, "parent_id", FieldKind::Id, true)
            .discriminator("partition_type"),
    )
}

/// Mappings of the standard schema.
#[must_use]
pub fn standard_mappings() -> Vec<TypeMapping> {
    vec![
        partition_mapping(TypeKey::Realm),
        partition_mapping(TypeKey::Tier),
        TypeMapping::new(TypeKey::Agent, identity_root())
            .with_unit(agent_unit())
            .with_attributes(identity_attributes())
            .with_credentials(standard::CREDENTIAL),
        TypeMapping::new(TypeKey::User, identity_root())
            .with_unit(agent_unit())
            .with_unit(
                EntityMapping::child(standard::USER_PROFILE, "identity_id")
                    .optional(property::FIRST_NAME, FieldKind::Text)
                    .optional(property::LAST_NAME, FieldKind::Text)
                    .optional(property::EMAIL, FieldKind::Text),
            )
            .with_attributes(identity_attributes())
            .with_credentials(standard::CREDENTIAL),
        TypeMapping::new(TypeKey::Group, identity_root())
            .with_unit(
                EntityMapping::child(standard::IDENTITY_GROUP, "identity_id")
                    .property(property::NAME, FieldKind::Text)
                    .property(property::PATH, FieldKind::Text)
                    .bind(property::PARENT_GROUP, "parent_group_id", FieldKind::Id, true),
            )
            .with_attributes(identity_attributes()),
        TypeMapping::new(TypeKey::Role, identity_root())
            .with_unit(
                EntityMapping::child(standard::IDENTITY_ROLE, "identity_id")
                    .property(property::NAME, FieldKind::Text),
            )
            .with_attributes(identity_attributes()),
        relationship_mapping(TypeKey::Grant),
        relationship_mapping(TypeKey::GroupMembership),
        relationship_mapping(TypeKey::GroupRole),
        TypeMapping::new(
            TypeKey::Credential,
            EntityMapping::root(standard::CREDENTIAL, "id")
                .bind(property::OWNER, "owner_agent_id", FieldKind::Id, false)
                .property(property::CREDENTIAL_TYPE, FieldKind::Text)
                .optional(property::EFFECTIVE_DATE, FieldKind::Timestamp)
                .optional(property::EXPIRY_DATE, FieldKind::Timestamp)
                .property(property::REVISION, FieldKind::Integer)
                .property(property::FIELDS, FieldKind::Json),
        ),
    ]
}
