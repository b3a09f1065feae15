//! Physical records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value::FieldValue;

/// One row of one physical storage unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalRecord {
    /// Storage unit (table, file section) the row belongs to.
    pub unit: String,
    /// Column values.
    pub fields: BTreeMap<String, FieldValue>,
}

impl PhysicalRecord {
    /// Creates an empty row for `unit`.
    #[must_use]
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Sets a column value.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(column.into(), value);
        self
    }

    /// Sets a column value in place.
    pub fn set(&mut self, column: impl Into<String>, value: FieldValue) {
        self.fields.insert(column.into(), value);
    }

    /// Gets a column value.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }
}

/// Every physical row that makes up one entity, root row first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity identifier.
    pub id: Uuid,
    /// Rows; `records[0]` is the root unit's row.
    pub records: Vec<PhysicalRecord>,
}

impl EntityRecord {
    /// Creates a record from its rows.
    #[must_use]
    pub const fn new(id: Uuid, records: Vec<PhysicalRecord>) -> Self {
        Self { id, records }
    }

    /// Returns the root row.
    #[must_use]
    pub fn root(&self) -> Option<&PhysicalRecord> {
        self.records.first()
    }

    /// Returns the first row of `unit`.
    #[must_use]
    pub fn unit(&self, unit: &str) -> Option<&PhysicalRecord> {
        self.records.iter().find(|r| r.unit == unit)
    }

    /// Returns every row of `unit`.
    pub fn rows<'a>(&'a self, unit: &'a str) -> impl Iterator<Item = &'a PhysicalRecord> + 'a {
        self.records.iter().filter(move |r| r.unit == unit)
    }
}
