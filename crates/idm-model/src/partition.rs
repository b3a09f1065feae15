//! Partition domain model.
//!
//! Partitions scope every identity. A Realm is a flat, top-level tenant; a
//! Tier is a nested scope whose parent chain is walked when roles and groups
//! are looked up by name.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};

/// Concrete partition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    /// Tenancy root.
    Realm,
    /// Nested sub-scope.
    Tier,
}

impl PartitionKind {
    /// Returns the name used in storage and error messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Realm => "Realm",
            Self::Tier => "Tier",
        }
    }
}

/// A partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Unique identifier, assigned when the partition is created.
    pub id: Option<Uuid>,
    /// Name, unique among partitions of the same kind.
    pub name: String,
    /// Realm or Tier.
    pub kind: PartitionKind,
    /// Parent tier. Only tiers have one.
    pub parent_id: Option<Uuid>,
}

impl Partition {
    /// Creates a realm.
    #[must_use]
    pub fn realm(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind: PartitionKind::Realm,
            parent_id: None,
        }
    }

    /// Creates a top-level tier.
    #[must_use]
    pub fn tier(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind: PartitionKind::Tier,
            parent_id: None,
        }
    }

    /// Sets the parent tier.
    #[must_use]
    pub fn with_parent(mut self, parent: &Self) -> Self {
        self.parent_id = parent.id;
        self
    }

    /// Returns whether this is a realm.
    #[must_use]
    pub const fn is_realm(&self) -> bool {
        matches!(self.kind, PartitionKind::Realm)
    }

    /// Validates the partition before creation.
    ///
    /// ## Errors
    ///
    /// Returns an error for a blank name or a realm with a parent.
    pub fn validate(&self) -> ModelResult<()> {
        if self.name.trim().is_empty() {
            return Err(ModelError::missing("Partition", "name"));
        }
        if self.is_realm() && self.parent_id.is_some() {
            return Err(ModelError::invalid("Partition", "a realm cannot have a parent"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_takes_parent_id() {
        let mut parent = Partition::tier("t1");
        parent.id = Some(Uuid::now_v7());

        let child = Partition::tier("t2").with_parent(&parent);

        assert_eq!(child.parent_id, parent.id);
        assert!(!child.is_realm());
        assert!(child.validate().is_ok());
    }

    #[test]
    fn realm_with_parent_is_invalid() {
        let mut parent = Partition::tier("t1");
        parent.id = Some(Uuid::now_v7());

        let realm = Partition::realm("acme").with_parent(&parent);
        assert!(realm.validate().is_err());
    }

    #[test]
    fn blank_name_is_invalid() {
        assert_eq!(
            Partition::realm("  ").validate(),
            Err(ModelError::missing("Partition", "name"))
        );
    }
}
