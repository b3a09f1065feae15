//! Persisted relationship form.

use std::collections::BTreeMap;

use idm_model::{Attributes, Relationship, RelationshipKind};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// A relationship as stored: members are reduced to their ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRelationship {
    /// Relationship id.
    pub id: Uuid,
    /// Relationship type.
    pub kind: RelationshipKind,
    /// Member ids keyed by descriptor.
    pub members: BTreeMap<String, Uuid>,
    /// Attribute bag.
    pub attributes: Attributes,
}

impl StoredRelationship {
    /// Snapshots a relationship that already has an id.
    ///
    /// ## Errors
    ///
    /// Returns a validation error if the relationship or a member has no id.
    pub fn snapshot(relationship: &Relationship) -> StorageResult<Self> {
        let id = relationship
            .id
            .ok_or_else(|| StorageError::validation("relationship has no id"))?;
        Ok(Self {
            id,
            kind: relationship.kind,
            members: relationship.member_ids()?,
            attributes: relationship.attributes.clone(),
        })
    }

    /// Returns the member id in a slot.
    #[must_use]
    pub fn member(&self, descriptor: &str) -> Option<Uuid> {
        self.members.get(descriptor).copied()
    }

    /// Returns whether `identity` occupies any slot.
    #[must_use]
    pub fn involves(&self, identity: Uuid) -> bool {
        self.members.values().any(|id| *id == identity)
    }

    /// Returns whether both relationships link the same members.
    #[must_use]
    pub fn same_members(&self, kind: RelationshipKind, members: &BTreeMap<String, Uuid>) -> bool {
        self.kind == kind && &self.members == members
    }
}
