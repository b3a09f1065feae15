//! Relationship operations.
//!
//! A group role also records the plain grant and the group membership it
//! implies, unless relationships with the same members already exist.

use std::collections::BTreeMap;

use idm_core::EventType;
use idm_model::{descriptor, IdentityType, Relationship, RelationshipKind};
use idm_spi::IdentityContext;
use idm_storage::{
    Region, RelationshipQuery, StorageError, StorageResult, StoredRelationship, TypeKey, WriteBatch,
};
use uuid::Uuid;

use crate::manager::IdentityManager;
use crate::query::relationship::{filter_relationships, hydrate};
use crate::view::StoreView;

impl IdentityManager {
    /// Stores a relationship between stored identities.
    ///
    /// The returned relationship carries the stored copies of its members.
    ///
    /// ## Errors
    ///
    /// Returns a validation error for a missing or mistyped member,
    /// `NotFound` for a member that is not stored, `AlreadyExists` for an id
    /// already in use, and `UnsupportedAttributedType` if the relationship
    /// type has no mapping.
    pub async fn add_relationship(
        &self,
        ctx: &IdentityContext,
        mut relationship: Relationship,
    ) -> StorageResult<Relationship> {
        relationship.validate()?;
        self.registry
            .resolve_mapper(TypeKey::for_relationship(relationship.kind))?;

        let guard = self.lock().await;
        let mut view = self.locked_view(&guard);
        relationship.members = stored_members(&mut view, &relationship).await?;

        let existing = view.relationships().await?;
        let id = match relationship.id {
            Some(id) if existing.iter().any(|r| r.id == id) => {
                return Err(StorageError::already_exists("Relationship", "id", id.to_string()));
            }
            Some(id) => id,
            None => Uuid::now_v7(),
        };
        relationship.id = Some(id);

        let stored = StoredRelationship::snapshot(&relationship)?;
        let mut created = vec![stored.id];
        let mut batch = WriteBatch::new();
        batch.put(Region::Relationships, self.registry.dematerialize(&stored)?);

        if relationship.kind == RelationshipKind::GroupRole {
            for implied in implied_by_group_role(&stored) {
                if existing
                    .iter()
                    .any(|r| r.same_members(implied.kind, &implied.members))
                {
                    continue;
                }
                created.push(implied.id);
                batch.put(Region::Relationships, self.registry.dematerialize(&implied)?);
            }
        }
        self.commit(batch).await?;

        tracing::info!(
            relationship = %id,
            kind = relationship.kind.as_str(),
            implied = created.len() - 1,
            "relationship added"
        );
        for created in created {
            self.raise(
                EventType::RelationshipCreated,
                Some(ctx.partition_id()),
                Some(created),
                Some(ctx),
            );
        }
        Ok(relationship)
    }

    /// Replaces a stored relationship's attributes.
    ///
    /// ## Errors
    ///
    /// Returns a validation error for a relationship without an id or with
    /// members different from the stored ones, and `NotFound` if it is not
    /// stored.
    pub async fn update_relationship(
        &self,
        ctx: &IdentityContext,
        relationship: Relationship,
    ) -> StorageResult<Relationship> {
        let id = relationship
            .id
            .ok_or_else(|| StorageError::validation("relationship has no id"))?;
        relationship.attributes.validate()?;

        let guard = self.lock().await;
        let mut view = self.locked_view(&guard);
        let mut stored = view
            .relationships()
            .await?
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("Relationship", id))?;
        if !stored.same_members(relationship.kind, &relationship.member_ids()?) {
            return Err(StorageError::validation(format!(
                "members of relationship {id} cannot change"
            )));
        }
        stored.attributes = relationship.attributes;

        let mut batch = WriteBatch::new();
        batch.put(Region::Relationships, self.registry.dematerialize(&stored)?);
        self.commit(batch).await?;

        tracing::info!(relationship = %id, kind = stored.kind.as_str(), "relationship updated");
        self.raise(
            EventType::RelationshipUpdated,
            Some(ctx.partition_id()),
            Some(id),
            Some(ctx),
        );
        hydrate(&mut view, &stored)
            .await?
            .ok_or_else(|| StorageError::not_found("Relationship", id))
    }

    /// Removes a relationship by id, or by type and members when it has no
    /// id.
    ///
    /// Removing a group role leaves the grant and membership it implied.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` for an unknown id, `NotFoundByName` when no stored
    /// relationship has the members, and `AmbiguousRelationship` when more
    /// than one does.
    pub async fn remove_relationship(
        &self,
        ctx: &IdentityContext,
        relationship: &Relationship,
    ) -> StorageResult<()> {
        let guard = self.lock().await;
        let mut view = self.locked_view(&guard);
        let relationships = view.relationships().await?;

        let target = match relationship.id {
            Some(id) => relationships
                .iter()
                .find(|r| r.id == id)
                .ok_or_else(|| StorageError::not_found("Relationship", id))?,
            None => {
                let members = relationship.member_ids()?;
                let matches: Vec<_> = relationships
                    .iter()
                    .filter(|r| r.same_members(relationship.kind, &members))
                    .collect();
                match matches.as_slice() {
                    [single] => *single,
                    [] => {
                        return Err(StorageError::not_found_by_name(
                            "Relationship",
                            describe(relationship.kind, &members),
                        ))
                    }
                    _ => {
                        return Err(StorageError::AmbiguousRelationship {
                            kind: relationship.kind.as_str(),
                            count: matches.len(),
                        })
                    }
                }
            }
        };

        let id = target.id;
        let mut batch = WriteBatch::new();
        batch.delete(Region::Relationships, id);
        self.commit(batch).await?;

        tracing::info!(relationship = %id, kind = target.kind.as_str(), "relationship removed");
        self.raise(
            EventType::RelationshipDeleted,
            Some(ctx.partition_id()),
            Some(id),
            Some(ctx),
        );
        Ok(())
    }

    /// Runs a relationship query. Results are ordered by id.
    ///
    /// Relationships whose members can no longer be loaded are skipped.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedQueryParameter` for an invalid query.
    pub async fn fetch_relationships(
        &self,
        ctx: &IdentityContext,
        query: &RelationshipQuery,
    ) -> StorageResult<Vec<Relationship>> {
        query.validate()?;
        let mut view = self.snapshot_view().await?;
        let mut matched = filter_relationships(&mut view, ctx.partition_id(), query).await?;
        matched.sort_by_key(|r| r.id);

        let mut results = Vec::with_capacity(matched.len());
        for stored in &matched {
            if let Some(relationship) = hydrate(&mut view, stored).await? {
                results.push(relationship);
            }
        }
        let results = match query.page {
            Some(page) => page.apply(results),
            None => results,
        };
        tracing::debug!(kinds = query.kinds().len(), results = results.len(), "relationship query");
        Ok(results)
    }

    /// Counts the relationships a query matches, ignoring its page.
    ///
    /// ## Errors
    ///
    /// Same as [`IdentityManager::fetch_relationships`].
    pub async fn count_relationships(
        &self,
        ctx: &IdentityContext,
        query: &RelationshipQuery,
    ) -> StorageResult<usize> {
        let mut unpaged = query.clone();
        unpaged.page = None;
        Ok(self.fetch_relationships(ctx, &unpaged).await?.len())
    }
}

/// Replaces each member with its stored copy, checking the stored class
/// still fits the slot.
async fn stored_members(
    view: &mut StoreView<'_>,
    relationship: &Relationship,
) -> StorageResult<BTreeMap<String, IdentityType>> {
    let mut members = BTreeMap::new();
    for (slot, member) in &relationship.members {
        let id = member.id.ok_or_else(|| {
            StorageError::validation(format!(
                "{} member '{slot}' has no id",
                relationship.kind
            ))
        })?;
        let stored = view
            .identity(id)
            .await?
            .ok_or_else(|| StorageError::not_found(member.type_name(), id))?;
        let accepts = relationship
            .kind
            .slot(slot)
            .map(|s| s.accepts)
            .ok_or_else(|| StorageError::validation(format!("unknown member slot '{slot}'")))?;
        if !accepts.covers(stored.class()) {
            return Err(StorageError::validation(format!(
                "{} member '{slot}' must be {}, stored {id} is {}",
                relationship.kind,
                accepts.as_str(),
                stored.type_name()
            )));
        }
        members.insert(slot.clone(), stored);
    }
    Ok(members)
}

/// The grant and membership a stored group role implies.
fn implied_by_group_role(group_role: &StoredRelationship) -> Vec<StoredRelationship> {
    let (Some(member), Some(group), Some(role)) = (
        group_role.member(descriptor::MEMBER),
        group_role.member(descriptor::GROUP),
        group_role.member(descriptor::ROLE),
    ) else {
        return Vec::new();
    };
    let implied = |kind, members: [(&str, Uuid); 2]| StoredRelationship {
        id: Uuid::now_v7(),
        kind,
        members: members
            .into_iter()
            .map(|(slot, id)| (slot.to_string(), id))
            .collect(),
        attributes: idm_model::Attributes::new(),
    };
    vec![
        implied(
            RelationshipKind::Grant,
            [(descriptor::ASSIGNEE, member), (descriptor::ROLE, role)],
        ),
        implied(
            RelationshipKind::GroupMembership,
            [(descriptor::MEMBER, member), (descriptor::GROUP, group)],
        ),
    ]
}

fn describe(kind: RelationshipKind, members: &BTreeMap<String, Uuid>) -> String {
    let members: Vec<_> = members.iter().map(|(slot, id)| format!("{slot}={id}")).collect();
    format!("{kind}({})", members.join(", "))
}
