//! Relationship query evaluation.
//!
//! Every `(parameter, value)` pair becomes one [`Predicate`]; a stored
//! relationship matches when all of them hold. Identity references are
//! resolved once, before any relationship is examined.

use std::collections::HashSet;

use idm_model::{descriptor, IdentityClass, Relationship, RelationshipKind, Scalar};
use idm_storage::{
    IdentityRef, QueryValue, RelationshipParameter, RelationshipQuery, StorageResult,
    StoredRelationship,
};
use uuid::Uuid;

use crate::view::StoreView;

#[derive(Debug)]
enum Predicate {
    /// Some slot holds one of the ids.
    AnySlot(HashSet<Uuid>),
    /// The named slot holds one of the ids.
    Slot {
        descriptor: String,
        ids: HashSet<Uuid>,
    },
    /// The attribute holds every value.
    Attribute { name: String, values: Vec<Scalar> },
}

impl Predicate {
    fn matches(&self, relationship: &StoredRelationship) -> bool {
        match self {
            Self::AnySlot(ids) => relationship.members.values().any(|id| ids.contains(id)),
            Self::Slot { descriptor, ids } => relationship
                .member(descriptor)
                .is_some_and(|id| ids.contains(&id)),
            Self::Attribute { name, values } => relationship
                .attributes
                .get(name)
                .is_some_and(|stored| stored.contains_all(values)),
        }
    }
}

/// Class a descriptor's slot accepts across the queried kinds.
fn slot_class(kinds: &[RelationshipKind], descriptor: &str) -> IdentityClass {
    let mut classes = kinds
        .iter()
        .filter_map(|k| k.slot(descriptor))
        .map(|slot| slot.accepts);
    match classes.next() {
        Some(first) if classes.all(|c| c == first) => first,
        _ => IdentityClass::Any,
    }
}

/// Resolves a reference to the ids it may denote in `partition`.
///
/// Names are matched as login names, role names, and group paths or names,
/// as far as `class` allows. Role and group names walk the tier chain.
pub(crate) async fn resolve_ref(
    view: &mut StoreView<'_>,
    partition: Uuid,
    reference: &IdentityRef,
    class: IdentityClass,
) -> StorageResult<HashSet<Uuid>> {
    let name = match reference {
        IdentityRef::Id(id) => return Ok(HashSet::from([*id])),
        IdentityRef::Name(name) => name,
    };
    let mut found = Vec::new();
    if matches!(class, IdentityClass::Any | IdentityClass::Agent | IdentityClass::User) {
        found.push(
            view.find_agent(partition, name)
                .await?
                .filter(|a| class != IdentityClass::User || a.as_user().is_some()),
        );
    }
    if matches!(class, IdentityClass::Any | IdentityClass::Role) {
        found.push(view.find_role(partition, name).await?);
    }
    if matches!(class, IdentityClass::Any | IdentityClass::Group) {
        found.push(view.find_group(partition, name).await?);
    }
    Ok(found.into_iter().flatten().filter_map(|i| i.id).collect())
}

async fn build_predicates(
    view: &mut StoreView<'_>,
    partition: Uuid,
    query: &RelationshipQuery,
) -> StorageResult<Vec<Predicate>> {
    let kinds = query.kinds();
    let mut predicates = Vec::new();
    for (parameter, values) in &query.parameters {
        match parameter {
            RelationshipParameter::Identity => {
                for reference in values.iter().filter_map(QueryValue::as_identity_ref) {
                    let ids = resolve_ref(view, partition, &reference, IdentityClass::Any).await?;
                    predicates.push(Predicate::AnySlot(ids));
                }
            }
            RelationshipParameter::Member(slot) => {
                let class = slot_class(&kinds, slot);
                let hierarchical = slot == descriptor::GROUP && !query.exact_group_match;
                for reference in values.iter().filter_map(QueryValue::as_identity_ref) {
                    let mut ids = resolve_ref(view, partition, &reference, class).await?;
                    if hierarchical {
                        // A stored ancestor group also matches.
                        for group in ids.clone() {
                            ids.extend(view.group_lineage(group).await?);
                        }
                    }
                    predicates.push(Predicate::Slot {
                        descriptor: slot.clone(),
                        ids,
                    });
                }
            }
            RelationshipParameter::Attribute(name) => {
                predicates.push(Predicate::Attribute {
                    name: name.clone(),
                    values: values.iter().filter_map(QueryValue::to_scalar).collect(),
                });
            }
        }
    }
    Ok(predicates)
}

/// Returns the stored relationships matching `query`, in storage order,
/// without paging.
pub(crate) async fn filter_relationships(
    view: &mut StoreView<'_>,
    partition: Uuid,
    query: &RelationshipQuery,
) -> StorageResult<Vec<StoredRelationship>> {
    let predicates = build_predicates(view, partition, query).await?;
    let kinds = query.kinds();
    let stored = view.relationships().await?;
    Ok(stored
        .iter()
        .filter(|r| kinds.contains(&r.kind))
        .filter(|r| predicates.iter().all(|p| p.matches(r)))
        .cloned()
        .collect())
}

/// Returns whether any stored relationship matches `query`.
pub(crate) async fn any_relationship(
    view: &mut StoreView<'_>,
    partition: Uuid,
    query: &RelationshipQuery,
) -> StorageResult<bool> {
    Ok(!filter_relationships(view, partition, query).await?.is_empty())
}

/// Rebuilds a relationship with fresh copies of its members.
///
/// Returns `None` if a member no longer exists.
pub(crate) async fn hydrate(
    view: &mut StoreView<'_>,
    stored: &StoredRelationship,
) -> StorageResult<Option<Relationship>> {
    let mut relationship = Relationship::new(stored.kind);
    relationship.id = Some(stored.id);
    relationship.attributes = stored.attributes.clone();
    for (slot, id) in &stored.members {
        match view.identity(*id).await? {
            Some(member) => {
                relationship.members.insert(slot.clone(), member);
            }
            None => {
                tracing::warn!(relationship = %stored.id, member = %id, slot = %slot, "unresolvable relationship member");
                return Ok(None);
            }
        }
    }
    Ok(Some(relationship))
}
