//! Identity query evaluation.
//!
//! Candidates are collected from the queried partitions and narrowed by the
//! query's predicates in stage order, so cheap field checks run before
//! relationship lookups. Sorting always happens before paging.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use idm_core::PaginationMode;
use idm_model::{IdentityClass, IdentityType, RelationshipKind};
use idm_spi::IdentityContext;
use idm_storage::{
    IdentityParameter, IdentityQuery, IdentityRef, QueryValue, Region, RelationshipParameter,
    RelationshipQuery, StorageResult,
};
use uuid::Uuid;

use super::order::sort_identities;
use super::relationship::any_relationship;
use crate::manager::IdentityManager;
use crate::view::StoreView;

type Predicate = (IdentityParameter, Vec<QueryValue>);

impl IdentityManager {
    /// Runs an identity query in the context's partition, or in the
    /// partitions named by `PARTITION`.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedQueryParameter` or `UnsupportedSortKey` for an
    /// invalid query, and storage errors from loading candidates.
    pub async fn fetch_identities(
        &self,
        ctx: &IdentityContext,
        query: &IdentityQuery,
    ) -> StorageResult<Vec<IdentityType>> {
        query.validate()?;
        let mut view = self.snapshot_view().await?;
        let results = run(&mut view, ctx.partition_id(), query, self.pagination).await?;
        tracing::debug!(
            class = query.class.as_str(),
            parameters = query.parameters.len(),
            results = results.len(),
            "identity query"
        );
        Ok(results)
    }

    /// Counts the identities a query matches, ignoring its page.
    ///
    /// ## Errors
    ///
    /// Same as [`IdentityManager::fetch_identities`].
    pub async fn count_identities(
        &self,
        ctx: &IdentityContext,
        query: &IdentityQuery,
    ) -> StorageResult<usize> {
        let mut unpaged = query.clone();
        unpaged.page = None;
        unpaged.sort = None;
        Ok(self.fetch_identities(ctx, &unpaged).await?.len())
    }
}

async fn run(
    view: &mut StoreView<'_>,
    default_partition: Uuid,
    query: &IdentityQuery,
    pagination: PaginationMode,
) -> StorageResult<Vec<IdentityType>> {
    let mut candidates = candidates(view, default_partition, query).await?;
    if let Some(sort) = &query.sort {
        sort_identities(&mut candidates, sort, &sort.effective_keys(query.class));
    }

    let (identifiers, rest): (Vec<&Predicate>, Vec<&Predicate>) = query
        .ordered_parameters()
        .into_iter()
        .partition(|(p, _)| *p == IdentityParameter::Id);
    let page = query.page.unwrap_or_default();

    match pagination {
        PaginationMode::FilteredResults => {
            let mut matched = Vec::new();
            for candidate in candidates {
                if all_match(view, default_partition, &candidate, &identifiers).await?
                    && all_match(view, default_partition, &candidate, &rest).await?
                {
                    matched.push(candidate);
                }
            }
            Ok(page.apply(matched))
        }
        PaginationMode::CandidateCount => {
            // The window counts candidates that pass the identifier check,
            // so a page may come back short.
            let mut counted = 0;
            let mut matched = Vec::new();
            for candidate in candidates {
                if page.limit.is_some_and(|limit| counted >= page.offset.saturating_add(limit)) {
                    break;
                }
                if !all_match(view, default_partition, &candidate, &identifiers).await? {
                    continue;
                }
                counted += 1;
                if counted <= page.offset {
                    continue;
                }
                if all_match(view, default_partition, &candidate, &rest).await? {
                    matched.push(candidate);
                }
            }
            Ok(matched)
        }
    }
}

fn class_regions(class: IdentityClass, partition: Uuid) -> Vec<Region> {
    match class {
        IdentityClass::Agent | IdentityClass::User => vec![Region::Agents(partition)],
        IdentityClass::Group => vec![Region::Groups(partition)],
        IdentityClass::Role => vec![Region::Roles(partition)],
        IdentityClass::Any => Region::identity_regions(partition).to_vec(),
    }
}

async fn candidates(
    view: &mut StoreView<'_>,
    default_partition: Uuid,
    query: &IdentityQuery,
) -> StorageResult<Vec<IdentityType>> {
    let mut partitions: Vec<Uuid> = match query.values(&IdentityParameter::Partition) {
        Some(values) => values
            .iter()
            .filter_map(|v| match v {
                QueryValue::Id(id) => Some(*id),
                _ => None,
            })
            .collect(),
        None => vec![default_partition],
    };
    let mut seen = HashSet::new();
    partitions.retain(|p| seen.insert(*p));

    let mut candidates = Vec::new();
    for partition in partitions {
        if view.partition(partition).await?.is_none() {
            continue;
        }
        for region in class_regions(query.class, partition) {
            candidates.extend(
                view.identities(region)
                    .await?
                    .iter()
                    .filter(|i| query.class.includes(&i.kind))
                    .cloned(),
            );
        }
    }
    Ok(candidates)
}

async fn all_match(
    view: &mut StoreView<'_>,
    partition: Uuid,
    candidate: &IdentityType,
    predicates: &[&Predicate],
) -> StorageResult<bool> {
    for (parameter, values) in predicates {
        if !parameter_matches(view, partition, candidate, parameter, values).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn parameter_matches(
    view: &mut StoreView<'_>,
    partition: Uuid,
    candidate: &IdentityType,
    parameter: &IdentityParameter,
    values: &[QueryValue],
) -> StorageResult<bool> {
    use IdentityParameter as P;

    if let P::Attribute(name) = parameter {
        let queried: Vec<_> = values.iter().filter_map(QueryValue::to_scalar).collect();
        return Ok(candidate
            .attributes
            .get(name)
            .is_some_and(|stored| stored.contains_all(&queried)));
    }
    // Several partitions widen the candidate set instead of narrowing it.
    if *parameter == P::Partition {
        return Ok(values
            .iter()
            .any(|v| matches!(v, QueryValue::Id(id) if candidate.partition_id == Some(*id))));
    }

    // Multiple values of one parameter combine conjunctively.
    for value in values {
        let matched = match parameter {
            P::Id => matches!(value, QueryValue::Id(id) if candidate.id == Some(*id)),
            P::Enabled => matches!(value, QueryValue::Bool(b) if candidate.enabled == *b),
            P::CreatedDate => at(value).is_some_and(|t| candidate.created_date == t),
            P::CreatedBefore => at(value).is_some_and(|t| candidate.created_date <= t),
            P::CreatedAfter => at(value).is_some_and(|t| candidate.created_date >= t),
            P::ExpiryDate => expiry_matches(candidate, value, |e, t| e == t),
            P::ExpiryBefore => expiry_matches(candidate, value, |e, t| e <= t),
            P::ExpiryAfter => expiry_matches(candidate, value, |e, t| e >= t),
            P::LoginName => text_equals(candidate.login_name(), value),
            P::FirstName => text_equals(
                candidate.as_user().and_then(|u| u.first_name.as_deref()),
                value,
            ),
            P::LastName => text_equals(
                candidate.as_user().and_then(|u| u.last_name.as_deref()),
                value,
            ),
            P::Email => text_equals(candidate.as_user().and_then(|u| u.email.as_deref()), value),
            P::Name => text_equals(candidate.name(), value),
            P::Path => text_equals(candidate.as_group().map(|g| g.path.as_str()), value),
            P::Parent => parent_matches(view, candidate, value).await?,
            P::HasRole
            | P::MemberOf
            | P::HasGroupRole
            | P::RoleOf
            | P::HasMember => related(view, partition, candidate, parameter, value).await?,
            P::Partition | P::Attribute(_) => false,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn at(value: &QueryValue) -> Option<DateTime<Utc>> {
    match value {
        QueryValue::Timestamp(t) => Some(*t),
        _ => None,
    }
}

/// An identity without an expiration date never matches an expiry filter.
fn expiry_matches(
    candidate: &IdentityType,
    value: &QueryValue,
    cmp: impl Fn(DateTime<Utc>, DateTime<Utc>) -> bool,
) -> bool {
    match (candidate.expiration_date, at(value)) {
        (Some(expiry), Some(t)) => cmp(expiry, t),
        _ => false,
    }
}

fn text_equals(field: Option<&str>, value: &QueryValue) -> bool {
    matches!((field, value), (Some(field), QueryValue::Text(text)) if field == text)
}

async fn parent_matches(
    view: &mut StoreView<'_>,
    candidate: &IdentityType,
    value: &QueryValue,
) -> StorageResult<bool> {
    let Some(parent_id) = candidate.as_group().and_then(|g| g.parent_id) else {
        return Ok(false);
    };
    Ok(match value {
        QueryValue::Id(id) => parent_id == *id,
        QueryValue::Text(text) => view
            .identity(parent_id)
            .await?
            .and_then(|parent| parent.as_group().cloned())
            .is_some_and(|group| group.name == *text || group.path == *text),
        _ => false,
    })
}

fn ref_value(reference: &IdentityRef) -> QueryValue {
    match reference {
        IdentityRef::Id(id) => QueryValue::Id(*id),
        IdentityRef::Name(name) => QueryValue::Text(name.clone()),
    }
}

/// Evaluates a relationship-derived predicate by querying relationships
/// that place the candidate in the matching slot.
async fn related(
    view: &mut StoreView<'_>,
    partition: Uuid,
    candidate: &IdentityType,
    parameter: &IdentityParameter,
    value: &QueryValue,
) -> StorageResult<bool> {
    use IdentityParameter as P;
    use RelationshipParameter as R;

    let Some(id) = candidate.id else {
        return Ok(false);
    };
    let query = match (parameter, value) {
        (P::HasRole, value) => RelationshipQuery::of(RelationshipKind::Grant)
            .with(R::assignee(), id)
            .with(R::role(), value.clone()),
        (P::MemberOf, value) => RelationshipQuery::of(RelationshipKind::GroupMembership)
            .with(R::member(), id)
            .with(R::group(), value.clone())
            .exact_group_match(),
        (P::HasGroupRole, QueryValue::GroupRole { group, role }) => {
            RelationshipQuery::of(RelationshipKind::GroupRole)
                .with(R::member(), id)
                .with(R::group(), ref_value(group))
                .with(R::role(), ref_value(role))
        }
        (P::RoleOf, value) => RelationshipQuery::of(RelationshipKind::Grant)
            .with(R::role(), id)
            .with(R::assignee(), value.clone()),
        (P::HasMember, value) => RelationshipQuery::of(RelationshipKind::GroupMembership)
            .with(R::group(), id)
            .with(R::member(), value.clone())
            .exact_group_match(),
        _ => return Ok(false),
    };
    any_relationship(view, partition, &query).await
}
