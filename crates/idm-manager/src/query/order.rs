//! Result ordering.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use idm_model::IdentityType;
use idm_storage::{IdentityParameter, Sort};
use uuid::Uuid;

/// A comparable sort key value. Missing values sort first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue<'a> {
    Flag(bool),
    Time(DateTime<Utc>),
    Text(&'a str),
    Id(Uuid),
}

fn sort_value<'a>(identity: &'a IdentityType, key: &IdentityParameter) -> Option<SortValue<'a>> {
    use IdentityParameter as P;
    match key {
        P::Id => identity.id.map(SortValue::Id),
        P::Enabled => Some(SortValue::Flag(identity.enabled)),
        P::CreatedDate => Some(SortValue::Time(identity.created_date)),
        P::ExpiryDate => identity.expiration_date.map(SortValue::Time),
        P::LoginName => identity.login_name().map(SortValue::Text),
        P::FirstName => identity
            .as_user()
            .and_then(|u| u.first_name.as_deref())
            .map(SortValue::Text),
        P::LastName => identity
            .as_user()
            .and_then(|u| u.last_name.as_deref())
            .map(SortValue::Text),
        P::Email => identity
            .as_user()
            .and_then(|u| u.email.as_deref())
            .map(SortValue::Text),
        P::Name => identity.name().map(SortValue::Text),
        P::Path => identity.as_group().map(|g| SortValue::Text(&g.path)),
        _ => None,
    }
}

fn compare(a: &IdentityType, b: &IdentityType, keys: &[IdentityParameter]) -> Ordering {
    keys.iter()
        .map(|key| sort_value(a, key).cmp(&sort_value(b, key)))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Sorts `identities` in place. The sort is stable.
pub(crate) fn sort_identities(identities: &mut [IdentityType], sort: &Sort, keys: &[IdentityParameter]) {
    identities.sort_by(|a, b| {
        let ordering = compare(a, b, keys);
        if sort.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}
