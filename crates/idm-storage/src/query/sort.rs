//! Result ordering and paging.

use idm_model::IdentityClass;
use serde::{Deserialize, Serialize};

use super::parameter::IdentityParameter;

/// Ordering of query results.
///
/// Keys are compared in order until one differs. An empty key list means
/// the class's default keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    /// Sort keys, most significant first.
    pub keys: Vec<IdentityParameter>,
    /// Reverses the order.
    pub descending: bool,
}

impl Sort {
    /// Ascending order over `keys`.
    #[must_use]
    pub fn ascending(keys: impl IntoIterator<Item = IdentityParameter>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            descending: false,
        }
    }

    /// Descending order over `keys`.
    #[must_use]
    pub fn descending(keys: impl IntoIterator<Item = IdentityParameter>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            descending: true,
        }
    }

    /// Returns the keys to sort `class` by.
    #[must_use]
    pub fn effective_keys(&self, class: IdentityClass) -> Vec<IdentityParameter> {
        if self.keys.is_empty() {
            default_keys(class)
        } else {
            self.keys.clone()
        }
    }
}

/// Default sort keys per class.
#[must_use]
pub fn default_keys(class: IdentityClass) -> Vec<IdentityParameter> {
    match class {
        IdentityClass::Agent | IdentityClass::User => vec![IdentityParameter::LoginName],
        IdentityClass::Group | IdentityClass::Role => vec![IdentityParameter::Name],
        IdentityClass::Any => vec![IdentityParameter::Id],
    }
}

/// Result window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Number of results skipped.
    pub offset: usize,
    /// Maximum number of results; `None` is unbounded.
    pub limit: Option<usize>,
}

impl Page {
    /// Creates a window.
    #[must_use]
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    /// First `limit` results.
    #[must_use]
    pub const fn first(limit: usize) -> Self {
        Self::new(0, limit)
    }

    /// Applies the window to a result list.
    #[must_use]
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}
