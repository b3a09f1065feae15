//! Identity queries.

use idm_model::IdentityClass;
use serde::{Deserialize, Serialize};

use super::parameter::{IdentityParameter, QueryValue};
use super::sort::{Page, Sort};
use crate::error::{StorageError, StorageResult};

/// A conjunctive identity query.
///
/// Every `(parameter, values)` pair must hold, and every value of a pair
/// must match on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityQuery {
    /// Class of identities returned; `Any` fans out over every variant.
    pub class: IdentityClass,
    /// Predicates in insertion order.
    pub parameters: Vec<(IdentityParameter, Vec<QueryValue>)>,
    /// Ordering.
    pub sort: Option<Sort>,
    /// Result window.
    pub page: Option<Page>,
}

impl IdentityQuery {
    /// Starts a query over `class`.
    #[must_use]
    pub const fn new(class: IdentityClass) -> Self {
        Self {
            class,
            parameters: Vec::new(),
            sort: None,
            page: None,
        }
    }

    /// Query over agents and users.
    #[must_use]
    pub const fn agents() -> Self {
        Self::new(IdentityClass::Agent)
    }

    /// Query over users.
    #[must_use]
    pub const fn users() -> Self {
        Self::new(IdentityClass::User)
    }

    /// Query over groups.
    #[must_use]
    pub const fn groups() -> Self {
        Self::new(IdentityClass::Group)
    }

    /// Query over roles.
    #[must_use]
    pub const fn roles() -> Self {
        Self::new(IdentityClass::Role)
    }

    /// Query over every identity variant.
    #[must_use]
    pub const fn any() -> Self {
        Self::new(IdentityClass::Any)
    }

    /// Adds one value to a parameter.
    #[must_use]
    pub fn with(self, parameter: IdentityParameter, value: impl Into<QueryValue>) -> Self {
        self.with_values(parameter, [value.into()])
    }

    /// Adds values to a parameter, merging with values already set for it.
    #[must_use]
    pub fn with_values(
        mut self,
        parameter: IdentityParameter,
        values: impl IntoIterator<Item = QueryValue>,
    ) -> Self {
        let values: Vec<QueryValue> = values.into_iter().collect();
        match self.parameters.iter_mut().find(|(p, _)| *p == parameter) {
            Some((_, existing)) => existing.extend(values),
            None => self.parameters.push((parameter, values)),
        }
        self
    }

    /// Sets the ordering.
    #[must_use]
    pub fn sorted_by(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets the result window.
    #[must_use]
    pub const fn with_page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    /// Returns the values of a parameter.
    #[must_use]
    pub fn values(&self, parameter: &IdentityParameter) -> Option<&[QueryValue]> {
        self.parameters
            .iter()
            .find(|(p, _)| p == parameter)
            .map(|(_, values)| values.as_slice())
    }

    /// Returns the predicates in evaluation order.
    #[must_use]
    pub fn ordered_parameters(&self) -> Vec<&(IdentityParameter, Vec<QueryValue>)> {
        let mut ordered: Vec<_> = self.parameters.iter().collect();
        ordered.sort_by_key(|(p, _)| p.stage());
        ordered
    }

    /// Checks every parameter and sort key against the query class.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedQueryParameter` for a parameter that does not
    /// apply to the class, has no values, or has a value of the wrong type,
    /// and `UnsupportedSortKey` for an unsortable key.
    pub fn validate(&self) -> StorageResult<()> {
        for (parameter, values) in &self.parameters {
            if !parameter.applies_to(self.class) {
                return Err(StorageError::unsupported_parameter(
                    parameter.name(),
                    format!("not applicable to {}", self.class.as_str()),
                ));
            }
            if values.is_empty() {
                return Err(StorageError::unsupported_parameter(
                    parameter.name(),
                    "no values supplied",
                ));
            }
            if let Some(value) = values.iter().find(|v| !parameter.accepts(v)) {
                return Err(StorageError::unsupported_parameter(
                    parameter.name(),
                    format!("cannot compare against {value:?}"),
                ));
            }
        }
        if let Some(sort) = &self.sort {
            for key in &sort.keys {
                if !key.is_sortable() || !key.applies_to(self.class) {
                    return Err(StorageError::UnsupportedSortKey(key.name().to_string()));
                }
            }
        }
        Ok(())
    }
}
