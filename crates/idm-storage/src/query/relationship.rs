//! Relationship queries.

use std::fmt;

use idm_model::{descriptor, RelationshipKind};
use serde::{Deserialize, Serialize};

use super::parameter::QueryValue;
use super::sort::Page;
use crate::error::{StorageError, StorageResult};

/// A predicate a relationship query can filter on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipParameter {
    /// The identity occupies any member slot.
    Identity,
    /// The identity occupies the slot with this descriptor.
    Member(String),
    /// Generic relationship attribute, by name.
    Attribute(String),
}

const DESCRIPTORS: &[&str] = &[
    descriptor::ASSIGNEE,
    descriptor::ROLE,
    descriptor::MEMBER,
    descriptor::GROUP,
];

impl RelationshipParameter {
    /// `ASSIGNEE` slot.
    #[must_use]
    pub fn assignee() -> Self {
        Self::Member(descriptor::ASSIGNEE.to_string())
    }

    /// `ROLE` slot.
    #[must_use]
    pub fn role() -> Self {
        Self::Member(descriptor::ROLE.to_string())
    }

    /// `MEMBER` slot.
    #[must_use]
    pub fn member() -> Self {
        Self::Member(descriptor::MEMBER.to_string())
    }

    /// `GROUP` slot.
    #[must_use]
    pub fn group() -> Self {
        Self::Member(descriptor::GROUP.to_string())
    }

    /// Creates an attribute parameter.
    #[must_use]
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute(name.into())
    }

    /// Parses a vocabulary name: `IDENTITY`, an upper-case descriptor, or
    /// an attribute name.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if name == "IDENTITY" {
            return Self::Identity;
        }
        DESCRIPTORS
            .iter()
            .find(|d| d.to_ascii_uppercase() == name)
            .map_or_else(|| Self::Attribute(name.to_string()), |d| Self::Member((*d).to_string()))
    }

    /// Returns the parameter's vocabulary name.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Identity => "IDENTITY".to_string(),
            Self::Member(descriptor) => descriptor.to_ascii_uppercase(),
            Self::Attribute(name) => name.clone(),
        }
    }
}

impl fmt::Display for RelationshipParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A conjunctive relationship query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipQuery {
    /// Relationship type; `None` matches every type.
    pub kind: Option<RelationshipKind>,
    /// Predicates in insertion order.
    pub parameters: Vec<(RelationshipParameter, Vec<QueryValue>)>,
    /// Disables matching a stored group against descendants of it.
    pub exact_group_match: bool,
    /// Result window.
    pub page: Option<Page>,
}

impl RelationshipQuery {
    /// Starts a query over one relationship type.
    #[must_use]
    pub fn of(kind: RelationshipKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Starts a query over every relationship type.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds one value to a parameter.
    #[must_use]
    pub fn with(self, parameter: RelationshipParameter, value: impl Into<QueryValue>) -> Self {
        self.with_values(parameter, [value.into()])
    }

    /// Adds values to a parameter, merging with values already set for it.
    #[must_use]
    pub fn with_values(
        mut self,
        parameter: RelationshipParameter,
        values: impl IntoIterator<Item = QueryValue>,
    ) -> Self {
        let values: Vec<QueryValue> = values.into_iter().collect();
        match self.parameters.iter_mut().find(|(p, _)| *p == parameter) {
            Some((_, existing)) => existing.extend(values),
            None => self.parameters.push((parameter, values)),
        }
        self
    }

    /// Requires stored groups to equal the queried group.
    #[must_use]
    pub const fn exact_group_match(mut self) -> Self {
        self.exact_group_match = true;
        self
    }

    /// Sets the result window.
    #[must_use]
    pub const fn with_page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    /// Returns the relationship types the query covers.
    #[must_use]
    pub fn kinds(&self) -> Vec<RelationshipKind> {
        self.kind.map_or_else(|| RelationshipKind::ALL.to_vec(), |k| vec![k])
    }

    /// Checks descriptors and value types.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedQueryParameter` for a descriptor no covered type
    /// declares, a parameter without values, or a value of the wrong type.
    pub fn validate(&self) -> StorageResult<()> {
        for (parameter, values) in &self.parameters {
            let name = parameter.name();
            if values.is_empty() {
                return Err(StorageError::unsupported_parameter(name, "no values supplied"));
            }
            match parameter {
                RelationshipParameter::Identity | RelationshipParameter::Member(_) => {
                    if let RelationshipParameter::Member(descriptor) = parameter {
                        if !self.kinds().iter().any(|k| k.slot(descriptor).is_some()) {
                            return Err(StorageError::unsupported_parameter(
                                name,
                                "no queried relationship type has this member slot",
                            ));
                        }
                    }
                    if values.iter().any(|v| v.as_identity_ref().is_none()) {
                        return Err(StorageError::unsupported_parameter(
                            name,
                            "expected identity ids or names",
                        ));
                    }
                }
                RelationshipParameter::Attribute(_) => {
                    if values
                        .iter()
                        .any(|v| matches!(v, QueryValue::Id(_) | QueryValue::GroupRole { .. }))
                    {
                        return Err(StorageError::unsupported_parameter(
                            name,
                            "expected scalar attribute values",
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
