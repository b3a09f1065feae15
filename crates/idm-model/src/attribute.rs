//! Attribute model.
//!
//! Any attributed entity carries a bag of named values. A value is a single
//! scalar or a homogeneous array of scalars. Setting a name replaces every
//! value previously stored under it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    /// UTF-8 text.
    Text(String),
    /// Signed integer.
    Integer(i64),
    /// Boolean flag.
    Boolean(bool),
    /// Point in time.
    Timestamp(DateTime<Utc>),
}

impl Scalar {
    /// Returns the name of the scalar's type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
            Self::Timestamp(_) => "timestamp",
        }
    }

    /// Returns the text payload, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// A stored attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeValue {
    /// One scalar.
    Single(Scalar),
    /// A homogeneous array; marks the attribute multi-valued.
    Multi(Vec<Scalar>),
}

impl AttributeValue {
    /// Creates a single-valued attribute.
    #[must_use]
    pub fn single(value: impl Into<Scalar>) -> Self {
        Self::Single(value.into())
    }

    /// Creates a multi-valued attribute.
    #[must_use]
    pub fn multi<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        Self::Multi(values.into_iter().map(Into::into).collect())
    }

    /// Returns the stored scalars.
    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Multi(values) => values,
        }
    }

    /// Returns whether the attribute was stored as an array.
    #[must_use]
    pub const fn is_multi_valued(&self) -> bool {
        matches!(self, Self::Multi(_))
    }

    /// Checks that every element of an array shares one scalar type.
    ///
    /// ## Errors
    ///
    /// Returns `ModelError::Invalid` for a mixed-type array.
    pub fn validate(&self) -> ModelResult<()> {
        let Self::Multi(values) = self else {
            return Ok(());
        };
        if let Some(first) = values.first() {
            let expected = first.type_name();
            if let Some(other) = values.iter().find(|v| v.type_name() != expected) {
                return Err(ModelError::invalid(
                    "attribute",
                    format!(
                        "array mixes {expected} and {} values",
                        other.type_name()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Returns whether every queried value is present among the stored ones.
    ///
    /// Extra stored values are tolerated.
    #[must_use]
    pub fn contains_all(&self, queried: &[Scalar]) -> bool {
        let stored = self.values();
        queried.iter().all(|q| stored.contains(q))
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::single(value)
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::single(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::single(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::single(value)
    }
}

/// Named attribute bag, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute, replacing any prior values under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Gets an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    /// Removes an attribute, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.0.remove(name)
    }

    /// Removes every attribute.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterates attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validates every value in the bag.
    ///
    /// ## Errors
    ///
    /// Returns the first value error, or an error for a blank name.
    pub fn validate(&self) -> ModelResult<()> {
        for (name, value) in &self.0 {
            if name.trim().is_empty() {
                return Err(ModelError::missing("attribute", "name"));
            }
            value.validate()?;
        }
        Ok(())
    }
}

impl FromIterator<(String, AttributeValue)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
