//! Physical field values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Storage type of a physical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Boolean.
    Bool,
    /// 64-bit integer.
    Integer,
    /// Text.
    Text,
    /// UTC timestamp.
    Timestamp,
    /// Entity identifier.
    Id,
    /// Structured JSON document.
    Json,
}

/// A value held by a physical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Integer(i64),
    /// Text.
    Text(String),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// Entity identifier.
    Id(Uuid),
    /// Structured JSON document.
    Json(serde_json::Value),
}

impl FieldValue {
    /// Returns the kind of a non-null value.
    #[must_use]
    pub const fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(FieldKind::Bool),
            Self::Integer(_) => Some(FieldKind::Integer),
            Self::Text(_) => Some(FieldKind::Text),
            Self::Timestamp(_) => Some(FieldKind::Timestamp),
            Self::Id(_) => Some(FieldKind::Id),
            Self::Json(_) => Some(FieldKind::Json),
        }
    }

    /// Returns whether the value is null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns whether the value may be stored in a field of `kind`.
    #[must_use]
    pub fn fits(&self, kind: FieldKind, nullable: bool) -> bool {
        match self.kind() {
            None => nullable,
            Some(actual) => actual == kind,
        }
    }

    /// Wraps an optional text value.
    #[must_use]
    pub fn opt_text(value: Option<&str>) -> Self {
        value.map_or(Self::Null, |v| Self::Text(v.to_string()))
    }

    /// Wraps an optional identifier.
    #[must_use]
    pub fn opt_id(value: Option<Uuid>) -> Self {
        value.map_or(Self::Null, Self::Id)
    }

    /// Wraps an optional timestamp.
    #[must_use]
    pub fn opt_timestamp(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Self::Null, Self::Timestamp)
    }

    /// Returns the identifier payload.
    #[must_use]
    pub const fn as_id(&self) -> Option<Uuid> {
        match self {
            Self::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the text payload.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_fits_only_nullable_fields() {
        assert!(FieldValue::Null.fits(FieldKind::Text, true));
        assert!(!FieldValue::Null.fits(FieldKind::Text, false));
        assert!(FieldValue::Bool(true).fits(FieldKind::Bool, false));
        assert!(!FieldValue::Bool(true).fits(FieldKind::Integer, true));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(FieldValue::Integer(7)).unwrap();
        assert_eq!(json["kind"], "integer");
        assert_eq!(json["value"], 7);

        let back: FieldValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, FieldValue::Integer(7));
    }

    #[test]
    fn optional_constructors() {
        assert!(FieldValue::opt_text(None).is_null());
        assert_eq!(FieldValue::opt_text(Some("a")).as_text(), Some("a"));
        let id = Uuid::now_v7();
        assert_eq!(FieldValue::opt_id(Some(id)).as_id(), Some(id));
    }
}
