//! Model validation errors.

use thiserror::Error;

/// Errors raised when a domain value violates its own invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A required field is absent or blank.
    #[error("{entity} is missing required field '{field}'")]
    MissingField {
        /// Kind of entity being validated.
        entity: &'static str,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A field holds a value outside its domain.
    #[error("invalid {entity}: {reason}")]
    Invalid {
        /// Kind of entity being validated.
        entity: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

impl ModelError {
    /// Creates a missing field error.
    #[must_use]
    pub const fn missing(entity: &'static str, field: &'static str) -> Self {
        Self::MissingField { entity, field }
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            entity,
            reason: reason.into(),
        }
    }
}

/// Result type for model validation.
pub type ModelResult<T> = Result<T, ModelError>;
