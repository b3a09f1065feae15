//! Storage error types.

use idm_model::ModelError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during engine and storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A required field is missing or a value is out of its domain.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity not found.
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity (e.g., "User", "Partition").
        entity_type: &'static str,
        /// Entity ID.
        id: Uuid,
    },

    /// Entity not found by name.
    #[error("Entity not found: {entity_type} with name '{name}'")]
    NotFoundByName {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity name.
        name: String,
    },

    /// Uniqueness violation within scope.
    #[error("{entity_type} already exists: {field} '{value}'")]
    AlreadyExists {
        /// Type of entity.
        entity_type: &'static str,
        /// Field that caused the conflict.
        field: &'static str,
        /// Conflicting value.
        value: String,
    },

    /// A same-typed partition with this name exists.
    #[error("Duplicate partition: {partition_type} '{name}' already exists")]
    DuplicatePartition {
        /// Realm or Tier.
        partition_type: &'static str,
        /// Partition name.
        name: String,
    },

    /// The partition still owns identities.
    #[error("Partition '{name}' still owns identities")]
    PartitionNotEmpty {
        /// Partition name.
        name: String,
    },

    /// No mapping exists for the identity type.
    #[error("Unsupported identity type: {0}")]
    UnsupportedIdentityType(String),

    /// No mapping exists for the attributed type.
    #[error("Unsupported attributed type: {0}")]
    UnsupportedAttributedType(String),

    /// The parameter cannot be used with this query.
    #[error("Unsupported query parameter {parameter}: {reason}")]
    UnsupportedQueryParameter {
        /// Parameter name.
        parameter: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The parameter cannot be used as a sort key.
    #[error("Unsupported sort key: {0}")]
    UnsupportedSortKey(String),

    /// Removal by members matched more than one relationship.
    #[error("Ambiguous relationship: {count} stored {kind} relationships match")]
    AmbiguousRelationship {
        /// Relationship type.
        kind: &'static str,
        /// Number of matches.
        count: usize,
    },

    /// No credential handler is registered for the credential type.
    #[error("No credential handler registered for '{0}'")]
    HandlerNotFound(String),

    /// Mapping configuration or a physical record does not fit its mapping.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Filesystem read or flush failure.
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(String),

    /// Database query error.
    #[error("Database query error: {0}")]
    Query(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error.
    #[error("Internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Creates a not found error for an entity.
    #[must_use]
    pub const fn not_found(entity_type: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity_type, id }
    }

    /// Creates a not found by name error.
    #[must_use]
    pub fn not_found_by_name(entity_type: &'static str, name: impl Into<String>) -> Self {
        Self::NotFoundByName {
            entity_type,
            name: name.into(),
        }
    }

    /// Creates an already exists error.
    #[must_use]
    pub fn already_exists(
        entity_type: &'static str,
        field: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::AlreadyExists {
            entity_type,
            field,
            value: value.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an unsupported query parameter error.
    #[must_use]
    pub fn unsupported_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedQueryParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Creates a mapping error.
    #[must_use]
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping(message.into())
    }

    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NotFoundByName { .. })
    }

    /// Checks if this is a uniqueness violation.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. } | Self::DuplicatePartition { .. })
    }

    /// Checks if this is a backend read or flush failure.
    #[must_use]
    pub const fn is_storage_io(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Connection(_)
                | Self::Query(_)
                | Self::Transaction(_)
                | Self::Serialization(_)
                | Self::Internal(_)
        )
    }
}

impl From<ModelError> for StorageError {
    fn from(err: ModelError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
