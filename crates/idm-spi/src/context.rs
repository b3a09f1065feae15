//! Ambient context for engine operations.

use std::collections::HashMap;

use idm_model::Partition;
use idm_storage::{StorageError, StorageResult};
use parking_lot::RwLock;
use uuid::Uuid;

/// The partition and caller an operation runs on behalf of.
///
/// Identity, query, and credential operations read their partition from the
/// context instead of taking it as an argument. Each unit of work typically
/// gets its own context.
#[derive(Debug)]
pub struct IdentityContext {
    /// Unique context identifier.
    id: Uuid,

    /// Active partition, always stored.
    partition: Partition,

    /// Caller recorded on raised events.
    caller: Option<String>,

    /// Context attributes.
    attributes: RwLock<HashMap<String, String>>,
}

impl IdentityContext {
    /// Creates a context for a stored partition.
    ///
    /// ## Errors
    ///
    /// Returns a validation error if the partition has never been stored.
    pub fn new(partition: Partition) -> StorageResult<Self> {
        if partition.id.is_none() {
            return Err(StorageError::validation(format!(
                "{} '{}' has not been created",
                partition.kind.as_str(),
                partition.name
            )));
        }
        Ok(Self {
            id: Uuid::now_v7(),
            partition,
            caller: None,
            attributes: RwLock::new(HashMap::new()),
        })
    }

    /// Records the caller.
    #[must_use]
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// Returns the context ID.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the active partition.
    #[must_use]
    pub const fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Returns the active partition's id.
    #[must_use]
    pub fn partition_id(&self) -> Uuid {
        // Checked in `new`.
        self.partition.id.unwrap_or_default()
    }

    /// Returns the caller, if known.
    #[must_use]
    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    /// Sets a context attribute.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.write().insert(key.into(), value.into());
    }

    /// Gets a context attribute.
    #[must_use]
    pub fn get_attribute(&self, key: &str) -> Option<String> {
        self.attributes.read().get(key).cloned()
    }

    /// Removes a context attribute.
    pub fn remove_attribute(&self, key: &str) -> Option<String> {
        self.attributes.write().remove(key)
    }
}
