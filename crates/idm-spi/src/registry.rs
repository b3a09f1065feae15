//! Registry of credential handlers.

use std::sync::Arc;

use dashmap::DashMap;
use idm_model::CredentialType;
use idm_storage::{StorageError, StorageResult};

use crate::handler::CredentialHandler;

/// Credential handlers keyed by the type they serve.
///
/// Built once at startup and handed to the engine; there is no global
/// registry.
#[derive(Debug, Default)]
pub struct CredentialHandlerRegistry {
    handlers: DashMap<CredentialType, Arc<dyn CredentialHandler>>,
}

impl CredentialHandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its credential type.
    ///
    /// Returns the handler it replaced, if any.
    pub fn register(
        &self,
        handler: Arc<dyn CredentialHandler>,
    ) -> Option<Arc<dyn CredentialHandler>> {
        let credential_type = handler.credential_type();
        tracing::debug!(credential_type = %credential_type, "registering credential handler");
        self.handlers.insert(credential_type, handler)
    }

    /// Registers a handler, builder style.
    #[must_use]
    pub fn with_handler(self, handler: Arc<dyn CredentialHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Returns the handler for a credential type.
    ///
    /// ## Errors
    ///
    /// Returns `HandlerNotFound` if nothing is registered for the type.
    pub fn get(&self, credential_type: &CredentialType) -> StorageResult<Arc<dyn CredentialHandler>> {
        self.handlers
            .get(credential_type)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StorageError::HandlerNotFound(credential_type.to_string()))
    }

    /// Checks if a handler is registered for the type.
    #[must_use]
    pub fn has_handler(&self, credential_type: &CredentialType) -> bool {
        self.handlers.contains_key(credential_type)
    }

    /// Lists registered credential types, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<CredentialType> {
        let mut types: Vec<_> = self.handlers.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Checks if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
