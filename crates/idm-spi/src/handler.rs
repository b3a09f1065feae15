//! Credential handler extension point.
//!
//! The engine stores and selects credential records but never interprets
//! their material. A [`CredentialHandler`] does that for one credential
//! type, reading and writing history only through a [`CredentialStore`].

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use idm_model::{
    CredentialStorage, CredentialType, CredentialUpdate, Credentials, IdentityType,
    ValidationResult,
};
use idm_storage::StorageResult;

use crate::context::IdentityContext;

/// Credential history operations available to handlers.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Appends a record to the agent's history, expiring the current one.
    async fn store_credential(
        &self,
        ctx: &IdentityContext,
        agent: &IdentityType,
        storage: CredentialStorage,
    ) -> StorageResult<CredentialStorage>;

    /// Returns the agent's full history for a type, newest first.
    async fn retrieve_credentials(
        &self,
        ctx: &IdentityContext,
        agent: &IdentityType,
        credential_type: &CredentialType,
    ) -> StorageResult<Vec<CredentialStorage>>;

    /// Returns the record whose validity window contains now.
    async fn retrieve_current_credential(
        &self,
        ctx: &IdentityContext,
        agent: &IdentityType,
        credential_type: &CredentialType,
    ) -> StorageResult<Option<CredentialStorage>>;

    /// Finds the agent or user with this login name in the active realm.
    async fn lookup_agent(
        &self,
        ctx: &IdentityContext,
        login_name: &str,
    ) -> StorageResult<Option<IdentityType>>;
}

/// Validates and updates one credential type.
#[async_trait]
pub trait CredentialHandler: Send + Sync + Debug {
    /// Credential type this handler serves.
    fn credential_type(&self) -> CredentialType;

    /// Checks presented credentials against the stored history.
    async fn validate(
        &self,
        store: &dyn CredentialStore,
        ctx: &IdentityContext,
        credentials: &Credentials,
    ) -> StorageResult<ValidationResult>;

    /// Stores new credential material for an agent.
    async fn update(
        &self,
        store: &dyn CredentialStore,
        ctx: &IdentityContext,
        agent: &IdentityType,
        update: &CredentialUpdate,
        effective_date: Option<DateTime<Utc>>,
        expiry_date: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;
}
