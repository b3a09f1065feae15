//! Credential history and handler dispatch.
//!
//! History is append-only per agent and credential type. Storing a record
//! expires whichever record is current at that instant, so at most one
//! record of a type is current at any time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use idm_core::EventType;
use idm_model::{
    CredentialStorage, CredentialType, CredentialUpdate, Credentials, IdentityType,
    ValidationResult,
};
use idm_spi::{CredentialStore, IdentityContext};
use idm_storage::{Region, StorageError, StorageResult, WriteBatch};
use uuid::Uuid;

use crate::manager::IdentityManager;
use crate::view::StoreView;

/// Loads the stored agent an operation refers to.
async fn stored_agent(view: &mut StoreView<'_>, agent: &IdentityType) -> StorageResult<(Uuid, Uuid)> {
    let id = agent
        .id
        .ok_or_else(|| StorageError::validation(format!("{} has no id", agent.type_name())))?;
    let stored = view
        .identity(id)
        .await?
        .ok_or_else(|| StorageError::not_found(agent.type_name(), id))?;
    if !stored.is_agent() {
        return Err(StorageError::validation(format!(
            "credentials belong to agents, not {} {id}",
            stored.type_name()
        )));
    }
    let partition = stored
        .partition_id
        .ok_or_else(|| StorageError::mapping(format!("agent {id} has no partition")))?;
    Ok((id, partition))
}

/// Newest first: by effective date, then by revision.
fn history(
    records: &[CredentialStorage],
    owner: Uuid,
    credential_type: &CredentialType,
) -> Vec<CredentialStorage> {
    let mut history: Vec<_> = records
        .iter()
        .filter(|r| r.owner_agent_id == Some(owner) && &r.credential_type == credential_type)
        .cloned()
        .collect();
    history.sort_by(|a, b| {
        b.effective_date
            .cmp(&a.effective_date)
            .then(b.revision.cmp(&a.revision))
    });
    history
}

impl IdentityManager {
    /// Appends a credential record to an agent's history.
    ///
    /// The record currently in effect, if any, is expired now. The new
    /// record takes effect now unless it names an effective date.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the agent is not stored and a validation error
    /// if the identity is not an agent.
    pub async fn store_credential(
        &self,
        ctx: &IdentityContext,
        agent: &IdentityType,
        mut storage: CredentialStorage,
    ) -> StorageResult<CredentialStorage> {
        let guard = self.lock().await;
        let mut view = self.locked_view(&guard);
        let (agent_id, partition) = stored_agent(&mut view, agent).await?;
        let region = Region::Credentials(partition);
        let records = view.credentials(partition).await?;
        let previous = history(&records, agent_id, &storage.credential_type);

        let now = Utc::now();
        let mut batch = WriteBatch::new();
        for mut current in previous.iter().filter(|r| r.is_current_at(now)).cloned() {
            current.expiry_date = Some(now);
            batch.put(region, self.registry.dematerialize(&current)?);
        }

        storage.owner_agent_id = Some(agent_id);
        storage.effective_date.get_or_insert(now);
        storage.revision = previous.iter().map(|r| r.revision).max().unwrap_or(0) + 1;
        if records.iter().any(|r| r.id == storage.id) {
            storage.id = Uuid::now_v7();
        }
        batch.put(region, self.registry.dematerialize(&storage)?);
        self.commit(batch).await?;

        tracing::info!(
            agent = %agent_id,
            credential_type = %storage.credential_type,
            revision = storage.revision,
            "credential stored"
        );
        self.raise(EventType::CredentialStored, Some(partition), Some(agent_id), Some(ctx));
        Ok(storage)
    }

    /// Returns an agent's history for a credential type, newest first.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the agent is not stored.
    pub async fn retrieve_credentials(
        &self,
        _ctx: &IdentityContext,
        agent: &IdentityType,
        credential_type: &CredentialType,
    ) -> StorageResult<Vec<CredentialStorage>> {
        let mut view = self.snapshot_view().await?;
        let (agent_id, partition) = stored_agent(&mut view, agent).await?;
        let records = view.credentials(partition).await?;
        Ok(history(&records, agent_id, credential_type))
    }

    /// Returns the record of a type in effect now.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the agent is not stored.
    pub async fn retrieve_current_credential(
        &self,
        ctx: &IdentityContext,
        agent: &IdentityType,
        credential_type: &CredentialType,
    ) -> StorageResult<Option<CredentialStorage>> {
        let now = Utc::now();
        Ok(self
            .retrieve_credentials(ctx, agent, credential_type)
            .await?
            .into_iter()
            .find(|r| r.is_current_at(now)))
    }

    /// Purges every credential record of an agent. Returns the number of
    /// records removed.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the agent is not stored.
    pub async fn remove_credentials(
        &self,
        ctx: &IdentityContext,
        agent: &IdentityType,
    ) -> StorageResult<usize> {
        let guard = self.lock().await;
        let mut view = self.locked_view(&guard);
        let (agent_id, partition) = stored_agent(&mut view, agent).await?;

        let mut batch = WriteBatch::new();
        for record in view
            .credentials(partition)
            .await?
            .iter()
            .filter(|r| r.owner_agent_id == Some(agent_id))
        {
            batch.delete(Region::Credentials(partition), record.id);
        }
        let removed = batch.len();
        self.commit(batch).await?;

        tracing::info!(agent = %agent_id, removed, "credentials removed");
        self.raise(EventType::CredentialsRemoved, Some(partition), Some(agent_id), Some(ctx));
        Ok(removed)
    }

    /// Hands new credential material to the handler for its type.
    ///
    /// ## Errors
    ///
    /// Returns `HandlerNotFound` if no handler serves the type, and any
    /// error the handler returns.
    pub async fn update_credential(
        &self,
        ctx: &IdentityContext,
        agent: &IdentityType,
        update: &CredentialUpdate,
        effective_date: Option<DateTime<Utc>>,
        expiry_date: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let handler = self.handlers.get(&update.credential_type)?;
        handler
            .update(self, ctx, agent, update, effective_date, expiry_date)
            .await
    }

    /// Checks presented credentials with the handler for their type.
    ///
    /// ## Errors
    ///
    /// Returns `HandlerNotFound` if no handler serves the type, and any
    /// error the handler returns.
    pub async fn validate_credentials(
        &self,
        ctx: &IdentityContext,
        credentials: &Credentials,
    ) -> StorageResult<ValidationResult> {
        let handler = self.handlers.get(&credentials.credential_type)?;
        let result = handler.validate(self, ctx, credentials).await?;
        tracing::debug!(
            credential_type = %credentials.credential_type,
            status = ?result.status,
            "credentials validated"
        );
        Ok(result)
    }
}

#[async_trait]
impl CredentialStore for IdentityManager {
    async fn store_credential(
        &self,
        ctx: &IdentityContext,
        agent: &IdentityType,
        storage: CredentialStorage,
    ) -> StorageResult<CredentialStorage> {
        Self::store_credential(self, ctx, agent, storage).await
    }

    async fn retrieve_credentials(
        &self,
        ctx: &IdentityContext,
        agent: &IdentityType,
        credential_type: &CredentialType,
    ) -> StorageResult<Vec<CredentialStorage>> {
        Self::retrieve_credentials(self, ctx, agent, credential_type).await
    }

    async fn retrieve_current_credential(
        &self,
        ctx: &IdentityContext,
        agent: &IdentityType,
        credential_type: &CredentialType,
    ) -> StorageResult<Option<CredentialStorage>> {
        Self::retrieve_current_credential(self, ctx, agent, credential_type).await
    }

    async fn lookup_agent(
        &self,
        ctx: &IdentityContext,
        login_name: &str,
    ) -> StorageResult<Option<IdentityType>> {
        self.get_agent(ctx, login_name).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use idm_core::FileStoreConfig;
    use idm_model::ValidationStatus;
    use idm_spi::{CredentialHandler, CredentialHandlerRegistry};
    use idm_storage_file::FileBackend;
    use tempfile::TempDir;

    use super::*;

    /// Stores the secret as given and compares it verbatim.
    #[derive(Debug)]
    struct PlainHandler;

    #[async_trait]
    impl CredentialHandler for PlainHandler {
        fn credential_type(&self) -> CredentialType {
            CredentialType::Password
        }

        async fn validate(
            &self,
            store: &dyn CredentialStore,
            ctx: &IdentityContext,
            credentials: &Credentials,
        ) -> StorageResult<ValidationResult> {
            let Some(agent) = store.lookup_agent(ctx, &credentials.login_name).await? else {
                return Ok(ValidationResult::status(ValidationStatus::Invalid));
            };
            let agent_id = agent.id.unwrap_or_default();
            let current = store
                .retrieve_current_credential(ctx, &agent, &credentials.credential_type)
                .await?;
            let matches = current
                .and_then(|c| c.field("secret").cloned())
                .is_some_and(|v| v.values()[0].as_text() == Some(credentials.secret.as_str()));
            let status = if matches {
                ValidationStatus::Valid
            } else {
                ValidationStatus::Invalid
            };
            Ok(ValidationResult::for_agent(status, agent_id))
        }

        async fn update(
            &self,
            store: &dyn CredentialStore,
            ctx: &IdentityContext,
            agent: &IdentityType,
            update: &CredentialUpdate,
            effective_date: Option<DateTime<Utc>>,
            expiry_date: Option<DateTime<Utc>>,
        ) -> StorageResult<()> {
            let mut storage = CredentialStorage::new(update.credential_type.clone())
                .with_field("secret", update.secret.as_str());
            storage.effective_date = effective_date;
            storage.expiry_date = expiry_date;
            store.store_credential(ctx, agent, storage).await?;
            Ok(())
        }
    }

    async fn setup(dir: &TempDir) -> (IdentityManager, IdentityContext, IdentityType) {
        let backend = FileBackend::open(&FileStoreConfig::new(dir.path())).await.unwrap();
        let handlers = CredentialHandlerRegistry::new().with_handler(Arc::new(PlainHandler));
        let manager = IdentityManager::builder(Arc::new(backend))
            .with_handlers(Arc::new(handlers))
            .build();
        let ctx = manager.default_context().await.unwrap();
        let alice = manager
            .add_identity(&ctx, IdentityType::user("alice"))
            .await
            .unwrap();
        (manager, ctx, alice)
    }

    #[tokio::test]
    async fn storing_expires_the_current_record() {
        let dir = TempDir::new().unwrap();
        let (manager, ctx, alice) = setup(&dir).await;

        let first = manager
            .store_credential(&ctx, &alice, CredentialStorage::new(CredentialType::Password))
            .await
            .unwrap();
        let second = manager
            .store_credential(&ctx, &alice, CredentialStorage::new(CredentialType::Password))
            .await
            .unwrap();

        let current = manager
            .retrieve_current_credential(&ctx, &alice, &CredentialType::Password)
            .await
            .unwrap();
        assert_eq!(current.map(|c| c.id), Some(second.id));

        let history = manager
            .retrieve_credentials(&ctx, &alice, &CredentialType::Password)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);
        assert!(history[1].expiry_date.is_some_and(|e| e <= Utc::now()));
        assert_eq!(second.revision, first.revision + 1);
    }

    #[tokio::test]
    async fn future_record_is_not_current_yet() {
        let dir = TempDir::new().unwrap();
        let (manager, ctx, alice) = setup(&dir).await;
        let later = Utc::now() + Duration::hours(1);

        manager
            .store_credential(
                &ctx,
                &alice,
                CredentialStorage::new(CredentialType::Totp).with_effective_date(later),
            )
            .await
            .unwrap();

        assert!(manager
            .retrieve_current_credential(&ctx, &alice, &CredentialType::Totp)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn handler_round_trip() {
        let dir = TempDir::new().unwrap();
        let (manager, ctx, alice) = setup(&dir).await;

        manager
            .update_credential(
                &ctx,
                &alice,
                &CredentialUpdate::new(CredentialType::Password, "s3cret"),
                None,
                None,
            )
            .await
            .unwrap();

        let good = Credentials::new(CredentialType::Password, "alice", "s3cret");
        let bad = Credentials::new(CredentialType::Password, "alice", "guess");
        assert!(manager.validate_credentials(&ctx, &good).await.unwrap().is_valid());
        assert!(!manager.validate_credentials(&ctx, &bad).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn missing_handler_is_reported() {
        let dir = TempDir::new().unwrap();
        let (manager, ctx, _) = setup(&dir).await;
        let token = Credentials::new(CredentialType::Token, "alice", "t");

        assert!(matches!(
            manager.validate_credentials(&ctx, &token).await,
            Err(StorageError::HandlerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn remove_purges_all_types() {
        let dir = TempDir::new().unwrap();
        let (manager, ctx, alice) = setup(&dir).await;
        for credential_type in [CredentialType::Password, CredentialType::Totp] {
            manager
                .store_credential(&ctx, &alice, CredentialStorage::new(credential_type))
                .await
                .unwrap();
        }

        assert_eq!(manager.remove_credentials(&ctx, &alice).await.unwrap(), 2);
        assert!(manager
            .retrieve_credentials(&ctx, &alice, &CredentialType::Password)
            .await
            .unwrap()
            .is_empty());
    }
}
