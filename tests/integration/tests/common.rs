//! Common test utilities and fixtures.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use idm_core::event::InMemoryEventBridge;
use idm_core::{FileStoreConfig, PaginationMode};
use idm_manager::{IdentityManager, IdentityManagerBuilder};
use idm_model::{
    CredentialStorage, CredentialType, CredentialUpdate, Credentials, IdentityType,
    ValidationResult, ValidationStatus,
};
use idm_spi::{CredentialHandler, CredentialHandlerRegistry, CredentialStore, IdentityContext};
use idm_storage::{Backend, MappingRegistry, StorageResult};
use idm_storage_file::FileBackend;
use idm_storage_sql::{PoolConfig, SqlBackend};
use tempfile::TempDir;

/// Backends every scenario runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    /// JSON files in a temporary directory.
    File,
    /// Private in-memory SQLite database.
    Sql,
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Sql => f.write_str("sql"),
        }
    }
}

pub const STORES: [Store; 2] = [Store::File, Store::Sql];

/// An engine over a fresh backend, with its default realm context.
pub struct TestEnv {
    pub store: Store,
    pub manager: IdentityManager,
    pub backend: Arc<dyn Backend>,
    pub ctx: IdentityContext,
    pub events: Arc<InMemoryEventBridge>,
    _dir: Option<TempDir>,
}

impl TestEnv {
    /// Opens an engine with the standard mappings and default settings.
    pub async fn new(store: Store) -> anyhow::Result<Self> {
        Self::configured(store, Arc::new(MappingRegistry::standard()), |b| b).await
    }

    /// Opens an engine using the given pagination mode.
    pub async fn with_pagination(store: Store, mode: PaginationMode) -> anyhow::Result<Self> {
        Self::configured(store, Arc::new(MappingRegistry::standard()), |b| {
            b.with_pagination(mode)
        })
        .await
    }

    /// Opens an engine with a custom registry and builder settings.
    pub async fn configured(
        store: Store,
        registry: Arc<MappingRegistry>,
        configure: impl FnOnce(IdentityManagerBuilder) -> IdentityManagerBuilder,
    ) -> anyhow::Result<Self> {
        init_tracing();

        let (backend, dir): (Arc<dyn Backend>, Option<TempDir>) = match store {
            Store::File => {
                let dir = TempDir::new()?;
                let backend = FileBackend::open(&FileStoreConfig::new(dir.path())).await?;
                (Arc::new(backend), Some(dir))
            }
            Store::Sql => {
                let config = PoolConfig::new("sqlite::memory:");
                let backend = SqlBackend::connect(&config, Arc::clone(&registry)).await?;
                (Arc::new(backend), None)
            }
        };

        let events = Arc::new(InMemoryEventBridge::new());
        let handlers = CredentialHandlerRegistry::new().with_handler(Arc::new(PlainTextHandler));
        let builder = IdentityManager::builder(Arc::clone(&backend))
            .with_registry(registry)
            .with_handlers(Arc::new(handlers))
            .with_events(events.clone());
        let manager = configure(builder).build();
        let ctx = manager.default_context().await?;

        Ok(Self {
            store,
            manager,
            backend,
            ctx,
            events,
            _dir: dir,
        })
    }

    /// Adds an identity to the default realm.
    pub async fn add(&self, identity: IdentityType) -> anyhow::Result<IdentityType> {
        Ok(self.manager.add_identity(&self.ctx, identity).await?)
    }
}

/// Installs a test subscriber once per binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("idm_manager=debug,idm_storage_sql=warn,sqlx=warn")
        .with_test_writer()
        .try_init();
}

/// Login names of `identities`, in order.
pub fn logins(identities: &[IdentityType]) -> Vec<&str> {
    identities.iter().filter_map(IdentityType::login_name).collect()
}

/// Names of `identities`, in order.
pub fn names(identities: &[IdentityType]) -> Vec<&str> {
    identities.iter().filter_map(IdentityType::name).collect()
}

/// Password handler that stores the secret as given.
#[derive(Debug)]
pub struct PlainTextHandler;

const SECRET_FIELD: &str = "secret";

#[async_trait]
impl CredentialHandler for PlainTextHandler {
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
        if !agent.enabled {
            return Ok(ValidationResult::for_agent(ValidationStatus::AccountDisabled, agent_id));
        }
        let Some(current) = store
            .retrieve_current_credential(ctx, &agent, &credentials.credential_type)
            .await?
        else {
            return Ok(ValidationResult::for_agent(ValidationStatus::Invalid, agent_id));
        };
        let stored = current
            .field(SECRET_FIELD)
            .and_then(|v| v.values().first())
            .and_then(|s| s.as_text());
        let status = if stored == Some(credentials.secret.as_str()) {
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
            .with_field(SECRET_FIELD, update.secret.as_str());
        storage.effective_date = effective_date;
        storage.expiry_date = expiry_date;
        store.store_credential(ctx, agent, storage).await?;
        Ok(())
    }
}
