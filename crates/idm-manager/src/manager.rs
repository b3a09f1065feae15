//! The identity manager and its construction.

use std::sync::Arc;

use idm_core::event::{Event, EventBridge, EventType, TracingEventBridge};
use idm_core::{Config, PaginationMode, StoreConfig};
use idm_model::Partition;
use idm_spi::{CredentialHandlerRegistry, IdentityContext};
use idm_storage::{Backend, MappingRegistry, StorageResult, WriteBatch};
use idm_storage_file::FileBackend;
use idm_storage_sql::{PoolConfig, SqlBackend};
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::view::{Source, StoreView};

/// The identity management engine.
///
/// Every mutating operation runs under one write lock and commits a single
/// [`WriteBatch`], cascades included. Reads run concurrently against
/// committed state.
#[derive(Debug)]
pub struct IdentityManager {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) registry: Arc<MappingRegistry>,
    pub(crate) handlers: Arc<CredentialHandlerRegistry>,
    pub(crate) events: Arc<dyn EventBridge>,
    pub(crate) default_realm_name: String,
    pub(crate) pagination: PaginationMode,
    write_lock: Mutex<()>,
    pub(crate) default_realm: RwLock<Option<Partition>>,
}

impl IdentityManager {
    /// Starts building a manager over `backend`.
    #[must_use]
    pub fn builder(backend: Arc<dyn Backend>) -> IdentityManagerBuilder {
        IdentityManagerBuilder::new(backend)
    }

    /// Returns the backend name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Returns the mapping registry.
    #[must_use]
    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    /// Returns the credential handler registry.
    #[must_use]
    pub fn handlers(&self) -> &CredentialHandlerRegistry {
        &self.handlers
    }

    /// Returns the pagination mode of identity queries.
    #[must_use]
    pub const fn pagination(&self) -> PaginationMode {
        self.pagination
    }

    /// Creates a context for a stored partition.
    ///
    /// ## Errors
    ///
    /// Returns a validation error if the partition has never been stored.
    pub fn context(&self, partition: Partition) -> StorageResult<IdentityContext> {
        IdentityContext::new(partition)
    }

    /// Creates a context for the default realm, creating the realm if needed.
    ///
    /// ## Errors
    ///
    /// Returns an error if the default realm cannot be loaded or created.
    pub async fn default_context(&self) -> StorageResult<IdentityContext> {
        IdentityContext::new(self.default_realm().await?)
    }

    /// A view for a mutation. Reads go straight to the backend; holding
    /// the write lock keeps other commits out.
    pub(crate) fn locked_view<'a>(&'a self, _lock: &MutexGuard<'a, ()>) -> StoreView<'a> {
        StoreView::new(Source::Locked(self.backend.as_ref()), &self.registry)
    }

    /// A view for a read-only operation, pinned to one committed state.
    /// It must be dropped before anything is committed.
    pub(crate) async fn snapshot_view(&self) -> StorageResult<StoreView<'_>> {
        let snapshot = self.backend.snapshot().await?;
        Ok(StoreView::new(Source::Snapshot(snapshot), &self.registry))
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    pub(crate) async fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let ops = batch.len();
        self.backend.commit(batch).await?;
        tracing::debug!(ops, backend = self.backend.name(), "batch committed");
        Ok(())
    }

    pub(crate) fn raise(
        &self,
        event_type: EventType,
        partition: Option<Uuid>,
        entity: Option<Uuid>,
        ctx: Option<&IdentityContext>,
    ) {
        let mut builder = Event::builder(event_type).caller(ctx.and_then(IdentityContext::caller));
        if let Some(partition) = partition {
            builder = builder.partition(partition);
        }
        if let Some(entity) = entity {
            builder = builder.entity(entity);
        }
        self.events.raise(builder.build());
    }
}

/// Builder for [`IdentityManager`].
#[derive(Debug)]
pub struct IdentityManagerBuilder {
    backend: Arc<dyn Backend>,
    registry: Arc<MappingRegistry>,
    handlers: Arc<CredentialHandlerRegistry>,
    events: Arc<dyn EventBridge>,
    default_realm_name: String,
    pagination: PaginationMode,
}

impl IdentityManagerBuilder {
    /// Creates a builder with the standard mappings, no credential
    /// handlers, and tracing events.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            registry: Arc::new(MappingRegistry::standard()),
            handlers: Arc::new(CredentialHandlerRegistry::new()),
            events: Arc::new(TracingEventBridge::new()),
            default_realm_name: "default".to_string(),
            pagination: PaginationMode::default(),
        }
    }

    /// Sets the mapping registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<MappingRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the credential handler registry.
    #[must_use]
    pub fn with_handlers(mut self, handlers: Arc<CredentialHandlerRegistry>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Sets the event bridge.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventBridge>) -> Self {
        self.events = events;
        self
    }

    /// Sets the name of the lazily created default realm.
    #[must_use]
    pub fn with_default_realm(mut self, name: impl Into<String>) -> Self {
        self.default_realm_name = name.into();
        self
    }

    /// Sets the pagination mode of identity queries.
    #[must_use]
    pub const fn with_pagination(mut self, pagination: PaginationMode) -> Self {
        self.pagination = pagination;
        self
    }

    /// Builds the manager.
    #[must_use]
    pub fn build(self) -> IdentityManager {
        IdentityManager {
            backend: self.backend,
            registry: self.registry,
            handlers: self.handlers,
            events: self.events,
            default_realm_name: self.default_realm_name,
            pagination: self.pagination,
            write_lock: Mutex::new(()),
            default_realm: RwLock::new(None),
        }
    }
}

/// Opens the configured backend with the standard mappings.
///
/// ## Errors
///
/// Returns an error if the backend cannot be opened.
pub async fn open_backend(
    config: &Config,
    registry: Arc<MappingRegistry>,
) -> StorageResult<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match &config.store {
        StoreConfig::File(file) => Arc::new(FileBackend::open(file).await?),
        StoreConfig::Sql(sql) => Arc::new(SqlBackend::connect(&PoolConfig::from(sql), registry).await?),
    };
    tracing::info!(backend = backend.name(), "identity store opened");
    Ok(backend)
}

/// Opens a manager from configuration.
///
/// ## Errors
///
/// Returns an error if the backend cannot be opened.
pub async fn open(config: &Config) -> StorageResult<IdentityManager> {
    open_with(config, Arc::new(CredentialHandlerRegistry::new())).await
}

/// Opens a manager from configuration with credential handlers.
///
/// ## Errors
///
/// Returns an error if the backend cannot be opened.
pub async fn open_with(
    config: &Config,
    handlers: Arc<CredentialHandlerRegistry>,
) -> StorageResult<IdentityManager> {
    let registry = Arc::new(MappingRegistry::standard());
    let backend = open_backend(config, Arc::clone(&registry)).await?;
    Ok(IdentityManager::builder(backend)
        .with_registry(registry)
        .with_handlers(handlers)
        .with_default_realm(config.default_realm.clone())
        .with_pagination(config.query.pagination)
        .build())
}
