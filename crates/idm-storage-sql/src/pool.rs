//! `SQLite` connection pool.

use std::str::FromStr;
use std::time::Duration;

use idm_core::SqlStoreConfig;
use idm_storage::StorageError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Pool settings for a store database.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// `SQLite` URL, e.g. `sqlite://idm.db` or `sqlite::memory:`.
    pub url: String,
    /// Upper bound on open connections to a file database.
    pub max_connections: u32,
    /// Connections kept open to a file database.
    pub min_connections: u32,
    /// How long to wait for a pooled connection or a database lock.
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    /// Settings for `url` with the store defaults.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::from(&SqlStoreConfig::new(url))
    }

    /// Returns whether the URL names a private in-memory database.
    ///
    /// Each connection to such a URL opens its own empty database.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

impl From<&SqlStoreConfig> for PoolConfig {
    fn from(config: &SqlStoreConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            acquire_timeout: config.connect_timeout(),
        }
    }
}

/// Opens the pool, creating a missing database file.
///
/// In-memory databases are pinned to one connection that never expires,
/// since a second connection would see a different, empty database.
///
/// # Errors
///
/// Returns `StorageError::Connection` if the URL is invalid or the database
/// cannot be opened.
pub async fn create_pool(config: &PoolConfig) -> Result<SqlitePool, StorageError> {
    let connect = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| StorageError::Connection(format!("{}: {e}", config.url)))?
        .create_if_missing(true)
        .busy_timeout(config.acquire_timeout);

    let options = SqlitePoolOptions::new().acquire_timeout(config.acquire_timeout);
    let options = if config.is_in_memory() {
        options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        options
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
    };
    let pool = options
        .connect_with(connect)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
    tracing::debug!(url = %config.url, in_memory = config.is_in_memory(), "sqlite pool ready");
    Ok(pool)
}
