//! Engine configuration.
//!
//! Configuration is read from TOML. Every field has a default, so an empty
//! document yields a file-backed engine under the system temp directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure for the identity engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name of the realm created lazily when none is supplied.
    #[serde(default = "default_realm_name")]
    pub default_realm: String,

    /// Physical storage configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Query engine configuration.
    #[serde(default)]
    pub query: QueryConfig,
}

fn default_realm_name() -> String {
    "default".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_realm: default_realm_name(),
            store: StoreConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

impl Config {
    /// Parses configuration from a TOML document.
    ///
    /// ## Errors
    ///
    /// Returns `Error::Config` if the document is malformed or invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the default configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file absent, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Saves configuration to a TOML file, creating parent directories.
    ///
    /// ## Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks cross-field constraints serde cannot express.
    ///
    /// ## Errors
    ///
    /// Returns `Error::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.default_realm.trim().is_empty() {
            return Err(Error::config("default_realm must not be empty"));
        }
        if let StoreConfig::Sql(sql) = &self.store {
            if sql.url.is_empty() {
                return Err(Error::config("store.url must not be empty"));
            }
            if sql.max_connections == 0 || sql.min_connections > sql.max_connections {
                return Err(Error::config(format!(
                    "invalid pool bounds: min {} max {}",
                    sql.min_connections, sql.max_connections
                )));
            }
        }
        Ok(())
    }
}

/// Physical storage selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Flat-file storage.
    File(FileStoreConfig),
    /// Relational storage.
    Sql(SqlStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File(FileStoreConfig::default())
    }
}

/// File backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreConfig {
    /// Directory holding one sub-directory per partition.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Wipe the working directory when the store opens.
    #[serde(default)]
    pub always_create_files: bool,
}

fn default_working_dir() -> PathBuf {
    std::env::temp_dir().join("pl-idm")
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            always_create_files: false,
        }
    }
}

impl FileStoreConfig {
    /// Creates a file configuration rooted at `working_dir`.
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            always_create_files: false,
        }
    }

    /// Sets whether existing data is wiped on open.
    #[must_use]
    pub const fn always_create_files(mut self, enabled: bool) -> Self {
        self.always_create_files = enabled;
        self
    }
}

/// Relational backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlStoreConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_min_connections() -> u32 {
    1
}

const fn default_connect_timeout_secs() -> u64 {
    30
}

impl SqlStoreConfig {
    /// Creates a relational configuration for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    /// Returns the connect timeout as a duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Query engine configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    /// What the pagination offset counts.
    #[serde(default)]
    pub pagination: PaginationMode,
}

/// Basis of the pagination offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationMode {
    /// The offset skips candidates that passed every predicate.
    #[default]
    FilteredResults,
    /// The offset skips candidates that matched type and id only, before
    /// the remaining predicates run. Pages may come back short.
    CandidateCount,
}
