//! Node configuration.
//!
//! Values come from an optional YAML or TOML file, then `HOARD__*`
//! environment variables (`HOARD__SERVER__ADDR=0.0.0.0:8080`), then CLI
//! flags applied by the binary. The merged result is checked with
//! [`validator`] before use.

use crate::observability::LogFormat;
use crate::repos::RepositoryRecord;
use hoard_auth::Account;
use hoard_git::{validate_ref_name, ProtocolSettings};
use hoard_storage::{LocalStore, MemoryStore, ObjectStore, DEFAULT_MAX_BATCH_SIZE, DEFAULT_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use validator::{Validate, ValidationError};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "HOARD";

/// Default request body limit: 512 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    /// The merged configuration is invalid.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP listener.
    #[validate(nested)]
    pub server: ServerConfig,
    /// Object store backend.
    #[validate(nested)]
    pub storage: StorageConfig,
    /// Git protocol settings.
    #[validate(nested)]
    pub git: GitConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Hosted repositories.
    #[validate(nested)]
    pub repositories: Vec<RepositoryRecord>,
    /// Accounts allowed to authenticate.
    #[validate(nested)]
    pub accounts: Vec<AccountConfig>,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub addr: SocketAddr,
    /// Largest accepted request body.
    #[validate(range(min = 1))]
    pub max_body_bytes: usize,
    /// Realm sent in `WWW-Authenticate` challenges.
    #[validate(length(min = 1))]
    pub realm: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            realm: "hoard".to_string(),
        }
    }
}

/// Which object store implementation to run on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory; lost on restart.
    #[default]
    Memory,
    /// One file per key under `storage.root`.
    Local,
}

/// Object store settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_storage"))]
pub struct StorageConfig {
    /// Backend kind.
    pub backend: StorageBackend,
    /// Root directory for the local backend.
    pub root: Option<PathBuf>,
    /// Keys returned per listing page.
    #[validate(range(min = 1))]
    pub page_size: usize,
    /// Keys per batch delete.
    #[validate(range(min = 1))]
    pub max_batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            root: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ValidationError> {
    if storage.backend == StorageBackend::Local && storage.root.is_none() {
        return Err(ValidationError::new("local_backend_requires_root"));
    }
    Ok(())
}

impl StorageConfig {
    /// Opens the configured store.
    pub async fn open(&self) -> hoard_storage::Result<Arc<dyn ObjectStore>> {
        match self.backend {
            StorageBackend::Memory => Ok(Arc::new(MemoryStore::with_limits(
                self.page_size,
                self.max_batch_size,
            ))),
            StorageBackend::Local => {
                let root = self.root.clone().ok_or_else(|| {
                    hoard_storage::StorageError::Backend("storage.root is not set".into())
                })?;
                let store = LocalStore::open(root)
                    .await?
                    .with_limits(self.page_size, self.max_batch_size);
                Ok(Arc::new(store))
            }
        }
    }
}

/// Git protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GitConfig {
    /// Branch `HEAD` points at in new repositories.
    #[validate(custom(function = "validate_branch"))]
    pub default_branch: String,
    /// `agent=` capability value.
    #[validate(length(min = 1))]
    pub agent: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        let defaults = ProtocolSettings::default();
        Self {
            default_branch: defaults.default_branch,
            agent: defaults.agent,
        }
    }
}

fn validate_branch(name: &str) -> Result<(), ValidationError> {
    validate_ref_name(&format!("refs/heads/{}", name))
        .map_err(|_| ValidationError::new("invalid_branch_name"))
}

impl GitConfig {
    /// Settings handed to the protocol handlers.
    pub fn protocol_settings(&self) -> ProtocolSettings {
        ProtocolSettings {
            default_branch: self.default_branch.clone(),
            agent: self.agent.clone(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for the `hoard` crates.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// An account entry.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct AccountConfig {
    /// Account ID.
    #[validate(length(min = 1))]
    pub id: String,
    /// Login name.
    #[validate(length(min = 1))]
    pub username: String,
    /// Password record from `hoard-node hash-password`.
    #[serde(default)]
    pub password_hash: Option<String>,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("has_password", &self.password_hash.is_some())
            .finish()
    }
}

impl From<AccountConfig> for Account {
    fn from(config: AccountConfig) -> Self {
        Account {
            id: config.id,
            username: config.username,
            password_hash: config.password_hash,
        }
    }
}

impl NodeConfig {
    /// Loads configuration from `path` (if any) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(path, None)
    }

    fn load_from(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        let config: NodeConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
