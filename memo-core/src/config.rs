//! Configuration for the memo engine and its backing store.
//!
//! Every field has a default, so an empty TOML document is a valid config.
//! Environment variables override the defaults in [`MemoConfig::from_env`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::FetchPolicy;

/// Default on-disk location of the store environment.
pub const DEFAULT_STORE_PATH: &str = "./memo-data";
/// Default database name.
pub const DEFAULT_DATABASE: &str = "memo";
/// Default collection (namespace) holding cache entries.
pub const DEFAULT_COLLECTION: &str = "memo_entries";
/// Default LMDB map size in MiB.
pub const DEFAULT_MAP_SIZE_MB: usize = 64;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoConfig {
    pub store: StoreConfig,
    pub engine: EngineConfig,
}

/// Store connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Root directory; the environment lives in `path/database`.
    pub path: PathBuf,
    pub database: String,
    pub collection: String,
    pub map_size_mb: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            map_size_mb: DEFAULT_MAP_SIZE_MB,
        }
    }
}

impl StoreConfig {
    /// Config rooted at `path` with every other field defaulted.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Directory holding the environment for this database.
    pub fn env_dir(&self) -> PathBuf {
        self.path.join(&self.database)
    }

    /// Map size in bytes.
    pub fn map_size_bytes(&self) -> usize {
        self.map_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.database",
                reason: "must not be empty".to_string(),
            });
        }
        if self.collection.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.collection",
                reason: "must not be empty".to_string(),
            });
        }
        if self.map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "store.map_size_mb",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Engine behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Policy used when a request does not name one.
    pub default_policy: FetchPolicy,
    /// Coalesce concurrent identical requests into one invocation.
    pub single_flight: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_policy: FetchPolicy::default(),
            single_flight: true,
        }
    }
}

impl MemoConfig {
    /// Load and validate a TOML config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: MemoConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `MEMO_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `MEMO_*` name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("MEMO_STORE_PATH") {
            config.store.path = PathBuf::from(path);
        }
        if let Some(database) = lookup("MEMO_STORE_DATABASE") {
            config.store.database = database;
        }
        if let Some(collection) = lookup("MEMO_STORE_COLLECTION") {
            config.store.collection = collection;
        }
        if let Some(raw) = lookup("MEMO_STORE_MAP_SIZE_MB") {
            config.store.map_size_mb =
                raw.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                        field: "store.map_size_mb",
                        reason: format!("'{raw}': {e}"),
                    })?;
        }
        if let Some(raw) = lookup("MEMO_DEFAULT_POLICY") {
            config.engine.default_policy =
                raw.trim()
                    .parse()
                    .map_err(|e: crate::error::PolicyError| ConfigError::InvalidValue {
                        field: "engine.default_policy",
                        reason: e.to_string(),
                    })?;
        }
        if let Some(raw) = lookup("MEMO_SINGLE_FLIGHT") {
            config.engine.single_flight = parse_bool(&raw).ok_or_else(|| {
                ConfigError::InvalidValue {
                    field: "engine.single_flight",
                    reason: format!("'{raw}' is not a boolean"),
                }
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
