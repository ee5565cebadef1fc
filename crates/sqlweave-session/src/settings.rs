//! Runtime settings
//!
//! Settings come from an optional file (format picked by extension: TOML,
//! YAML or JSON) overlaid with `SQLWEAVE_*` environment variables:
//!
//! ```toml
//! cache_enabled = true
//! default_statement_timeout = 30
//!
//! [caches.blog]
//! eviction = "fifo"
//! size = 256
//! flush_interval_ms = 60000
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use sqlweave_cache::CacheConfig;
use tracing::debug;

use crate::error::{Result, SessionError};

pub const DEFAULT_ENV_PREFIX: &str = "SQLWEAVE";

/// Session-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Wrap executors in the second-level cache
    pub cache_enabled: bool,
    /// Statement timeout in seconds applied when a statement sets none
    pub default_statement_timeout: Option<u64>,
    /// Vendor id exposed to templates as `_databaseId`
    pub database_id: Option<String>,
    /// Per-namespace cache configuration
    pub caches: HashMap<String, CacheConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            default_statement_timeout: None,
            database_id: None,
            caches: HashMap::new(),
        }
    }
}

impl Settings {
    /// Cache configuration for a namespace, falling back to the defaults
    pub fn cache_config(&self, namespace: &str) -> CacheConfig {
        self.caches.get(namespace).cloned().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        for (namespace, cache) in &self.caches {
            if cache.size == 0 {
                return Err(SessionError::configuration(format!(
                    "cache '{}' must have a size greater than 0",
                    namespace
                )));
            }
            if cache.flush_interval_ms == Some(0) {
                return Err(SessionError::configuration(format!(
                    "cache '{}' flush interval must be greater than 0",
                    namespace
                )));
            }
        }
        if self.default_statement_timeout == Some(0) {
            return Err(SessionError::configuration(
                "default statement timeout must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Loads [`Settings`] from a file and the environment
pub struct SettingsLoader {
    path: Option<PathBuf>,
    env_prefix: String,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new()
        }
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read, merge and validate. A missing file is not an error.
    pub fn load(&self) -> Result<Settings> {
        let mut builder = Config::builder();
        if let Some(path) = &self.path {
            builder = builder.add_source(File::from(path.clone()).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        debug!(
            path = ?self.path,
            cache_enabled = settings.cache_enabled,
            caches = settings.caches.len(),
            "loaded settings"
        );
        Ok(settings)
    }

    /// Write settings as TOML, creating parent directories
    pub fn save(&self, settings: &Settings) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| SessionError::configuration("no settings path configured"))?;
        let content = toml::to_string(settings)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}
