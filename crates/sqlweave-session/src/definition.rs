//! Mapper documents
//!
//! A namespace and its statements can be declared in YAML or TOML:
//!
//! ```yaml
//! namespace: blog
//! cache:
//!   eviction: lru
//!   size: 512
//! fragments:
//!   - id: columns
//!     script: "id, title, author_id"
//! statements:
//!   - id: selectIn
//!     command: select
//!     script: >
//!       select <include refid="columns"/> from blog where id in
//!       <foreach collection="ids" item="id" open="(" separator="," close=")">#{id}</foreach>
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlweave_cache::CacheConfig;

use crate::error::{Result, SessionError};
use crate::mapping::{SqlCommandType, StatementType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceDefinition {
    pub namespace: String,
    /// A cache owned by this namespace
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    /// Namespace whose cache this one shares
    #[serde(default)]
    pub cache_ref: Option<String>,
    #[serde(default)]
    pub fragments: Vec<FragmentDefinition>,
    #[serde(default)]
    pub statements: Vec<StatementDefinition>,
}

/// A reusable `<sql>` fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentDefinition {
    pub id: String,
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementDefinition {
    pub id: String,
    pub command: SqlCommandType,
    pub script: String,
    #[serde(default)]
    pub statement_type: StatementType,
    /// Defaults to `true` for everything but selects
    #[serde(default)]
    pub flush_cache: Option<bool>,
    /// Defaults to `true` for selects
    #[serde(default)]
    pub use_cache: Option<bool>,
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Only register when the configured database id matches
    #[serde(default)]
    pub database_id: Option<String>,
}

impl StatementDefinition {
    pub fn new(id: impl Into<String>, command: SqlCommandType, script: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command,
            script: script.into(),
            statement_type: StatementType::default(),
            flush_cache: None,
            use_cache: None,
            timeout: None,
            database_id: None,
        }
    }
}

impl NamespaceDefinition {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            cache: None,
            cache_ref: None,
            fragments: Vec::new(),
            statements: Vec::new(),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read a `.yaml`/`.yml` or `.toml` document
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            _ => Err(SessionError::Definition(format!(
                "unsupported mapper document '{}'",
                path.display()
            ))),
        }
    }
}
