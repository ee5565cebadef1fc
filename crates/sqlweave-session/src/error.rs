//! Error types for sessions, configuration and execution

use sqlweave_cache::CacheError;
use sqlweave_scripting::ScriptError;
use thiserror::Error;

/// Errors raised while configuring or executing mapped statements
#[derive(Debug, Error)]
pub enum SessionError {
    /// A configuration element refers to something not registered yet.
    /// Raised only for retryable lookups; the element is queued for a later pass.
    #[error("Incomplete configuration element: {message}")]
    Incomplete { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Executor error: {message}")]
    Executor { message: String },

    #[error("{operation} is not supported by {executor}")]
    Unsupported {
        operation: &'static str,
        executor: &'static str,
    },

    #[error("Caching stored procedures with OUT params is not supported. Please configure useCache=false in {statement} statement.")]
    OutParamsNotCacheable { statement: String },

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid definition: {0}")]
    Definition(String),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl SessionError {
    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::Incomplete {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn executor(message: impl Into<String>) -> Self {
        Self::Executor {
            message: message.into(),
        }
    }

    /// Whether retrying after more of the configuration is registered may succeed
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }
}

impl From<toml::de::Error> for SessionError {
    fn from(err: toml::de::Error) -> Self {
        Self::Definition(err.to_string())
    }
}

impl From<toml::ser::Error> for SessionError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Definition(err.to_string())
    }
}

impl From<serde_yaml::Error> for SessionError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Definition(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
