//! Cache-related error types

use thiserror::Error;

/// Cache operation errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialization error in cache '{cache}': {message}")]
    Serialization { cache: String, message: String },

    #[error("Invalid cache configuration for '{cache}': {message}")]
    InvalidConfig { cache: String, message: String },

    #[error("Cache '{id}' is already registered")]
    DuplicateCache { id: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cache result type
pub type Result<T> = std::result::Result<T, CacheError>;
