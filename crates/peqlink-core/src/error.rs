//! Error types for peqlink core.

use thiserror::Error;

/// Core error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid vendor catalog: {0}")]
    InvalidCatalog(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations.
pub type CoreResult<T> = std::result::Result<T, Error>;
