//! Storage error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during preset storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure preset store: {0}")]
    ConfigError(String),

    #[error("Invalid preset name: {0}")]
    InvalidName(String),

    #[error("Preset file {} is malformed: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Preset file {} has unsupported version {version}", path.display())]
    UnsupportedVersion { path: PathBuf, version: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Self::InvalidName(msg.into())
    }

    /// Errors that mean the caller sent bad input rather than the store failing.
    pub fn is_client_error(&self) -> bool {
        matches!(self, StorageError::InvalidName(_))
    }
}
