//! Error types for store operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures from the document store and its adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("invalid document id: {0}")]
    InvalidId(String),

    /// The backend cannot evaluate this filter (the missing-composite-index
    /// analogue). Callers fall back to filtering in code.
    #[error("unsupported filter: {0}")]
    UnsupportedFilter(&'static str),

    #[error("credentials file not found: {}", .0.display())]
    CredentialsNotFound(PathBuf),

    #[error("unsupported store endpoint: {0}")]
    UnsupportedEndpoint(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Specialized `Result` for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("lock poisoned: {e}"))
    }
}
