//! Admin server error types.

use thiserror::Error;

/// Errors raised while starting or running the admin HTTP server.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("failed to bind admin server to {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("admin server error: {0}")]
    Server(String),
}
