//! Error types for the delivery engine.

use thiserror::Error;

/// Failures surfaced by the delivery engine.
///
/// Document-local problems (SMTP refusals, invalid payloads) are recorded
/// on the document itself and never appear here; this type covers the
/// failures that abort a tick or a document's processing.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("store error: {0}")]
    Store(#[from] postrider_store::StoreError),

    #[error("mailer error: {0}")]
    Mailer(#[from] crate::mailer::MailerError),
}

/// Specialized `Result` for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;
