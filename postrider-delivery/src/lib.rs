//! The postrider delivery engine.
//!
//! Everything that decides whether and when an email is sent lives here:
//! the idempotency fingerprint, the SMTP client, the live configuration
//! overlay, the retry/backoff schedule, and the [`DeliveryEngine`] polling
//! loop with its per-document state machine.

pub mod backoff;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod mailer;
pub mod overlay;

pub use engine::{DeliveryEngine, WorkerIdentity};
pub use error::DeliveryError;
pub use fingerprint::message_hash;
pub use mailer::{Mailer, MailerError, SendOutcome, SmtpMailer};
pub use overlay::{ConfigOverlay, EffectiveConfig, OverlayDefaults};
