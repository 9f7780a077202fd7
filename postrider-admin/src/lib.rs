//! Operator HTTP surface for postrider.
//!
//! A small axum application serving the dashboard, delivery statistics,
//! mail document browsing, the admin config form, a log tail, and a health
//! probe. It reads from the same document store as the delivery engine but
//! writes only to the admin config and status-reset documents; mail
//! documents are never mutated here.

pub mod auth;
pub mod error;
pub mod html;
pub mod server;
pub mod stats;

use std::path::PathBuf;
use std::sync::Arc;

use postrider_common::Config;
use postrider_delivery::OverlayDefaults;
use postrider_store::{AdminStore, DocumentStore, MailStore};

pub use error::AdminError;
pub use server::AdminServer;

/// Shared state behind every admin handler.
#[derive(Clone)]
pub struct AdminState {
    pub mail: MailStore,
    pub admin: AdminStore,
    pub defaults: OverlayDefaults,
    pub version: String,
    pub port: u16,
    pub auth_user: String,
    pub auth_pass: String,
    pub log_file: Option<PathBuf>,
}

impl AdminState {
    #[must_use]
    pub fn new(config: &Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            mail: MailStore::new(store.clone()),
            admin: AdminStore::new(store),
            defaults: OverlayDefaults::from_config(config),
            version: env!("CARGO_PKG_VERSION").to_string(),
            port: config.admin.port,
            auth_user: config.admin.user.clone(),
            auth_pass: config.admin.pass.clone(),
            log_file: config.log.file.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            mail: MailStore::new(store.clone()),
            admin: AdminStore::new(store),
            defaults: OverlayDefaults {
                poll_interval_secs: 60,
                max_retry_count: 5,
                process_from_after: String::new(),
                cutoff: None,
                log_level: postrider_common::LogLevel::Info,
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            port: 8787,
            auth_user: String::new(),
            auth_pass: String::new(),
            log_file: None,
        }
    }
}
