//! Typed adapter over the singleton admin documents.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use postrider_common::LogLevel;

use crate::{DocumentStore, value::Value, write::WriteBatch};

/// Collection holding the operator-owned singletons.
pub const ADMIN_COLLECTION: &str = "admin";
/// Runtime overrides for the delivery loop.
pub const CONFIG_DOC: &str = "smtpAgentConfig";
/// Status-reset marker for the dashboard's error counter.
pub const STATUS_DOC: &str = "smtpAgentStatus";

/// Raw option values as stored in the admin config document. Validation
/// happens in the overlay; this type only reports what is present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminOverrides {
    pub poll_interval: Option<i64>,
    pub process_from_after: Option<String>,
    pub max_retry_count: Option<i64>,
    pub log_level: Option<String>,
    pub dashboard_refresh_secs: Option<i64>,
}

/// Typed wrapper over the admin collection.
#[derive(Clone)]
pub struct AdminStore {
    store: Arc<dyn DocumentStore>,
}

impl AdminStore {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Read the config document; a missing document yields empty
    /// overrides.
    pub async fn read_overrides(&self) -> crate::Result<AdminOverrides> {
        let Some(doc) = self.store.get(ADMIN_COLLECTION, CONFIG_DOC).await? else {
            return Ok(AdminOverrides::default());
        };

        Ok(AdminOverrides {
            poll_interval: doc.get_path("pollInterval").and_then(Value::as_i64),
            process_from_after: doc
                .get_path("processFromAfter")
                .and_then(Value::as_str)
                .map(str::to_string),
            max_retry_count: doc.get_path("maxRetryCount").and_then(Value::as_i64),
            log_level: doc
                .get_path("logLevel")
                .and_then(Value::as_str)
                .map(str::to_string),
            dashboard_refresh_secs: doc.get_path("dashboardRefreshSec").and_then(Value::as_i64),
        })
    }

    /// Persist a validated config, stamping `updatedAt` server-side.
    pub async fn write_config(
        &self,
        poll_interval: i64,
        process_from_after: &str,
        max_retry_count: i64,
        log_level: LogLevel,
        dashboard_refresh_secs: Option<i64>,
    ) -> crate::Result<()> {
        let mut writes = WriteBatch::new()
            .set("pollInterval", poll_interval)
            .set("processFromAfter", process_from_after)
            .set("maxRetryCount", max_retry_count)
            .set("logLevel", log_level.as_str())
            .server_now("updatedAt");
        writes = match dashboard_refresh_secs {
            Some(secs) => writes.set("dashboardRefreshSec", secs),
            None => writes.null("dashboardRefreshSec"),
        };
        self.store
            .set_merge(ADMIN_COLLECTION, CONFIG_DOC, &writes)
            .await
    }

    /// When the operator last reset the status indicator.
    pub async fn read_status_reset(&self) -> crate::Result<Option<DateTime<Utc>>> {
        Ok(self
            .store
            .get(ADMIN_COLLECTION, STATUS_DOC)
            .await?
            .and_then(|doc| doc.get_path("statusResetAt").and_then(Value::as_timestamp)))
    }

    /// Record a status reset at `now`.
    pub async fn reset_status(&self, now: DateTime<Utc>) -> crate::Result<()> {
        self.store
            .set_merge(
                ADMIN_COLLECTION,
                STATUS_DOC,
                &WriteBatch::new().set("statusResetAt", now),
            )
            .await
    }

    /// Cheap reachability probe for the health endpoint; the read's
    /// outcome matters, not the document's existence.
    pub async fn probe(&self) -> crate::Result<()> {
        self.store.get(ADMIN_COLLECTION, "health").await.map(|_| ())
    }
}
