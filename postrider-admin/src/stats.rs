//! Dashboard statistics.

use chrono::{DateTime, Utc};
use postrider_store::AgentState;
use serde::Serialize;

use crate::AdminState;

/// Sent/error counters for one time window.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct WindowCounts {
    pub sent: u64,
    pub error: u64,
}

/// The dashboard status light.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub indicator: &'static str,
    pub since: Option<DateTime<Utc>>,
    pub errors_since_reset: u64,
}

/// Everything `/stats` reports.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub h1: WindowCounts,
    pub h24: WindowCounts,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub status: StatusInfo,
    pub server_time: DateTime<Utc>,
}

/// Compute both stat windows from a single 24-hour scan.
///
/// The "since" anchor is the operator's last status reset when one exists,
/// otherwise the start of the 24-hour window.
pub async fn collect(state: &AdminState) -> Stats {
    let now = Utc::now();
    let t1 = now - chrono::Duration::hours(1);
    let t24 = now - chrono::Duration::hours(24);

    let reset_at = state.admin.read_status_reset().await.unwrap_or_default();

    let mut h1 = WindowCounts::default();
    let mut h24 = WindowCounts::default();
    let mut last_processed_at = None;
    let mut errors_since_reset = 0_u64;

    match state.mail.list_updated_since(t24).await {
        Ok(snapshots) => {
            for snapshot in snapshots {
                let doc_state = snapshot.state();
                let updated_at = snapshot.last_updated_at();

                if let Some(ts) = updated_at
                    && last_processed_at.is_none_or(|last| ts > last)
                {
                    last_processed_at = Some(ts);
                }

                match doc_state {
                    AgentState::Sent => h24.sent += 1,
                    AgentState::Error => h24.error += 1,
                    _ => {}
                }
                if let Some(ts) = updated_at
                    && ts >= t1
                {
                    match doc_state {
                        AgentState::Sent => h1.sent += 1,
                        AgentState::Error => h1.error += 1,
                        _ => {}
                    }
                }
                if let (Some(reset_at), Some(ts)) = (reset_at, updated_at)
                    && ts >= reset_at
                    && doc_state == AgentState::Error
                {
                    errors_since_reset += 1;
                }
            }
        }
        Err(error) => {
            tracing::error!(%error, "stats scan failed");
        }
    }

    let status = match reset_at {
        None => StatusInfo {
            indicator: if h24.error > 0 { "red" } else { "green" },
            since: Some(t24),
            errors_since_reset: h24.error,
        },
        Some(reset_at) => StatusInfo {
            indicator: if errors_since_reset > 0 { "red" } else { "green" },
            since: Some(reset_at),
            errors_since_reset,
        },
    };

    Stats {
        h1,
        h24,
        last_processed_at,
        status,
        server_time: now,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use postrider_store::{Document, MemoryStore, Value, mail::fields};

    use super::*;

    fn seeded_state(store: &MemoryStore) -> AdminState {
        AdminState::for_tests(Arc::new(store.clone()))
    }

    fn processed_doc(state: &str, updated_at: DateTime<Utc>) -> Document {
        let mut doc = Document::new();
        doc.set_path(fields::STATE, Value::from(state));
        doc.set_path(fields::LAST_UPDATED_AT, Value::from(updated_at));
        doc
    }

    #[tokio::test]
    async fn one_scan_feeds_both_windows() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.seed("mail", "recent-sent", processed_doc("SENT", now - chrono::Duration::minutes(10)));
        store.seed("mail", "recent-error", processed_doc("ERROR", now - chrono::Duration::minutes(20)));
        store.seed("mail", "old-sent", processed_doc("SENT", now - chrono::Duration::hours(5)));
        store.seed("mail", "ancient", processed_doc("SENT", now - chrono::Duration::hours(30)));

        let stats = collect(&seeded_state(&store)).await;
        assert_eq!(stats.h1, WindowCounts { sent: 1, error: 1 });
        assert_eq!(stats.h24, WindowCounts { sent: 2, error: 1 });
        assert!(stats.last_processed_at.is_some());
        assert_eq!(stats.status.indicator, "red");
        assert_eq!(stats.status.errors_since_reset, 1);
    }

    #[tokio::test]
    async fn status_reset_re_anchors_the_error_counter() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.seed("mail", "old-error", processed_doc("ERROR", now - chrono::Duration::hours(2)));

        let state = seeded_state(&store);
        state
            .admin
            .reset_status(now - chrono::Duration::hours(1))
            .await
            .unwrap();

        let stats = collect(&state).await;
        // The error predates the reset, so the light is green again.
        assert_eq!(stats.status.indicator, "green");
        assert_eq!(stats.status.errors_since_reset, 0);
        assert_eq!(stats.h24.error, 1);
    }

    #[tokio::test]
    async fn empty_store_is_green() {
        let store = MemoryStore::new();
        let stats = collect(&seeded_state(&store)).await;
        assert_eq!(stats.status.indicator, "green");
        assert_eq!(stats.h24, WindowCounts::default());
        assert_eq!(stats.last_processed_at, None);
    }
}
