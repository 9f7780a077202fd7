//! Typed adapter over the mail collection.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use postrider_common::config::MAIL_COLLECTION;
use serde::{Deserialize, Serialize};

use crate::{
    DocumentStore,
    query::{Direction, Filter, Query},
    value::{Document, Value},
    write::WriteBatch,
};

/// Dotted field paths of the engine-owned `smtpAgent` subtree.
pub mod fields {
    pub const STATE: &str = "smtpAgent.state";
    pub const ATTEMPTS: &str = "smtpAgent.attempts";
    pub const VERSION: &str = "smtpAgent.version";
    pub const HOST: &str = "smtpAgent.host";
    pub const PID: &str = "smtpAgent.pid";
    pub const LAST_UPDATED_AT: &str = "smtpAgent.lastUpdatedAt";
    pub const LAST_SUCCESS_AT: &str = "smtpAgent.lastSuccessAt";
    pub const NEXT_RETRY_AT: &str = "smtpAgent.nextRetryAt";
    pub const PROCESSING_BY: &str = "smtpAgent.processing.by";
    pub const PROCESSING_LEASE: &str = "smtpAgent.processing.leaseExpireTime";
    pub const ATTEMPT_START: &str = "smtpAgent.lastAttempt.startTime";
    pub const ATTEMPT_END: &str = "smtpAgent.lastAttempt.endTime";
    pub const ATTEMPT_SUCCESS: &str = "smtpAgent.lastAttempt.success";
    pub const ATTEMPT_ERROR_CODE: &str = "smtpAgent.lastAttempt.errorCode";
    pub const ATTEMPT_ERROR_MESSAGE: &str = "smtpAgent.lastAttempt.errorMessage";
    pub const ATTEMPT_SMTP_RESPONSE: &str = "smtpAgent.lastAttempt.smtpResponse";
    pub const ATTEMPT_TO_RESOLVED: &str = "smtpAgent.lastAttempt.toResolved";
    pub const IDEMPOTENCY_HASH: &str = "smtpAgent.idempotency.messageHash";
    pub const IDEMPOTENCY_SEEN_AT: &str = "smtpAgent.idempotency.lastSeenSameHashAt";
    pub const DELIVERY_SUCCESS: &str = "smtpAgent.smtpDelivery.success";
    pub const DELIVERY_TIMESTAMP: &str = "smtpAgent.smtpDelivery.timestamp";
    pub const DELIVERY_PROVIDER: &str = "smtpAgent.smtpDelivery.provider";
    pub const DELIVERY_MESSAGE_ID: &str = "smtpAgent.smtpDelivery.messageId";
}

/// Delivery state of a mail document. An absent `smtpAgent.state` field
/// reads as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentState {
    Pending,
    Processing,
    Sent,
    Error,
    Skipped,
}

impl AgentState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Sent => "SENT",
            Self::Error => "ERROR",
            Self::Skipped => "SKIPPED",
        }
    }

    /// Parse a stored state name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "PROCESSING" => Some(Self::Processing),
            "SENT" => Some(Self::Sent),
            "ERROR" => Some(Self::Error),
            "SKIPPED" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Map a stored field to a state; absence and unrecognized values read
    /// as `Pending` so malformed documents re-enter the normal cascade.
    #[must_use]
    pub fn from_field(value: Option<&Value>) -> Self {
        value
            .and_then(Value::as_str)
            .and_then(Self::parse)
            .unwrap_or(Self::Pending)
    }

    /// `SENT` and `SKIPPED` are terminal: the engine never writes to a
    /// document in either state again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Skipped)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mail document as read from the store, with typed accessors over the
/// raw field map.
#[derive(Debug, Clone)]
pub struct MailSnapshot {
    pub id: String,
    pub doc: Document,
}

impl MailSnapshot {
    #[must_use]
    pub fn new(id: impl Into<String>, doc: Document) -> Self {
        Self { id: id.into(), doc }
    }

    /// Recipient list normalized from the `to` field, input order
    /// preserved. A scalar address becomes a singleton list.
    #[must_use]
    pub fn recipients(&self) -> Vec<String> {
        match self.doc.get_path("to") {
            Some(Value::String(address)) => vec![address.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Subject from `message.subject`, falling back to a top-level
    /// `subject`.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.doc
            .get_path("message.subject")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| self.doc.get_path("subject").and_then(Value::as_str))
    }

    /// HTML body from `message.html`, falling back to a top-level `html`.
    #[must_use]
    pub fn html(&self) -> Option<&str> {
        self.doc
            .get_path("message.html")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| self.doc.get_path("html").and_then(Value::as_str))
    }

    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.doc.get_path("createdAt").and_then(Value::as_timestamp)
    }

    #[must_use]
    pub fn state(&self) -> AgentState {
        AgentState::from_field(self.doc.get_path(fields::STATE))
    }

    #[must_use]
    pub fn attempts(&self) -> i64 {
        self.doc
            .get_path(fields::ATTEMPTS)
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    #[must_use]
    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.doc
            .get_path(fields::NEXT_RETRY_AT)
            .and_then(Value::as_timestamp)
    }

    #[must_use]
    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        self.doc
            .get_path(fields::LAST_UPDATED_AT)
            .and_then(Value::as_timestamp)
    }

    #[must_use]
    pub fn last_error_message(&self) -> Option<&str> {
        self.doc
            .get_path(fields::ATTEMPT_ERROR_MESSAGE)
            .and_then(Value::as_str)
    }

    #[must_use]
    pub fn message_hash(&self) -> Option<&str> {
        self.doc
            .get_path(fields::IDEMPOTENCY_HASH)
            .and_then(Value::as_str)
    }
}

/// The candidate set for one tick, plus whether the store already dropped
/// terminal states (`false` after the NOT-IN fallback, in which case the
/// engine filters them in code).
#[derive(Debug)]
pub struct CandidateBatch {
    pub docs: Vec<MailSnapshot>,
    pub terminal_filtered: bool,
}

/// Typed wrapper over the mail collection.
#[derive(Clone)]
pub struct MailStore {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl MailStore {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            collection: MAIL_COLLECTION.to_string(),
        }
    }

    fn terminal_states() -> Vec<Value> {
        vec![
            Value::from(AgentState::Sent.as_str()),
            Value::from(AgentState::Skipped.as_str()),
        ]
    }

    /// Fetch this tick's candidates.
    ///
    /// The primary query carries the cutoff (when configured) and a
    /// `NOT IN` over the terminal states. If the primary query fails for
    /// any reason it is retried exactly once without the `NOT IN`; the
    /// returned batch then asks the engine to drop terminal states in
    /// code. Treat that fallback as a normal operating mode.
    ///
    /// # Errors
    ///
    /// Propagates the failure of the fallback query.
    pub async fn list_candidates(
        &self,
        cutoff: Option<DateTime<Utc>>,
    ) -> crate::Result<CandidateBatch> {
        let mut base = Query::collection(&self.collection);
        if let Some(cutoff) = cutoff {
            base = base.filter(Filter::Gte("createdAt".into(), Value::from(cutoff)));
        }

        let primary = base
            .clone()
            .filter(Filter::NotIn(fields::STATE.into(), Self::terminal_states()));

        match self.store.query(&primary).await {
            Ok(results) => Ok(CandidateBatch {
                docs: Self::snapshots(results),
                terminal_filtered: true,
            }),
            Err(error) => {
                tracing::warn!(%error, "candidate query failed, retrying without state filter");
                let results = self.store.query(&base).await?;
                tracing::info!("fell back to cutoff-only query, filtering finished docs in code");
                Ok(CandidateBatch {
                    docs: Self::snapshots(results),
                    terminal_filtered: false,
                })
            }
        }
    }

    fn snapshots(results: Vec<(String, Document)>) -> Vec<MailSnapshot> {
        results
            .into_iter()
            .map(|(id, doc)| MailSnapshot::new(id, doc))
            .collect()
    }

    /// Fetch one document by id.
    pub async fn get(&self, id: &str) -> crate::Result<Option<MailSnapshot>> {
        Ok(self
            .store
            .get(&self.collection, id)
            .await?
            .map(|doc| MailSnapshot::new(id, doc)))
    }

    /// Merge fields into a document, creating it if missing.
    pub async fn set_merge(&self, id: &str, writes: &WriteBatch) -> crate::Result<()> {
        self.store.set_merge(&self.collection, id, writes).await
    }

    /// Merge fields into an existing document.
    pub async fn update(&self, id: &str, writes: &WriteBatch) -> crate::Result<()> {
        self.store.update(&self.collection, id, writes).await
    }

    /// Audit query for the admin surface: documents in `state` (or any
    /// state when `None`), newest processed first.
    pub async fn list_by_state_desc_updated(
        &self,
        state: Option<AgentState>,
        limit: usize,
    ) -> crate::Result<Vec<MailSnapshot>> {
        let mut query = Query::collection(&self.collection)
            .order_by(fields::LAST_UPDATED_AT, Direction::Descending)
            .limit(limit);
        if let Some(state) = state {
            query = query.filter(Filter::Eq(fields::STATE.into(), Value::from(state.as_str())));
        }
        Ok(Self::snapshots(self.store.query(&query).await?))
    }

    /// Documents processed at or after `since`; one scan feeds every stats
    /// window.
    pub async fn list_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> crate::Result<Vec<MailSnapshot>> {
        let query = Query::collection(&self.collection).filter(Filter::Gte(
            fields::LAST_UPDATED_AT.into(),
            Value::from(since),
        ));
        Ok(Self::snapshots(self.store.query(&query).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;

    fn mail_doc(to: Value, state: Option<&str>) -> Document {
        let mut doc = Document::new();
        doc.set_path("to", to);
        doc.set_path("message.subject", Value::from("Hi"));
        doc.set_path("message.html", Value::from("<p>hi</p>"));
        if let Some(state) = state {
            doc.set_path(fields::STATE, Value::from(state));
        }
        doc
    }

    #[test]
    fn absent_state_reads_as_pending() {
        let snapshot = MailSnapshot::new("m1", mail_doc(Value::from("a@x"), None));
        assert_eq!(snapshot.state(), AgentState::Pending);
        assert!(!snapshot.state().is_terminal());
    }

    #[test]
    fn unknown_state_reads_as_pending() {
        let snapshot = MailSnapshot::new("m1", mail_doc(Value::from("a@x"), Some("BOGUS")));
        assert_eq!(snapshot.state(), AgentState::Pending);
    }

    #[test]
    fn recipients_normalize_scalar_and_list() {
        let scalar = MailSnapshot::new("m1", mail_doc(Value::from("a@x"), None));
        assert_eq!(scalar.recipients(), vec!["a@x".to_string()]);

        let list = MailSnapshot::new(
            "m2",
            mail_doc(
                Value::Array(vec![Value::from("b@x"), Value::from("a@x")]),
                None,
            ),
        );
        assert_eq!(list.recipients(), vec!["b@x".to_string(), "a@x".to_string()]);
    }

    #[test]
    fn subject_falls_back_to_top_level() {
        let mut doc = Document::new();
        doc.set_path("subject", Value::from("Fallback"));
        let snapshot = MailSnapshot::new("m1", doc);
        assert_eq!(snapshot.subject(), Some("Fallback"));
    }

    #[tokio::test]
    async fn candidates_fall_back_when_not_in_is_rejected() {
        let accepting = MemoryStore::new();
        let rejecting = MemoryStore::rejecting_not_in();

        for store in [&accepting, &rejecting] {
            store.seed(MAIL_COLLECTION, "m1", mail_doc(Value::from("a@x"), None));
            store.seed(
                MAIL_COLLECTION,
                "m2",
                mail_doc(Value::from("b@x"), Some("SENT")),
            );
        }

        let primary = MailStore::new(Arc::new(accepting))
            .list_candidates(None)
            .await
            .unwrap();
        assert!(primary.terminal_filtered);
        let primary_ids: Vec<_> = primary.docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(primary_ids, vec!["m1"]);

        let fallback = MailStore::new(Arc::new(rejecting))
            .list_candidates(None)
            .await
            .unwrap();
        assert!(!fallback.terminal_filtered);
        let fallback_ids: Vec<_> = fallback.docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(fallback_ids, vec!["m1", "m2"]);
    }
}
