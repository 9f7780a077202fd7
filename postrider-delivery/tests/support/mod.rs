//! Shared fixtures for delivery engine tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postrider_common::{Clock, LogLevel};
use postrider_delivery::{
    DeliveryEngine, Mailer, OverlayDefaults, SendOutcome,
};
use postrider_store::{
    AdminStore, Document, DocumentStore, FieldWrite, MailStore, MemoryStore, Query, Value,
    WriteBatch, mail::fields,
};

/// A clock the test drives by hand; `sleep` returns immediately.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += duration;
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, _duration: Duration) {}
}

/// One recorded call to the mock mailer.
#[derive(Debug, Clone)]
pub struct SentCall {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

/// A mailer with a fixed outcome that records every call.
pub struct MockMailer {
    error: Option<String>,
    calls: Mutex<Vec<SentCall>>,
}

impl MockMailer {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            error: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: &str) -> Arc<Self> {
        Arc::new(Self {
            error: Some(error.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<SentCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, to: &[String], subject: &str, html: &str) -> SendOutcome {
        self.calls.lock().unwrap().push(SentCall {
            to: to.to_vec(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        match &self.error {
            None => SendOutcome::ok(),
            Some(error) => SendOutcome::failed(error.clone()),
        }
    }
}

/// One write observed by [`RecordingStore`].
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub op: &'static str,
    pub id: String,
    /// The `smtpAgent.state` literal carried by the write, if any.
    pub state: Option<String>,
}

fn state_of(writes: &WriteBatch) -> Option<String> {
    writes.iter().find_map(|(path, write)| {
        if path == fields::STATE
            && let FieldWrite::Literal(Value::String(state)) = write
        {
            Some(state.clone())
        } else {
            None
        }
    })
}

/// Store wrapper that records every write, for ordering assertions.
pub struct RecordingStore {
    inner: MemoryStore,
    writes: Mutex<Vec<WriteRecord>>,
}

impl RecordingStore {
    pub fn wrapping(inner: MemoryStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            writes: Mutex::new(Vec::new()),
        })
    }

    pub fn writes_for(&self, id: &str) -> Vec<WriteRecord> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.id == id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn get(&self, collection: &str, id: &str) -> postrider_store::Result<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: &str,
        writes: &WriteBatch,
    ) -> postrider_store::Result<()> {
        self.writes.lock().unwrap().push(WriteRecord {
            op: "set_merge",
            id: id.to_string(),
            state: state_of(writes),
        });
        self.inner.set_merge(collection, id, writes).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        writes: &WriteBatch,
    ) -> postrider_store::Result<()> {
        self.writes.lock().unwrap().push(WriteRecord {
            op: "update",
            id: id.to_string(),
            state: state_of(writes),
        });
        self.inner.update(collection, id, writes).await
    }

    async fn query(&self, query: &Query) -> postrider_store::Result<Vec<(String, Document)>> {
        self.inner.query(query).await
    }
}

/// Store wrapper whose `update` fails for one document id, to force the
/// unexpected-failure path for that document.
pub struct FailingUpdateStore {
    inner: MemoryStore,
    failing_id: String,
}

impl FailingUpdateStore {
    pub fn wrapping(inner: MemoryStore, failing_id: &str) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing_id: failing_id.to_string(),
        })
    }
}

#[async_trait]
impl DocumentStore for FailingUpdateStore {
    async fn get(&self, collection: &str, id: &str) -> postrider_store::Result<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: &str,
        writes: &WriteBatch,
    ) -> postrider_store::Result<()> {
        self.inner.set_merge(collection, id, writes).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        writes: &WriteBatch,
    ) -> postrider_store::Result<()> {
        if id == self.failing_id {
            return Err(postrider_store::StoreError::Internal(
                "injected update failure".to_string(),
            ));
        }
        self.inner.update(collection, id, writes).await
    }

    async fn query(&self, query: &Query) -> postrider_store::Result<Vec<(String, Document)>> {
        self.inner.query(query).await
    }
}

/// Store wrapper that returns every query row twice, as a degenerate
/// backing store might.
pub struct DuplicatingStore {
    inner: MemoryStore,
}

impl DuplicatingStore {
    pub fn wrapping(inner: MemoryStore) -> Arc<Self> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl DocumentStore for DuplicatingStore {
    async fn get(&self, collection: &str, id: &str) -> postrider_store::Result<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: &str,
        writes: &WriteBatch,
    ) -> postrider_store::Result<()> {
        self.inner.set_merge(collection, id, writes).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        writes: &WriteBatch,
    ) -> postrider_store::Result<()> {
        self.inner.update(collection, id, writes).await
    }

    async fn query(&self, query: &Query) -> postrider_store::Result<Vec<(String, Document)>> {
        let rows = self.inner.query(query).await?;
        let mut doubled = rows.clone();
        doubled.extend(rows);
        Ok(doubled)
    }
}

/// Build a mail document the way a producer would.
pub fn mail_doc(to: Value, subject: &str, html: &str, created_at: DateTime<Utc>) -> Document {
    let mut doc = Document::new();
    doc.set_path("to", to);
    doc.set_path("message.subject", Value::from(subject));
    doc.set_path("message.html", Value::from(html));
    doc.set_path("createdAt", Value::from(created_at));
    doc
}

/// Engine defaults used across tests unless a test overrides them.
pub fn defaults() -> OverlayDefaults {
    OverlayDefaults {
        poll_interval_secs: 60,
        max_retry_count: 5,
        process_from_after: String::new(),
        cutoff: None,
        log_level: LogLevel::Info,
    }
}

/// Wire an engine over the given collaborators.
pub fn engine(
    store: Arc<dyn DocumentStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<ManualClock>,
    defaults: OverlayDefaults,
) -> DeliveryEngine {
    DeliveryEngine::new(
        MailStore::new(store.clone()),
        AdminStore::new(store),
        mailer,
        clock,
        defaults,
    )
}
