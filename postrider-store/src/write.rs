//! Field writes and their server-side sentinels.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::value::{Document, Value};

/// One field write, addressed by dotted path.
///
/// `ServerNow` and `Increment` are resolved by the backend at commit time;
/// `Null` stores an explicit null (used to clear fields such as
/// `nextRetryAt` on terminal transitions).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    Literal(Value),
    ServerNow,
    Increment(i64),
    Null,
}

/// An ordered set of field writes applied atomically to one document.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    fields: BTreeMap<String, FieldWrite>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a literal value.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(path.into(), FieldWrite::Literal(value.into()));
        self
    }

    /// Write the store's own commit timestamp.
    #[must_use]
    pub fn server_now(mut self, path: impl Into<String>) -> Self {
        self.fields.insert(path.into(), FieldWrite::ServerNow);
        self
    }

    /// Atomically add `by` to the stored integer (missing reads as zero).
    #[must_use]
    pub fn increment(mut self, path: impl Into<String>, by: i64) -> Self {
        self.fields.insert(path.into(), FieldWrite::Increment(by));
        self
    }

    /// Store an explicit null.
    #[must_use]
    pub fn null(mut self, path: impl Into<String>) -> Self {
        self.fields.insert(path.into(), FieldWrite::Null);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldWrite)> {
        self.fields.iter()
    }

    /// Resolve every write against `doc`, using `now` as the server clock.
    pub fn apply(&self, doc: &mut Document, now: DateTime<Utc>) {
        for (path, write) in &self.fields {
            let value = match write {
                FieldWrite::Literal(value) => value.clone(),
                FieldWrite::ServerNow => Value::Timestamp(now),
                FieldWrite::Increment(by) => {
                    let current = doc.get_path(path).and_then(Value::as_i64).unwrap_or(0);
                    Value::Integer(current.saturating_add(*by))
                }
                FieldWrite::Null => Value::Null,
            };
            doc.set_path(path, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_starts_from_zero_and_accumulates() {
        let mut doc = Document::new();
        let batch = WriteBatch::new().increment("smtpAgent.attempts", 1);

        batch.apply(&mut doc, Utc::now());
        batch.apply(&mut doc, Utc::now());

        assert_eq!(
            doc.get_path("smtpAgent.attempts"),
            Some(&Value::Integer(2))
        );
    }

    #[test]
    fn server_now_resolves_to_commit_time() {
        use chrono::TimeZone;
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut doc = Document::new();
        WriteBatch::new()
            .server_now("smtpAgent.lastUpdatedAt")
            .apply(&mut doc, now);

        assert_eq!(
            doc.get_path("smtpAgent.lastUpdatedAt"),
            Some(&Value::Timestamp(now))
        );
    }

    #[test]
    fn null_overwrites_existing_value() {
        let mut doc = Document::new();
        doc.set_path("smtpAgent.nextRetryAt", Value::Timestamp(Utc::now()));
        WriteBatch::new()
            .null("smtpAgent.nextRetryAt")
            .apply(&mut doc, Utc::now());

        assert_eq!(doc.get_path("smtpAgent.nextRetryAt"), Some(&Value::Null));
    }

    #[test]
    fn merge_keeps_untouched_fields() {
        let mut doc = Document::new();
        doc.set_path("to", Value::from("a@x"));
        doc.set_path("smtpAgent.state", Value::from("ERROR"));

        WriteBatch::new()
            .set("smtpAgent.state", "SENT")
            .apply(&mut doc, Utc::now());

        assert_eq!(doc.get_path("to"), Some(&Value::from("a@x")));
        assert_eq!(doc.get_path("smtpAgent.state"), Some(&Value::from("SENT")));
    }
}
