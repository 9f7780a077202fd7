//! Document field values.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single field value in a stored document.
///
/// Timestamps are first-class rather than strings so range filters and
/// ordering behave like the backing store's native timestamp type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Render for JSON consumers: timestamps become RFC 3339 strings,
    /// everything else maps onto its JSON counterpart.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Integer(n) => serde_json::Value::from(*n),
            Self::Double(d) => serde_json::Value::from(*d),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Order two values of the same kind; `None` for mixed or unordered
    /// kinds. Integers and doubles compare across kinds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Double(a), Self::Double(b)) => a.partial_cmp(b),
            (Self::Integer(a), Self::Double(b)) => (*a as f64).partial_cmp(b),
            (Self::Double(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

/// A stored document: a map of named fields, nested via [`Value::Map`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document(pub BTreeMap<String, Value>);

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a field by dotted path, descending into nested maps.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    /// Set a field by dotted path, creating intermediate maps. A non-map
    /// value in the middle of the path is replaced by a map.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let leaf = segments.pop().unwrap_or(path);
        let mut current = &mut self.0;
        for segment in segments {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            if !matches!(entry, Value::Map(_)) {
                *entry = Value::Map(BTreeMap::new());
            }
            match entry {
                Value::Map(map) => current = map,
                _ => unreachable!(),
            }
        }
        current.insert(leaf.to_string(), value);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render the whole document for JSON consumers (see
    /// [`Value::to_json`]).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_access_descends_nested_maps() {
        let mut doc = Document::new();
        doc.set_path("message.subject", Value::from("Hi"));
        doc.set_path("to", Value::from("a@x"));

        assert_eq!(doc.get_path("message.subject"), Some(&Value::from("Hi")));
        assert_eq!(doc.get_path("to"), Some(&Value::from("a@x")));
        assert_eq!(doc.get_path("message.html"), None);
        assert_eq!(doc.get_path("missing.deeply.nested"), None);
    }

    #[test]
    fn set_path_replaces_scalar_in_the_middle() {
        let mut doc = Document::new();
        doc.set_path("a", Value::from(1));
        doc.set_path("a.b", Value::from(2));
        assert_eq!(doc.get_path("a.b"), Some(&Value::from(2)));
    }

    #[test]
    fn compare_orders_timestamps_and_numbers() {
        use chrono::TimeZone;
        let early = Value::from(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let late = Value::from(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        assert_eq!(early.compare(&late), Some(std::cmp::Ordering::Less));
        assert_eq!(
            Value::Integer(3).compare(&Value::Double(2.5)),
            Some(std::cmp::Ordering::Greater)
        );
        assert_eq!(Value::from("a").compare(&Value::Integer(1)), None);
    }
}
