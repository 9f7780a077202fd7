//! Typed queries over a document collection.

use std::cmp::Ordering;

use crate::value::{Document, Value};

/// Sort direction for [`Query::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// The filter predicates the store contract requires.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field is present and `>=` the given value.
    Gte(String, Value),
    /// Field equals the given value.
    Eq(String, Value),
    /// Field is absent or differs from every listed value. Backends may
    /// reject this one (`StoreError::UnsupportedFilter`); callers must be
    /// prepared to re-filter in code.
    NotIn(String, Vec<Value>),
}

impl Filter {
    /// Evaluate the predicate against a document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Gte(path, bound) => doc
                .get_path(path)
                .and_then(|value| value.compare(bound))
                .is_some_and(Ordering::is_ge),
            Self::Eq(path, expected) => doc.get_path(path) == Some(expected),
            Self::NotIn(path, excluded) => doc
                .get_path(path)
                .is_none_or(|value| !excluded.contains(value)),
        }
    }
}

/// A filtered, optionally ordered and limited scan of one collection.
#[derive(Debug, Clone)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|filter| filter.matches(doc))
    }

    /// Sort, then truncate, a result set according to this query. Documents
    /// missing the order field sort first ascending; ties break on the
    /// document id so the order is stable across calls.
    pub fn order_and_limit(&self, results: &mut Vec<(String, Document)>) {
        if let Some((field, direction)) = &self.order_by {
            results.sort_by(|(a_id, a_doc), (b_id, b_doc)| {
                let by_field = match (a_doc.get_path(field), b_doc.get_path(field)) {
                    (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                by_field.then_with(|| a_id.cmp(b_id))
            });
            if *direction == Direction::Descending {
                results.reverse();
            }
        }
        if let Some(limit) = self.limit {
            results.truncate(limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_state(state: Option<&str>) -> Document {
        let mut doc = Document::new();
        if let Some(state) = state {
            doc.set_path("smtpAgent.state", Value::from(state));
        }
        doc
    }

    #[test]
    fn not_in_matches_documents_missing_the_field() {
        let filter = Filter::NotIn(
            "smtpAgent.state".into(),
            vec![Value::from("SENT"), Value::from("SKIPPED")],
        );

        assert!(filter.matches(&doc_with_state(None)));
        assert!(filter.matches(&doc_with_state(Some("ERROR"))));
        assert!(!filter.matches(&doc_with_state(Some("SENT"))));
        assert!(!filter.matches(&doc_with_state(Some("SKIPPED"))));
    }

    #[test]
    fn gte_excludes_documents_missing_the_field() {
        let filter = Filter::Gte("attempts".into(), Value::Integer(2));
        let mut doc = Document::new();
        assert!(!filter.matches(&doc));
        doc.set_path("attempts", Value::Integer(2));
        assert!(filter.matches(&doc));
        doc.set_path("attempts", Value::Integer(1));
        assert!(!filter.matches(&doc));
    }

    #[test]
    fn ordering_is_stable_on_ties() {
        let mut results = vec![
            ("b".to_string(), doc_with_state(Some("SENT"))),
            ("a".to_string(), doc_with_state(Some("SENT"))),
        ];
        Query::collection("mail")
            .order_by("smtpAgent.state", Direction::Descending)
            .order_and_limit(&mut results);

        assert_eq!(results[0].0, "b");
        assert_eq!(results[1].0, "a");
    }
}
