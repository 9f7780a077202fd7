//! In-memory backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    DocumentStore, StoreError,
    query::{Filter, Query},
    value::Document,
    write::WriteBatch,
};

/// In-memory implementation of [`DocumentStore`].
///
/// Collections are `BTreeMap`s keyed by document id behind an `RwLock`, so
/// scans come back in a deterministic order. Primarily intended for tests;
/// [`Self::rejecting_not_in`] builds a store that refuses `NotIn` filters,
/// standing in for a backend without the composite index that predicate
/// needs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, BTreeMap<String, Document>>>>,
    reject_not_in: bool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `query` rejects `NotIn` filters with
    /// `UnsupportedFilter`, for exercising the fallback path.
    #[must_use]
    pub fn rejecting_not_in() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            reject_not_in: true,
        }
    }

    /// Insert a complete document, bypassing write resolution. Test seam
    /// for seeding producer-owned documents.
    pub fn seed(&self, collection: &str, id: &str, doc: Document) {
        self.collections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> crate::Result<Option<Document>> {
        Ok(self
            .collections
            .read()?
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: &str,
        writes: &WriteBatch,
    ) -> crate::Result<()> {
        let mut collections = self.collections.write()?;
        let doc = collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        writes.apply(doc, Utc::now());
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, writes: &WriteBatch) -> crate::Result<()> {
        let mut collections = self.collections.write()?;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;
        writes.apply(doc, Utc::now());
        Ok(())
    }

    async fn query(&self, query: &Query) -> crate::Result<Vec<(String, Document)>> {
        if self.reject_not_in
            && query
                .filters
                .iter()
                .any(|filter| matches!(filter, Filter::NotIn(_, _)))
        {
            return Err(StoreError::UnsupportedFilter("not-in"));
        }

        let collections = self.collections.read()?;
        let mut results: Vec<(String, Document)> = collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| query.matches(doc))
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default();

        query.order_and_limit(&mut results);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use crate::value::Value;

    use super::*;

    #[tokio::test]
    async fn set_merge_creates_and_update_requires_existing() {
        let store = MemoryStore::new();
        let writes = WriteBatch::new().set("to", "a@x");

        assert!(matches!(
            store.update("mail", "m1", &writes).await,
            Err(StoreError::NotFound(_))
        ));

        store.set_merge("mail", "m1", &writes).await.unwrap();
        let doc = store.get("mail", "m1").await.unwrap().unwrap();
        assert_eq!(doc.get_path("to"), Some(&Value::from("a@x")));

        store
            .update("mail", "m1", &WriteBatch::new().set("subject", "Hi"))
            .await
            .unwrap();
        let doc = store.get("mail", "m1").await.unwrap().unwrap();
        assert_eq!(doc.get_path("subject"), Some(&Value::from("Hi")));
    }

    #[tokio::test]
    async fn rejecting_store_refuses_not_in() {
        let store = MemoryStore::rejecting_not_in();
        let query = Query::collection("mail").filter(Filter::NotIn(
            "smtpAgent.state".into(),
            vec![Value::from("SENT")],
        ));

        assert!(matches!(
            store.query(&query).await,
            Err(StoreError::UnsupportedFilter(_))
        ));

        // Without the offending filter the same store answers normally.
        let query = Query::collection("mail");
        assert!(store.query(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let store = MemoryStore::new();
        for (id, state) in [("m1", "SENT"), ("m2", "ERROR"), ("m3", "SENT")] {
            let mut doc = Document::new();
            doc.set_path("smtpAgent.state", Value::from(state));
            store.seed("mail", id, doc);
        }

        let query = Query::collection("mail")
            .filter(Filter::Eq("smtpAgent.state".into(), Value::from("SENT")));
        let results = store.query(&query).await.unwrap();
        let ids: Vec<_> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m3"]);
    }
}
