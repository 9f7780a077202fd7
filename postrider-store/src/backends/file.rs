//! JSON-file-per-document backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    DocumentStore, StoreError,
    query::Query,
    value::Document,
    write::WriteBatch,
};

/// File-backed implementation of [`DocumentStore`].
///
/// Documents live at `<root>/<collection>/<id>.json`. Writes go through a
/// temp file and an atomic rename; read-modify-write cycles are serialized
/// by a process-local mutex so concurrent tasks in the same process cannot
/// lose increments. Queries scan the collection directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

/// Document and collection names become path components, so anything that
/// could escape the root is rejected outright.
fn validate_component(name: &str) -> crate::Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(StoreError::InvalidId(name.to_string()));
    }
    Ok(())
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> crate::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    fn doc_path(&self, collection: &str, id: &str) -> crate::Result<PathBuf> {
        validate_component(collection)?;
        validate_component(id)?;
        Ok(self.root.join(collection).join(format!("{id}.json")))
    }

    async fn read_doc(&self, path: &Path) -> crate::Result<Option<Document>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_doc(&self, path: &Path, doc: &Document) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(doc)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, collection: &str, id: &str) -> crate::Result<Option<Document>> {
        let path = self.doc_path(collection, id)?;
        self.read_doc(&path).await
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: &str,
        writes: &WriteBatch,
    ) -> crate::Result<()> {
        let path = self.doc_path(collection, id)?;
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_doc(&path).await?.unwrap_or_default();
        writes.apply(&mut doc, Utc::now());
        self.write_doc(&path, &doc).await
    }

    async fn update(&self, collection: &str, id: &str, writes: &WriteBatch) -> crate::Result<()> {
        let path = self.doc_path(collection, id)?;
        let _guard = self.write_lock.lock().await;
        let mut doc = self
            .read_doc(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;
        writes.apply(&mut doc, Utc::now());
        self.write_doc(&path, &doc).await
    }

    async fn query(&self, query: &Query) -> crate::Result<Vec<(String, Document)>> {
        validate_component(&query.collection)?;
        let dir = self.root.join(&query.collection);

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut results = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(id) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_suffix(".json"))
            else {
                continue;
            };
            // Skip a temp file caught mid-rename.
            let Some(doc) = self.read_doc(&path).await? else {
                continue;
            };
            if query.matches(&doc) {
                results.push((id.to_string(), doc));
            }
        }

        results.sort_by(|(a, _), (b, _)| a.cmp(b));
        query.order_and_limit(&mut results);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        query::{Direction, Filter},
        value::Value,
    };

    use super::*;

    #[tokio::test]
    async fn round_trips_documents_with_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let now = Utc::now();
        store
            .set_merge(
                "mail",
                "m1",
                &WriteBatch::new()
                    .set("to", "a@x")
                    .set("createdAt", now)
                    .increment("smtpAgent.attempts", 1),
            )
            .await
            .unwrap();

        let doc = store.get("mail", "m1").await.unwrap().unwrap();
        assert_eq!(doc.get_path("to"), Some(&Value::from("a@x")));
        assert_eq!(doc.get_path("createdAt"), Some(&Value::Timestamp(now)));
        assert_eq!(
            doc.get_path("smtpAgent.attempts"),
            Some(&Value::Integer(1))
        );
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let result = store
            .update("mail", "absent", &WriteBatch::new().set("to", "a@x"))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn rejects_path_escaping_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for id in ["../escape", "a/b", "a\\b", "", ".hidden"] {
            assert!(matches!(
                store.get("mail", id).await,
                Err(StoreError::InvalidId(_))
            ));
        }
    }

    #[tokio::test]
    async fn query_scans_filter_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        for (id, minute) in [("m1", 3), ("m2", 1), ("m3", 2)] {
            store
                .set_merge(
                    "mail",
                    id,
                    &WriteBatch::new()
                        .set("smtpAgent.state", "SENT")
                        .set(
                            "smtpAgent.lastUpdatedAt",
                            chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 5, 1, 12, minute, 0)
                                .unwrap(),
                        ),
                )
                .await
                .unwrap();
        }

        let query = Query::collection("mail")
            .filter(Filter::Eq("smtpAgent.state".into(), Value::from("SENT")))
            .order_by("smtpAgent.lastUpdatedAt", Direction::Descending)
            .limit(2);
        let results = store.query(&query).await.unwrap();
        let ids: Vec<_> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m3"]);
    }
}
