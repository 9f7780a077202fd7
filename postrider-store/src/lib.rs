//! Document store contract and typed adapters for postrider.
//!
//! The store itself is an external collaborator with a narrow contract:
//! document-level `get`/`set_merge`/`update`, a small set of queryable
//! filters, and two write sentinels (server timestamp and numeric
//! increment). [`DocumentStore`] captures that contract; the bundled
//! backends are [`MemoryStore`] (tests, transient use) and [`FileStore`]
//! (local durability). [`MailStore`] and [`AdminStore`] are the typed
//! wrappers the rest of the system talks to.

pub mod admin;
pub mod backends;
pub mod error;
pub mod mail;
pub mod query;
pub mod value;
pub mod write;

use std::sync::Arc;

use async_trait::async_trait;
use postrider_common::config::StoreConfig;

pub use admin::{AdminOverrides, AdminStore};
pub use backends::{FileStore, MemoryStore};
pub use error::{Result, StoreError};
pub use mail::{AgentState, CandidateBatch, MailSnapshot, MailStore};
pub use query::{Direction, Filter, Query};
pub use value::{Document, Value};
pub use write::{FieldWrite, WriteBatch};

/// The document store contract.
///
/// Writes are maps of dotted field paths to [`FieldWrite`]; the backend
/// resolves `ServerNow` against its own clock and `Increment` against the
/// stored value at commit time.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document, `None` when it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Merge fields into a document, creating it when missing.
    async fn set_merge(&self, collection: &str, id: &str, writes: &WriteBatch) -> Result<()>;

    /// Merge fields into an existing document.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` when the document does not exist.
    async fn update(&self, collection: &str, id: &str, writes: &WriteBatch) -> Result<()>;

    /// Run a filtered scan. Results carry the document id; ordering and
    /// limits follow the query.
    async fn query(&self, query: &Query) -> Result<Vec<(String, Document)>>;
}

/// Open the document store named by the configuration.
///
/// `file://<dir>` endpoints and plain paths select the bundled
/// [`FileStore`]. A remote endpoint requires the credentials file to exist
/// and is otherwise rejected as unsupported in this build; both are fatal
/// startup failures for the binary.
///
/// # Errors
///
/// `CredentialsNotFound` or `UnsupportedEndpoint` per the rules above, or
/// any I/O error opening the file backend.
pub fn connect(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    let url = config.database_url.trim();

    if let Some(path) = url.strip_prefix("file://") {
        return Ok(Arc::new(FileStore::open(path)?));
    }
    if !url.contains("://") {
        return Ok(Arc::new(FileStore::open(url)?));
    }

    if !config.credentials_path.exists() {
        return Err(StoreError::CredentialsNotFound(
            config.credentials_path.clone(),
        ));
    }
    Err(StoreError::UnsupportedEndpoint(url.to_string()))
}
