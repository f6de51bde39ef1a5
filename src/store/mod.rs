//! Document persistence behind a trait, so the pipeline and tests run
//! against an in-memory store while the CLI uses SQLite.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Document;

/// Persistence seam for documents and their chunks. Documents are saved
/// whole (chunks and embeddings included); state transitions are a
/// read-modify-write of the full record.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch one document by id, chunks included.
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Fetch a batch of documents by id. Unknown ids are skipped, not
    /// errors; result order follows the input ids.
    async fn get_documents(&self, ids: &[String]) -> Result<Vec<Document>>;

    /// Insert or replace a document record, chunks included.
    async fn save_document(&self, document: &Document) -> Result<()>;

    /// Delete a document and its chunks. Returns whether it existed.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// List all document ids with file names and statuses, newest first.
    async fn list_documents(&self) -> Result<Vec<Document>>;
}
