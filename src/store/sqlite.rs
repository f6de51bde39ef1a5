//! SQLite-backed [`Store`] used by the CLI.
//!
//! Documents and chunks live in two tables; chunk embeddings are stored
//! as little-endian f32 BLOBs. Saves replace the whole record (delete +
//! re-insert chunks) inside a transaction so a document and its chunks
//! never go out of sync.

use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::config::DbConfig;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{Chunk, Document, DocumentStatus};
use crate::store::Store;

const POOL_MAX_CONNECTIONS: u32 = 5;

/// Open a WAL-mode pool on the configured database file, creating the
/// file and its parent directory if needed.
pub async fn connect(db: &DbConfig) -> Result<SqlitePool> {
    if let Some(parent) = db.path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db.path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    Ok(SqlitePoolOptions::new()
        .max_connections(POOL_MAX_CONNECTIONS)
        .connect_with(options)
        .await?)
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(db: &DbConfig) -> Result<Self> {
        Ok(Self::new(connect(db).await?))
    }

    fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Document {
        let status_str: String = row.get("status");
        let tags_json: String = row.get("tags_json");
        Document {
            id: row.get("id"),
            file_name: row.get("file_name"),
            mime_type: row.get("mime_type"),
            size_bytes: row.get("size_bytes"),
            storage_path: row.get("storage_path"),
            extracted_text: row.get("extracted_text"),
            status: DocumentStatus::parse(&status_str).unwrap_or(DocumentStatus::Pending),
            processing_error: row.get("processing_error"),
            text_length: row.get("text_length"),
            language: row.get("language"),
            created_at: row.get("created_at"),
            completed_at: row.get("completed_at"),
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            chunks: Vec::new(),
        }
    }

    async fn load_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT chunk_index, text, start_offset, end_offset, embedding, source_label \
             FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let start: i64 = row.get("start_offset");
                let end: i64 = row.get("end_offset");
                let embedding: Option<Vec<u8>> = row.get("embedding");
                Chunk {
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    start: start as usize,
                    end: end as usize,
                    embedding: embedding.as_deref().map(blob_to_vec),
                    source_label: row.get("source_label"),
                }
            })
            .collect())
    }
}

const DOCUMENT_COLUMNS: &str = "id, file_name, mime_type, size_bytes, storage_path, \
     extracted_text, status, processing_error, text_length, language, \
     created_at, completed_at, tags_json";

#[async_trait]
impl Store for SqliteStore {
    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let mut doc = match row {
            Some(row) => Self::document_from_row(&row),
            None => return Ok(None),
        };
        doc.chunks = self.load_chunks(&doc.id).await?;
        Ok(Some(doc))
    }

    async fn get_documents(&self, ids: &[String]) -> Result<Vec<Document>> {
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.get_document(id).await? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    async fn save_document(&self, document: &Document) -> Result<()> {
        let tags_json = serde_json::to_string(&document.tags)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT OR REPLACE INTO documents ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            DOCUMENT_COLUMNS
        ))
        .bind(&document.id)
        .bind(&document.file_name)
        .bind(&document.mime_type)
        .bind(document.size_bytes)
        .bind(&document.storage_path)
        .bind(&document.extracted_text)
        .bind(document.status.as_str())
        .bind(&document.processing_error)
        .bind(document.text_length)
        .bind(&document.language)
        .bind(document.created_at)
        .bind(document.completed_at)
        .bind(&tags_json)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(&document.id)
            .execute(&mut *tx)
            .await?;

        for chunk in &document.chunks {
            sqlx::query(
                "INSERT INTO chunks (document_id, chunk_index, text, start_offset, end_offset, embedding, source_label) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&document.id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(chunk.start as i64)
            .bind(chunk.end as i64)
            .bind(chunk.embedding.as_deref().map(vec_to_blob))
            .bind(&chunk.source_label)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY created_at DESC, id ASC",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        // Listings skip chunk loading; callers needing chunks fetch by id.
        Ok(rows.iter().map(Self::document_from_row).collect())
    }
}
