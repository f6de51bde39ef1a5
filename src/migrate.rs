use anyhow::Result;

use crate::config::Config;
use crate::store::sqlite::connect;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = connect(&config.db).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            storage_path TEXT NOT NULL,
            extracted_text TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            processing_error TEXT,
            text_length INTEGER NOT NULL DEFAULT 0,
            language TEXT NOT NULL DEFAULT 'eng',
            created_at INTEGER NOT NULL,
            completed_at INTEGER,
            tags_json TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            embedding BLOB,
            source_label TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at DESC)",
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
