//! Document ingestion: extraction, cleanup, tagging, and chunking.
//!
//! `process_document` drives the status state machine
//! (`pending -> processing -> completed | failed`). Failures are recorded
//! on a freshly reloaded record so a concurrent writer's changes are not
//! clobbered by the failure write.

use anyhow::{bail, Result};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::extract::extract_text;
use crate::models::DocumentStatus;
use crate::store::Store;
use crate::text::{collapse_whitespace, extract_keywords, fix_ocr_artifacts, strip_header_footer};

const TAG_LIMIT: usize = 20;

/// Run extraction and cleanup for one stored document.
///
/// On success the document ends `Completed` with `extracted_text`,
/// `text_length` (chars), `tags`, and `completed_at` set. On failure it
/// ends `Failed` with `processing_error` set and the error is propagated.
pub async fn process_document(store: &dyn Store, id: &str) -> Result<()> {
    let mut doc = match store.get_document(id).await? {
        Some(doc) => doc,
        None => bail!("document not found: {}", id),
    };

    doc.status = DocumentStatus::Processing;
    doc.processing_error = None;
    store.save_document(&doc).await?;

    match extract_and_clean(&doc.storage_path, &doc.mime_type, &doc.language).await {
        Ok(text) => {
            doc.text_length = text.chars().count() as i64;
            doc.tags = extract_keywords(&text, TAG_LIMIT);
            doc.extracted_text = Some(text);
            doc.status = DocumentStatus::Completed;
            doc.completed_at = Some(chrono::Utc::now().timestamp());
            store.save_document(&doc).await?;
            Ok(())
        }
        Err(e) => {
            // Reload before recording the failure; extraction may have
            // been slow and the record touched in the meantime.
            if let Some(mut fresh) = store.get_document(id).await? {
                fresh.status = DocumentStatus::Failed;
                fresh.processing_error = Some(e.to_string());
                store.save_document(&fresh).await?;
            }
            Err(e)
        }
    }
}

async fn extract_and_clean(path: &str, mime_type: &str, language: &str) -> Result<String> {
    let raw = extract_text(std::path::Path::new(path), mime_type, language).await?;

    // OCR output gets artifact repair before the line structure is
    // flattened; header/footer stripping needs the original lines too.
    let repaired = if mime_type.starts_with("image/") {
        fix_ocr_artifacts(&raw)
    } else {
        raw
    };
    let stripped = strip_header_footer(&repaired);
    Ok(collapse_whitespace(&stripped))
}

/// Split a completed document's text into overlapping chunks and persist
/// them, replacing any previous chunk set (embeddings included).
pub async fn chunk_document(store: &dyn Store, id: &str, config: &Config) -> Result<usize> {
    let mut doc = match store.get_document(id).await? {
        Some(doc) => doc,
        None => bail!("document not found: {}", id),
    };

    if doc.status != DocumentStatus::Completed {
        bail!(
            "document {} is not processed (status: {})",
            id,
            doc.status.as_str()
        );
    }
    let text = doc.text().to_string();
    if text.is_empty() {
        bail!("document {} has no extracted text to chunk", id);
    }

    doc.chunks = chunk_text(
        &text,
        config.chunking.chunk_size,
        config.chunking.overlap,
        &doc.file_name,
    );
    let count = doc.chunks.len();
    store.save_document(&doc).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::store::InMemoryStore;
    use std::io::Write;

    fn test_config() -> Config {
        toml::from_str("[db]\npath = \":memory:\"\n").unwrap()
    }

    async fn add_file_doc(store: &InMemoryStore, name: &str, mime: &str, content: &str) -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        // Leak the tempdir so the file outlives this helper.
        std::mem::forget(dir);

        let doc = Document::new(
            name,
            mime,
            content.len() as i64,
            path.to_string_lossy().to_string(),
        );
        let id = doc.id.clone();
        store.save_document(&doc).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_process_text_document_completes() {
        let store = InMemoryStore::new();
        let id = add_file_doc(
            &store,
            "notes.txt",
            "text/plain",
            "Billing happens monthly. Invoices arrive by email.",
        )
        .await;

        process_document(&store, &id).await.unwrap();

        let doc = store.get_document(&id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Completed);
        assert!(doc.text().contains("Billing happens monthly"));
        assert_eq!(doc.text_length, doc.text().chars().count() as i64);
        assert!(doc.completed_at.is_some());
        assert!(doc.tags.contains(&"billing".to_string()));
        assert!(doc.processing_error.is_none());
    }

    #[tokio::test]
    async fn test_process_unsupported_mime_fails() {
        let store = InMemoryStore::new();
        let id = add_file_doc(&store, "a.bin", "application/octet-stream", "junk").await;

        let err = process_document(&store, &id).await;
        assert!(err.is_err());

        let doc = store.get_document(&id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert!(doc
            .processing_error
            .as_deref()
            .unwrap()
            .contains("unsupported"));
        assert!(doc.extracted_text.is_none());
    }

    #[tokio::test]
    async fn test_process_missing_document() {
        let store = InMemoryStore::new();
        assert!(process_document(&store, "nope").await.is_err());
    }

    #[tokio::test]
    async fn test_chunk_document_requires_completed() {
        let store = InMemoryStore::new();
        let doc = Document::new("a.txt", "text/plain", 5, "/tmp/a.txt");
        let id = doc.id.clone();
        store.save_document(&doc).await.unwrap();

        assert!(chunk_document(&store, &id, &test_config()).await.is_err());
    }

    #[tokio::test]
    async fn test_chunk_document_replaces_chunks() {
        let store = InMemoryStore::new();
        let long_text = "word ".repeat(600);
        let id = add_file_doc(&store, "long.txt", "text/plain", &long_text).await;

        let config = test_config();
        process_document(&store, &id).await.unwrap();

        let first = chunk_document(&store, &id, &config).await.unwrap();
        assert!(first > 1);
        let second = chunk_document(&store, &id, &config).await.unwrap();
        assert_eq!(first, second);

        let doc = store.get_document(&id).await.unwrap().unwrap();
        assert_eq!(doc.chunks.len(), first);
        assert_eq!(doc.chunks[0].source_label, "long.txt");
    }
}
