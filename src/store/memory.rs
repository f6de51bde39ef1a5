//! In-memory [`Store`] used by tests and as a fixture backend.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::Document;
use crate::store::Store;

/// Stores documents in a map guarded by a `tokio` RwLock. Cheap clones on
/// read; the map owns the canonical copies.
#[derive(Default)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn get_documents(&self, ids: &[String]) -> Result<Vec<Document>> {
        let map = self.documents.read().await;
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn save_document(&self, document: &Document) -> Result<()> {
        self.documents
            .write()
            .await
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        Ok(self.documents.write().await.remove(id).is_some())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let map = self.documents.read().await;
        let mut docs: Vec<Document> = map.values().cloned().collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_get_delete() {
        let store = InMemoryStore::new();
        let doc = Document::new("a.txt", "text/plain", 3, "/tmp/a.txt");
        let id = doc.id.clone();

        store.save_document(&doc).await.unwrap();
        let loaded = store.get_document(&id).await.unwrap().unwrap();
        assert_eq!(loaded.file_name, "a.txt");

        assert!(store.delete_document(&id).await.unwrap());
        assert!(!store.delete_document(&id).await.unwrap());
        assert!(store.get_document(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_documents_skips_unknown_ids() {
        let store = InMemoryStore::new();
        let a = Document::new("a.txt", "text/plain", 1, "/tmp/a");
        let b = Document::new("b.txt", "text/plain", 1, "/tmp/b");
        store.save_document(&a).await.unwrap();
        store.save_document(&b).await.unwrap();

        let ids = vec![a.id.clone(), "missing".to_string(), b.id.clone()];
        let docs = store.get_documents(&ids).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, a.id);
        assert_eq!(docs[1].id, b.id);
    }

    #[tokio::test]
    async fn test_save_replaces_existing() {
        let store = InMemoryStore::new();
        let mut doc = Document::new("a.txt", "text/plain", 3, "/tmp/a.txt");
        store.save_document(&doc).await.unwrap();

        doc.extracted_text = Some("hello".to_string());
        store.save_document(&doc).await.unwrap();

        let loaded = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.text(), "hello");
    }
}
