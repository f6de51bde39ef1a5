//! End-to-end pipeline tests over the in-memory store: add, process,
//! chunk, embed, retrieve, and run a full chat turn with a scripted
//! completion client.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use agentkb::cache::QueryCache;
use agentkb::chat::{run_turn, Completion, CompletionClient};
use agentkb::config::Config;
use agentkb::embedding::{embed_document_chunks, Embedder};
use agentkb::ingest::{chunk_document, process_document};
use agentkb::models::{
    AgentProfile, ChatMessage, Document, DocumentStatus, KnowledgeSource, ModelParams, TokenUsage,
};
use agentkb::pricing::PricingTable;
use agentkb::retrieval::{RetrievalEngine, NO_MATCH_SENTINEL};
use agentkb::store::{InMemoryStore, Store};

fn test_config() -> Config {
    toml::from_str(
        r#"
[db]
path = ":memory:"

[embedding]
request_delay_ms = 0
"#,
    )
    .unwrap()
}

fn fresh_engine(config: &Config) -> RetrievalEngine {
    RetrievalEngine::with_cache(
        config.retrieval.clone(),
        QueryCache::new(Duration::from_secs(60)),
    )
}

/// Write `content` to a temp file and register it as a pending document.
/// Returns the document id and the tempdir keeping the file alive.
async fn add_document(
    store: &InMemoryStore,
    name: &str,
    mime: &str,
    content: &str,
) -> (String, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();

    let doc = Document::new(
        name,
        mime,
        content.len() as i64,
        path.to_string_lossy().to_string(),
    );
    let id = doc.id.clone();
    store.save_document(&doc).await.unwrap();
    (id, dir)
}

#[tokio::test]
async fn text_document_reaches_completed() {
    let store = InMemoryStore::new();
    let (id, _dir) = add_document(
        &store,
        "manual.txt",
        "text/plain",
        "The reset button sits behind the panel.\n\nHold it for ten seconds to restart.",
    )
    .await;

    process_document(&store, &id).await.unwrap();

    let doc = store.get_document(&id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Completed);
    assert!(doc.completed_at.is_some());
    assert!(doc.text().contains("reset button"));
    assert!(!doc.tags.is_empty());
}

#[tokio::test]
async fn unsupported_mime_reaches_failed() {
    let store = InMemoryStore::new();
    let (id, _dir) = add_document(&store, "blob.bin", "application/octet-stream", "junk").await;

    assert!(process_document(&store, &id).await.is_err());

    let doc = store.get_document(&id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
    assert!(doc.processing_error.is_some());
    assert!(doc.extracted_text.is_none());
}

struct CountingEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        "counting"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![1.0, 0.0, 0.0])
    }
}

#[tokio::test]
async fn embedding_resumes_without_rework() {
    let store = InMemoryStore::new();
    let config = test_config();

    // Enough text for several chunks at the default window size.
    let body = "knowledge ".repeat(500);
    let (id, _dir) = add_document(&store, "big.txt", "text/plain", &body).await;
    process_document(&store, &id).await.unwrap();
    let chunk_count = chunk_document(&store, &id, &config).await.unwrap();
    assert!(chunk_count >= 3, "expected several chunks, got {}", chunk_count);

    // Pre-embed one chunk to simulate a partial earlier run.
    let mut doc = store.get_document(&id).await.unwrap().unwrap();
    doc.chunks[1].embedding = Some(vec![0.5, 0.5, 0.0]);
    store.save_document(&doc).await.unwrap();

    let embedder = CountingEmbedder {
        calls: AtomicUsize::new(0),
    };
    let (embedded, skipped, failed) =
        embed_document_chunks(&store, &embedder, &config.embedding, &id)
            .await
            .unwrap();

    assert_eq!(embedded as usize, chunk_count - 1);
    assert_eq!(skipped, 1);
    assert_eq!(failed, 0);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), chunk_count - 1);

    let doc = store.get_document(&id).await.unwrap().unwrap();
    assert!(doc.chunks.iter().all(|c| c.embedding.is_some()));
    // The pre-embedded chunk was not overwritten.
    assert_eq!(doc.chunks[1].embedding.as_ref().unwrap()[0], 0.5);
}

#[tokio::test]
async fn retrieval_prefers_matching_sections() {
    let store = InMemoryStore::new();
    let config = test_config();
    let (id, _dir) = add_document(
        &store,
        "faq.txt",
        "text/plain",
        "Refunds are issued within five business days of a refund request.\n\n\
         Shipping takes two weeks for international orders placed online.\n\n\
         Our office is closed on public holidays every year.",
    )
    .await;
    process_document(&store, &id).await.unwrap();
    let doc = store.get_document(&id).await.unwrap().unwrap();

    let engine = fresh_engine(&config);
    let context = engine.retrieve_context("refund policy", &[doc], None).await;

    assert!(context.contains("Refunds are issued"));
    assert!(context.contains("faq.txt"));
}

#[tokio::test]
async fn url_question_finds_raw_url() {
    let store = InMemoryStore::new();
    let config = test_config();
    let (id, _dir) = add_document(
        &store,
        "api.txt",
        "text/plain",
        "zz qq ww.\n\nee https://api.example.com/v1 rr.",
    )
    .await;
    process_document(&store, &id).await.unwrap();
    let doc = store.get_document(&id).await.unwrap().unwrap();

    let engine = fresh_engine(&config);
    let context = engine
        .retrieve_context("what is the base URL", &[doc], None)
        .await;

    assert_ne!(context, NO_MATCH_SENTINEL);
    assert!(context.contains("https://api.example.com/v1"), "got: {}", context);
}

#[tokio::test]
async fn empty_inputs_stay_neutral() {
    let config = test_config();
    let engine = fresh_engine(&config);
    assert_eq!(engine.retrieve_context("", &[], None).await, "");
    assert_eq!(engine.retrieve_context("anything", &[], None).await, "");
}

struct ScriptedClient {
    reply: String,
    seen_system: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, messages: &[ChatMessage], _params: &ModelParams) -> Result<Completion> {
        self.seen_system
            .lock()
            .unwrap()
            .push(messages[0].content.clone());
        Ok(Completion {
            text: self.reply.clone(),
            usage: TokenUsage {
                prompt_tokens: 200,
                completion_tokens: 80,
            },
        })
    }
}

#[tokio::test]
async fn full_turn_over_processed_document() {
    let store = InMemoryStore::new();
    let config = test_config();
    let (id, _dir) = add_document(
        &store,
        "pricing.txt",
        "text/plain",
        "Our plan costs $19 per month. Contact sales at sales@example.com for enterprise pricing.",
    )
    .await;
    process_document(&store, &id).await.unwrap();

    let client = ScriptedClient {
        reply: "The plan costs $19 per month.".to_string(),
        seen_system: Mutex::new(Vec::new()),
    };
    let profile = AgentProfile {
        name: "support".to_string(),
        system_prompt: "You are a support agent.".to_string(),
        params: ModelParams {
            model: "gpt-4".to_string(),
            temperature: 0.3,
            max_tokens: 256,
        },
        sources: vec![KnowledgeSource::Document { document_id: id }],
    };

    let engine = fresh_engine(&config);
    let pricing = PricingTable::new(config.pricing.clone());
    let outcome = run_turn(
        &store,
        &reqwest::Client::new(),
        &client,
        &engine,
        None,
        &pricing,
        &config,
        &profile,
        &[],
        "how much does it cost",
    )
    .await
    .unwrap();

    assert!(outcome.context_used);
    assert_eq!(outcome.reply, "The plan costs $19 per month.");
    assert_eq!(outcome.usage.total_tokens, 280);
    // gpt-4: 200/1000*0.03 + 80/1000*0.06 = 0.0108
    assert!((outcome.usage.cost - 0.0108).abs() < 1e-9);
    assert!((outcome.usage.customer_price - 0.01404).abs() < 1e-9);

    let systems = client.seen_system.lock().unwrap();
    assert!(systems[0].contains("19"), "context missing from system message");
    assert!(systems[0].contains("pricing.txt"));
}
