//! Embedding client and vector utilities.
//!
//! Defines the [`Embedder`] trait and its concrete implementations:
//! - **[`DisabledEmbedder`]** — returns errors; used when embeddings are
//!   not configured.
//! - **[`OpenAiEmbedder`]** — calls the OpenAI embeddings API with retry
//!   and exponential backoff.
//!
//! Also provides the vector helpers used across retrieval and storage:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 codecs for
//!   SQLite BLOB storage
//!
//! # Retry Strategy
//!
//! The OpenAI embedder retries transient errors with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::store::Store;

/// An embedding backend: text in, fixed-dimensionality vector out.
///
/// A failed call propagates its error; callers decide whether to skip the
/// item or abort (see [`embed_document_chunks`] for the per-chunk
/// isolation policy).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Create the appropriate [`Embedder`] from configuration.
///
/// Returns an error for unknown provider names or when the OpenAI
/// embedder cannot be initialized (missing config or API key).
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// A no-op embedder that always returns errors.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled")
    }
}

/// Embedding client for the OpenAI `POST /v1/embeddings` endpoint.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embedding_response(&json);
                    }

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429), don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

/// Pull `data[0].embedding` out of the OpenAI response JSON.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Embed every chunk of a document that does not yet carry an embedding.
///
/// Chunks must already exist (run chunking first). Per-chunk failures are
/// isolated: the chunk is left without an embedding and the batch
/// continues, so re-running after a partial failure only fills gaps.
/// A fixed delay between calls respects provider rate limits.
///
/// Returns `(embedded, skipped, failed)` counts.
pub async fn embed_document_chunks(
    store: &dyn Store,
    embedder: &dyn Embedder,
    config: &EmbeddingConfig,
    document_id: &str,
) -> Result<(u64, u64, u64)> {
    let mut doc = store
        .get_document(document_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("document not found: {}", document_id))?;

    if doc.chunks.is_empty() {
        bail!(
            "document {} has no chunks; run chunking before embedding",
            document_id
        );
    }

    let delay = Duration::from_millis(config.request_delay_ms);
    let mut embedded = 0u64;
    let mut skipped = 0u64;
    let mut failed = 0u64;
    let mut first_call = true;

    for chunk in doc.chunks.iter_mut() {
        if chunk.embedding.is_some() {
            skipped += 1;
            continue;
        }
        if !first_call {
            tokio::time::sleep(delay).await;
        }
        first_call = false;

        match embedder.embed(&chunk.text).await {
            Ok(vector) => {
                chunk.embedding = Some(vector);
                embedded += 1;
            }
            Err(e) => {
                eprintln!(
                    "Warning: embedding failed for chunk {} of {}: {}",
                    chunk.chunk_index, document_id, e
                );
                failed += 1;
            }
        }
    }

    store.save_document(&doc).await?;
    Ok((embedded, skipped, failed))
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for empty vectors,
/// vectors of different lengths, or zero-magnitude vectors — degenerate
/// input must never abort a ranking pass.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_symmetry() {
        let a = vec![0.3, 0.7, 0.1];
        let b = vec![0.9, 0.2, 0.4];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_cosine_zero_vector() {
        let a = vec![1.0, 2.0, 3.0];
        let z = vec![0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &z), 0.0);
    }

    #[test]
    fn test_cosine_empty() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_cosine_different_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[tokio::test]
    async fn disabled_embedder_errors() {
        let err = DisabledEmbedder.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
