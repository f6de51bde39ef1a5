//! Core data models for the agentkb pipeline.
//!
//! These types represent the documents, chunks, knowledge sources, and
//! usage records that flow through ingestion and retrieval.

use serde::{Deserialize, Serialize};

/// Processing lifecycle state of a [`Document`].
///
/// Transitions: `Pending -> Processing -> Completed | Failed`. Both end
/// states are terminal; re-processing requires an explicit reset to
/// `Pending` by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

/// An uploaded document and everything derived from it.
///
/// `extracted_text` is `Some` iff `status == Completed`. `chunks` is
/// populated by the separate chunking step and may lag behind a
/// `Completed` status.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub extracted_text: Option<String>,
    pub status: DocumentStatus,
    pub processing_error: Option<String>,
    pub text_length: i64,
    /// OCR language hint (Tesseract code, e.g. `"eng"`).
    pub language: String,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    /// Top keyword tags derived from the extracted text.
    pub tags: Vec<String>,
    pub chunks: Vec<Chunk>,
}

impl Document {
    /// A fresh `Pending` document as created at upload time.
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: i64,
        storage_path: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size_bytes,
            storage_path: storage_path.into(),
            extracted_text: None,
            status: DocumentStatus::Pending,
            processing_error: None,
            text_length: 0,
            language: "eng".to_string(),
            created_at: chrono::Utc::now().timestamp(),
            completed_at: None,
            tags: Vec::new(),
            chunks: Vec::new(),
        }
    }

    /// Text available for retrieval; empty until processing completed.
    pub fn text(&self) -> &str {
        self.extracted_text.as_deref().unwrap_or("")
    }

    /// Whether any chunk carries an embedding vector.
    pub fn has_embeddings(&self) -> bool {
        self.chunks.iter().any(|c| c.embedding.is_some())
    }
}

/// A window of a document's extracted text.
///
/// Offsets are character offsets into the parent's full text. Consecutive
/// chunks overlap by the configured amount, and `start`/`end` are assigned
/// in a single deterministic pass so re-chunking reproduces the sequence.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_index: i64,
    pub text: String,
    pub start: usize,
    pub end: usize,
    /// Embedding of exactly this chunk's text, if computed.
    pub embedding: Option<Vec<f32>>,
    /// Parent document label used for citation.
    pub source_label: String,
}

/// A knowledge source attached to an agent profile.
///
/// Exactly one backing value per kind, enforced by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KnowledgeSource {
    /// References a stored [`Document`] by id.
    Document { document_id: String },
    /// A public `http(s)` URL fetched at query time.
    Website { url: String },
    /// Inline free text.
    Text { content: String },
    /// Inline question/answer pairs.
    Qa { content: String },
}

impl KnowledgeSource {
    /// Validating constructor for website sources.
    pub fn website(url: impl Into<String>) -> anyhow::Result<Self> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("invalid website URL (must be http(s)): {}", url);
        }
        Ok(KnowledgeSource::Website { url })
    }

    /// Human-readable kind name used in context attribution prefixes.
    pub fn kind_name(&self) -> &'static str {
        match self {
            KnowledgeSource::Document { .. } => "document",
            KnowledgeSource::Website { .. } => "website",
            KnowledgeSource::Text { .. } => "text",
            KnowledgeSource::Qa { .. } => "qa",
        }
    }
}

/// Model parameters forwarded to the completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A chat agent persona: system prompt, model parameters, and knowledge
/// sources. The retrieval core treats this as an opaque configuration
/// carrier owned by external CRUD.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub name: String,
    pub system_prompt: String,
    pub params: ModelParams,
    pub sources: Vec<KnowledgeSource>,
}

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token counts reported by a completion response.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Cost accounting attached to one completion call.
///
/// `customer_price >= cost` whenever the markup is non-negative; monetary
/// values are rounded before storage.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost: f64,
    pub customer_price: f64,
}
