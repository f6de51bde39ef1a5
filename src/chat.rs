//! Chat completion client and the conversation-turn orchestrator.
//!
//! `run_turn` wires the whole query path together: resolve the agent's
//! knowledge sources, retrieve relevant context, assemble the prompt,
//! call the completion model, and account for the tokens used. Context
//! assembly degrades gracefully (a turn with no usable context still
//! reaches the model); a completion failure after retries is the one
//! error that propagates.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::models::{
    AgentProfile, ChatMessage, KnowledgeSource, ModelParams, TokenUsage, UsageRecord,
};
use crate::pricing::PricingTable;
use crate::prompt::build_messages;
use crate::resolver::build_context;
use crate::retrieval::{RetrievalEngine, NO_MATCH_SENTINEL};
use crate::store::Store;

/// Reply used when the model returns an empty message body.
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I couldn't generate a response. Please try rephrasing your question.";

/// One completion response: the reply text and the provider's token
/// counts.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// A chat completion backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], params: &ModelParams) -> Result<Completion>;
}

/// Client for the OpenAI `POST /v1/chat/completions` endpoint.
///
/// Requires the `OPENAI_API_KEY` environment variable. Retries follow
/// the same policy as the embedder: 429 and 5xx with exponential
/// backoff, other 4xx fail immediately.
pub struct OpenAiCompletionClient {
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiCompletionClient {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.completion.timeout_secs))
            .build()?;

        Ok(Self {
            api_key,
            max_retries: config.completion.max_retries,
            client,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, messages: &[ChatMessage], params: &ModelParams) -> Result<Completion> {
        let body = serde_json::json!({
            "model": params.model,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "messages": messages,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/chat/completions")
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
                        return parse_completion_response(&json);
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

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }
}

fn parse_completion_response(json: &serde_json::Value) -> Result<Completion> {
    let text = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))?
        .to_string();

    let usage = TokenUsage {
        prompt_tokens: json
            .pointer("/usage/prompt_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
        completion_tokens: json
            .pointer("/usage/completion_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
    };

    Ok(Completion { text, usage })
}

/// Everything a caller needs from one finished turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub usage: UsageRecord,
    /// Whether any knowledge context made it into the prompt.
    pub context_used: bool,
}

/// Run one conversation turn for an agent.
///
/// Context flows in two streams: document sources go through the
/// retrieval engine (ranked against the user's message), while website,
/// text, and qa sources are resolved whole. Either stream failing or
/// coming back empty narrows the context rather than failing the turn.
#[allow(clippy::too_many_arguments)]
pub async fn run_turn(
    store: &dyn Store,
    http: &reqwest::Client,
    completion: &dyn CompletionClient,
    engine: &RetrievalEngine,
    embedder: Option<&dyn Embedder>,
    pricing: &PricingTable,
    config: &Config,
    profile: &AgentProfile,
    history: &[ChatMessage],
    user_message: &str,
) -> Result<TurnOutcome> {
    // Document sources are ranked against the query.
    let doc_ids: Vec<String> = profile
        .sources
        .iter()
        .filter_map(|s| match s {
            KnowledgeSource::Document { document_id } => Some(document_id.clone()),
            _ => None,
        })
        .collect();
    let documents = match store.get_documents(&doc_ids).await {
        Ok(docs) => docs,
        Err(e) => {
            eprintln!("Warning: loading document sources failed: {}", e);
            Vec::new()
        }
    };
    let retrieved = engine
        .retrieve_context(user_message, &documents, embedder)
        .await;

    // Everything else is resolved whole.
    let other_sources: Vec<KnowledgeSource> = profile
        .sources
        .iter()
        .filter(|s| !matches!(s, KnowledgeSource::Document { .. }))
        .cloned()
        .collect();
    let resolved = build_context(store, http, user_message, &other_sources).await;

    let mut context_parts = Vec::new();
    // The sentinel means scoring ran and matched nothing; the turn
    // proceeds without document context rather than telling the model
    // there is knowledge it must defer to.
    if !retrieved.is_empty() && retrieved != NO_MATCH_SENTINEL {
        context_parts.push(retrieved);
    }
    if !resolved.is_empty() {
        context_parts.push(resolved);
    }
    let context = context_parts.join("\n\n");
    let context_used = !context.is_empty();

    let messages = build_messages(
        &profile.system_prompt,
        if context_used {
            Some(context.as_str())
        } else {
            None
        },
        history,
        user_message,
        config.completion.history_window,
    );

    let result = completion.complete(&messages, &profile.params).await?;

    let reply = if result.text.trim().is_empty() {
        FALLBACK_REPLY.to_string()
    } else {
        result.text
    };

    Ok(TurnOutcome {
        reply,
        usage: pricing.calculate(&profile.params.model, result.usage),
        context_used,
    })
}
