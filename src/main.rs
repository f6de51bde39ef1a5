//! # agentkb CLI
//!
//! Command-line interface for the agentkb knowledge-base backend. It
//! drives the full document pipeline and a one-shot retrieval-augmented
//! chat turn.
//!
//! ## Usage
//!
//! ```bash
//! agentkb --config ./config/agentkb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `agentkb init` | Create the SQLite database and run schema migrations |
//! | `agentkb add <path>` | Register a file as a pending document |
//! | `agentkb process <id>` | Extract and clean a document's text |
//! | `agentkb chunk <id>` | Split a processed document into chunks |
//! | `agentkb embed <id>` | Embed a document's chunks |
//! | `agentkb list` | List stored documents |
//! | `agentkb delete <id>` | Delete a document and its chunks |
//! | `agentkb context "<query>"` | Show the retrieved context for a query |
//! | `agentkb ask "<message>"` | Run one retrieval-augmented chat turn |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use agentkb::chat::{run_turn, OpenAiCompletionClient};
use agentkb::config::{self, Config};
use agentkb::embedding::{create_embedder, embed_document_chunks, Embedder};
use agentkb::models::{AgentProfile, Document, KnowledgeSource, ModelParams};
use agentkb::pricing::PricingTable;
use agentkb::retrieval::RetrievalEngine;
use agentkb::store::{SqliteStore, Store};
use agentkb::{ingest, migrate};

/// agentkb — document ingestion and retrieval backend for chat agents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "agentkb",
    about = "agentkb — document ingestion and retrieval backend for chat agents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/agentkb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents and chunks
    /// tables. Idempotent.
    Init,

    /// Register a file as a pending document.
    ///
    /// Records the file's path, size, and MIME type; extraction happens
    /// later via `process`.
    Add {
        /// Path to the file.
        path: PathBuf,

        /// MIME type override. Guessed from the extension when omitted.
        #[arg(long)]
        mime: Option<String>,

        /// OCR language hint (Tesseract code) for image documents.
        #[arg(long, default_value = "eng")]
        language: String,
    },

    /// Extract and clean a document's text.
    Process {
        /// Document id.
        id: String,
    },

    /// Split a processed document into overlapping chunks.
    Chunk {
        /// Document id.
        id: String,
    },

    /// Embed a document's chunks with the configured provider.
    ///
    /// Skips chunks that already carry an embedding, so re-running after
    /// a partial failure only fills the gaps.
    Embed {
        /// Document id.
        id: String,
    },

    /// List stored documents.
    List,

    /// Delete a document and its chunks.
    Delete {
        /// Document id.
        id: String,
    },

    /// Show the context retrieval would inject for a query.
    Context {
        /// The query string.
        query: String,

        /// Restrict to specific document ids (repeatable). Defaults to
        /// all stored documents.
        #[arg(long = "doc")]
        docs: Vec<String>,
    },

    /// Run one retrieval-augmented chat turn.
    ///
    /// Requires the `OPENAI_API_KEY` environment variable.
    Ask {
        /// The user message.
        message: String,

        /// Restrict to specific document ids (repeatable). Defaults to
        /// all stored documents.
        #[arg(long = "doc")]
        docs: Vec<String>,

        /// System prompt for the turn.
        #[arg(long, default_value = "You are a helpful assistant.")]
        system: String,

        /// Model override; defaults to the configured completion model.
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Add {
            path,
            mime,
            language,
        } => {
            let store = open_store(&cfg).await?;
            run_add(&store, &path, mime, language).await?;
        }
        Commands::Process { id } => {
            let store = open_store(&cfg).await?;
            ingest::process_document(&store, &id).await?;
            let doc = store.get_document(&id).await?;
            if let Some(doc) = doc {
                println!("Processed {} ({})", doc.file_name, doc.status.as_str());
                println!("  text length: {} chars", doc.text_length);
                println!("  tags:        {}", doc.tags.join(", "));
            }
        }
        Commands::Chunk { id } => {
            let store = open_store(&cfg).await?;
            let count = ingest::chunk_document(&store, &id, &cfg).await?;
            println!("Created {} chunks.", count);
        }
        Commands::Embed { id } => {
            let store = open_store(&cfg).await?;
            let embedder = create_embedder(&cfg.embedding)?;
            let (embedded, skipped, failed) =
                embed_document_chunks(&store, embedder.as_ref(), &cfg.embedding, &id).await?;
            println!(
                "Embedded {} chunks ({} already embedded, {} failed).",
                embedded, skipped, failed
            );
        }
        Commands::List => {
            let store = open_store(&cfg).await?;
            let docs = store.list_documents().await?;
            if docs.is_empty() {
                println!("No documents.");
            }
            for doc in docs {
                println!(
                    "{}  {:<12} {} ({} bytes)",
                    doc.id,
                    doc.status.as_str(),
                    doc.file_name,
                    doc.size_bytes
                );
            }
        }
        Commands::Delete { id } => {
            let store = open_store(&cfg).await?;
            if store.delete_document(&id).await? {
                println!("Deleted {}.", id);
            } else {
                println!("No document with id {}.", id);
            }
        }
        Commands::Context { query, docs } => {
            let store = open_store(&cfg).await?;
            let documents = select_documents(&store, &docs).await?;
            let embedder = optional_embedder(&cfg)?;
            let engine = RetrievalEngine::new(cfg.retrieval.clone());
            let context = engine
                .retrieve_context(&query, &documents, embedder.as_deref())
                .await;
            if context.is_empty() {
                println!("(no context)");
            } else {
                println!("{}", context);
            }
        }
        Commands::Ask {
            message,
            docs,
            system,
            model,
        } => {
            let store = open_store(&cfg).await?;
            let documents = select_documents(&store, &docs).await?;
            let sources: Vec<KnowledgeSource> = documents
                .iter()
                .map(|d| KnowledgeSource::Document {
                    document_id: d.id.clone(),
                })
                .collect();

            let profile = AgentProfile {
                name: "cli".to_string(),
                system_prompt: system,
                params: ModelParams {
                    model: model.unwrap_or_else(|| cfg.completion.model.clone()),
                    temperature: cfg.completion.temperature,
                    max_tokens: cfg.completion.max_tokens,
                },
                sources,
            };

            let completion = OpenAiCompletionClient::new(&cfg)?;
            let embedder = optional_embedder(&cfg)?;
            let engine = RetrievalEngine::new(cfg.retrieval.clone());
            let pricing = PricingTable::new(cfg.pricing.clone());
            let http = reqwest::Client::new();

            let outcome = run_turn(
                &store,
                &http,
                &completion,
                &engine,
                embedder.as_deref(),
                &pricing,
                &cfg,
                &profile,
                &[],
                &message,
            )
            .await?;

            println!("{}", outcome.reply);
            println!();
            println!(
                "[{} tokens, cost ${:.6}, price ${:.6}{}]",
                outcome.usage.total_tokens,
                outcome.usage.cost,
                outcome.usage.customer_price,
                if outcome.context_used {
                    ", with context"
                } else {
                    ", no context"
                }
            );
        }
    }

    Ok(())
}

async fn open_store(cfg: &Config) -> Result<SqliteStore> {
    SqliteStore::open(&cfg.db).await
}

fn optional_embedder(cfg: &Config) -> Result<Option<Box<dyn Embedder>>> {
    if cfg.embedding.is_enabled() {
        Ok(Some(create_embedder(&cfg.embedding)?))
    } else {
        Ok(None)
    }
}

async fn run_add(
    store: &SqliteStore,
    path: &Path,
    mime: Option<String>,
    language: String,
) -> Result<()> {
    let metadata = std::fs::metadata(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    let mime_type = mime.unwrap_or_else(|| guess_mime(path).to_string());

    let mut doc = Document::new(
        file_name,
        mime_type,
        metadata.len() as i64,
        path.to_string_lossy().to_string(),
    );
    doc.language = language;
    store.save_document(&doc).await?;

    println!("Added {} ({})", doc.file_name, doc.mime_type);
    println!("  id:     {}", doc.id);
    println!("  status: {}", doc.status.as_str());
    Ok(())
}

/// Best-effort MIME guess from the file extension.
fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("csv") => "text/csv",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "text/plain",
    }
}

/// Load either the named documents or every stored document.
async fn select_documents(store: &SqliteStore, ids: &[String]) -> Result<Vec<Document>> {
    if ids.is_empty() {
        let listed = store.list_documents().await?;
        let all_ids: Vec<String> = listed.iter().map(|d| d.id.clone()).collect();
        store.get_documents(&all_ids).await
    } else {
        store.get_documents(ids).await
    }
}
