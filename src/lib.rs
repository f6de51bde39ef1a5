//! # agentkb
//!
//! Knowledge-base backend for retrieval-augmented chat agents: document
//! ingestion, chunking, embedding, query-time retrieval, prompt
//! assembly, and usage accounting.
//!
//! ## Pipeline
//!
//! ```text
//!  upload          process           chunk            embed
//! ┌────────┐    ┌────────────┐    ┌──────────┐    ┌───────────┐
//! │ file   │ →  │ extract +  │ →  │ sliding  │ →  │ vectors   │
//! │ record │    │ clean text │    │ windows  │    │ per chunk │
//! └────────┘    └────────────┘    └──────────┘    └───────────┘
//!                                                       │
//!      query ─────────────────────────────────────┐     │
//!                                                 ▼     ▼
//!                                           ┌───────────────┐
//!                                           │ retrieval     │
//!                                           │ (keyword or   │
//!                                           │  embeddings)  │
//!                                           └───────┬───────┘
//!                                                   ▼
//!                                  prompt assembly → completion → usage
//! ```
//!
//! ## Modules
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`models`] | Documents, chunks, sources, messages, usage records |
//! | [`extract`] | Text extraction per MIME type (PDF, DOCX, OCR, text) |
//! | [`text`] | Cleanup passes and keyword tagging |
//! | [`ingest`] | Processing state machine and chunking driver |
//! | [`chunk`] | Sliding-window chunker |
//! | [`embedding`] | Embedding providers and vector helpers |
//! | [`retrieval`] | Keyword and embedding retrieval strategies |
//! | [`cache`] | TTL cache for assembled context |
//! | [`resolver`] | Knowledge-source resolution (documents, websites, text) |
//! | [`prompt`] | Prompt assembly with bounded history |
//! | [`chat`] | Completion client and the conversation-turn orchestrator |
//! | [`pricing`] | Token cost and customer price accounting |
//! | [`store`] | Persistence trait, in-memory and SQLite backends |

pub mod cache;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod pricing;
pub mod prompt;
pub mod resolver;
pub mod retrieval;
pub mod store;
pub mod text;
