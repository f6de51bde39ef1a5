//! Query-time retrieval: ranked, size-bounded context from candidate
//! documents.
//!
//! Two strategies implement [`RetrievalStrategy`] and are selected by a
//! capability check at call time:
//!
//! - **[`KeywordSectionStrategy`]** — scores paragraph/sentence sections
//!   by keyword occurrence counts. Works on any processed document; this
//!   is the universal fallback.
//! - **[`EmbeddingSimilarityStrategy`]** — cosine similarity between the
//!   embedded query and pre-computed chunk embeddings. Strictly better
//!   when chunk embeddings exist, but requires the embedding pipeline to
//!   have run.
//!
//! Both degrade to an empty result on empty queries or candidate sets;
//! retrieval must never abort the surrounding conversation turn. The
//! engine caches assembled context per (query prefix, document id set)
//! with a bounded TTL.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

use crate::cache::{context_cache_key, QueryCache};
use crate::config::RetrievalConfig;
use crate::embedding::{cosine_similarity, Embedder};
use crate::models::Document;

/// Returned when a search ran but matched nothing, so callers can
/// distinguish "searched, found nothing" from "did not search" (empty
/// string).
pub const NO_MATCH_SENTINEL: &str = "No specific information found in the knowledge sources.";

/// Tech-domain terms appended to the keyword set when the query already
/// contains one of them.
const TECH_TERMS: &[&str] = &[
    "api", "url", "endpoint", "http", "server", "link", "address", "database", "token",
];

const INTERROGATIVES: &[&str] = &["how", "what", "when", "where", "why", "who"];

/// One ranked piece of context, tagged with its source for citation.
#[derive(Debug, Clone)]
pub struct RankedSection {
    pub document_id: String,
    pub label: String,
    pub text: String,
    pub score: f64,
}

/// A retrieval strategy ranks sections of the candidate documents against
/// a query. Implementations must return an empty list (not an error) for
/// empty queries or candidate sets.
#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    async fn rank(&self, query: &str, documents: &[Document]) -> Result<Vec<RankedSection>>;
}

// ============ Strategy A: keyword-scored sections ============

/// Scores paragraph/sentence sections by case-insensitive keyword
/// occurrence counts (word-boundary and substring matches summed), with
/// doubled weight for URL-bearing sections when the query asks about
/// URLs/links/endpoints. Scored sections are expanded with their
/// immediate neighbors for continuity.
pub struct KeywordSectionStrategy {
    pub top_sections: usize,
    pub min_section_len: usize,
}

#[async_trait]
impl RetrievalStrategy for KeywordSectionStrategy {
    async fn rank(&self, query: &str, documents: &[Document]) -> Result<Vec<RankedSection>> {
        Ok(self.rank_sync(query, documents))
    }
}

impl KeywordSectionStrategy {
    pub fn rank_sync(&self, query: &str, documents: &[Document]) -> Vec<RankedSection> {
        let keywords = extract_query_keywords(query);
        if keywords.is_empty() || documents.is_empty() {
            return Vec::new();
        }

        let url_query = is_url_query(query);
        let matchers: Vec<(Regex, String)> = keywords
            .iter()
            .filter_map(|kw| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(kw)))
                    .ok()
                    .map(|re| (re, kw.clone()))
            })
            .collect();

        let mut ranked = Vec::new();

        for doc in documents {
            let sections = split_sections(doc.text(), self.min_section_len);
            for (i, section) in sections.iter().enumerate() {
                let score = score_section(section, &matchers, url_query);
                if score <= 0.0 {
                    continue;
                }
                // Pull in the neighboring sections for continuity.
                let mut text = String::new();
                if i > 0 {
                    text.push_str(&sections[i - 1]);
                    text.push('\n');
                }
                text.push_str(section);
                if i + 1 < sections.len() {
                    text.push('\n');
                    text.push_str(&sections[i + 1]);
                }
                ranked.push(RankedSection {
                    document_id: doc.id.clone(),
                    label: doc.file_name.clone(),
                    text,
                    score,
                });
            }
        }

        // Stable sort: ties keep document order.
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.top_sections);
        ranked
    }
}

/// Keyword extraction for queries: lowercase, strip punctuation, keep
/// tokens of length >= 2 (short domain tokens like "id" and "api"
/// matter). Appends the tech-domain term set when the query contains one
/// of its members, and interrogative words that literally appear in the
/// query. Order-preserving, deduplicated.
pub fn extract_query_keywords(query: &str) -> Vec<String> {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    fn push_unique(keywords: &mut Vec<String>, kw: &str) {
        if !keywords.iter().any(|k| k == kw) {
            keywords.push(kw.to_string());
        }
    }

    let mut keywords: Vec<String> = Vec::new();
    for token in &tokens {
        if token.len() >= 2 {
            push_unique(&mut keywords, token);
        }
    }
    if tokens.iter().any(|t| TECH_TERMS.contains(t)) {
        for term in TECH_TERMS {
            push_unique(&mut keywords, term);
        }
    }
    for word in INTERROGATIVES {
        if tokens.contains(word) {
            push_unique(&mut keywords, word);
        }
    }

    keywords
}

/// Does the query look like it asks about URLs, links, or endpoints?
pub fn is_url_query(query: &str) -> bool {
    static PATTERN: &str = r"(?i)\b(url|link|links|address|endpoint|endpoints)\b";
    Regex::new(PATTERN).map(|re| re.is_match(query)).unwrap_or(false)
}

/// Split text into scoreable sections: paragraph boundaries first, then
/// sentence boundaries when the text is a single block. Sections shorter
/// than `min_len` (trimmed) are discarded.
pub fn split_sections(text: &str, min_len: usize) -> Vec<String> {
    let mut sections: Vec<String> = text
        .split("\n\n")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if sections.len() <= 1 {
        sections = split_sentences(text);
    }

    sections.retain(|s| s.trim().len() >= min_len);
    sections
}

/// Sentence splitter: breaks after `.`, `!`, or `?` followed by
/// whitespace. Keeps the terminator with its sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            if chars.peek().map(|n| n.is_whitespace()).unwrap_or(true) {
                let s = current.trim().to_string();
                if !s.is_empty() {
                    sentences.push(s);
                }
                current.clear();
            }
        }
    }
    let tail = current.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Sum keyword occurrence counts (word-boundary + substring) for one
/// section. When the query is URL-flavored and the section carries a URL
/// marker, matches count double.
fn score_section(section: &str, matchers: &[(Regex, String)], url_query: bool) -> f64 {
    let lower = section.to_lowercase();
    let url_section = url_query
        && (lower.contains("http") || lower.contains("www") || lower.contains(".com") || lower.contains(".io"));

    let mut score = 0.0;
    for (re, keyword) in matchers {
        let word_hits = re.find_iter(section).count();
        let substring_hits = lower.matches(keyword.as_str()).count();
        let mut hits = (word_hits + substring_hits) as f64;
        if url_section && hits > 0.0 {
            hits *= 2.0;
        }
        score += hits;
    }
    score
}

/// Score free-standing text (not a stored document) against a query and
/// return the best sections joined with blank lines. Used for website
/// sources, which are fetched whole and narrowed at query time. `None`
/// when no section scores.
pub fn relevant_sections(
    query: &str,
    text: &str,
    top: usize,
    min_len: usize,
) -> Option<String> {
    let keywords = extract_query_keywords(query);
    if keywords.is_empty() || text.trim().is_empty() {
        return None;
    }

    let url_query = is_url_query(query);
    let matchers: Vec<(Regex, String)> = keywords
        .iter()
        .filter_map(|kw| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(kw)))
                .ok()
                .map(|re| (re, kw.clone()))
        })
        .collect();

    let sections = split_sections(text, min_len);
    let mut scored: Vec<(f64, &String)> = sections
        .iter()
        .map(|s| (score_section(s, &matchers, url_query), s))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    if scored.is_empty() {
        return None;
    }
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top);

    Some(
        scored
            .into_iter()
            .map(|(_, s)| s.clone())
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

// ============ Strategy B: embedding similarity ============

/// Ranks chunks that carry embeddings by cosine similarity to the
/// embedded query.
pub struct EmbeddingSimilarityStrategy<'a> {
    pub embedder: &'a dyn Embedder,
    pub top_chunks: usize,
}

#[async_trait]
impl<'a> RetrievalStrategy for EmbeddingSimilarityStrategy<'a> {
    async fn rank(&self, query: &str, documents: &[Document]) -> Result<Vec<RankedSection>> {
        if query.trim().is_empty() || documents.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed(query).await?;

        let mut ranked = Vec::new();
        for doc in documents {
            for chunk in &doc.chunks {
                let Some(emb) = chunk.embedding.as_ref() else {
                    continue;
                };
                ranked.push(RankedSection {
                    document_id: doc.id.clone(),
                    label: if chunk.source_label.is_empty() {
                        doc.file_name.clone()
                    } else {
                        chunk.source_label.clone()
                    },
                    text: chunk.text.clone(),
                    score: cosine_similarity(&query_vec, emb) as f64,
                });
            }
        }

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.top_chunks);
        Ok(ranked)
    }
}

// ============ Engine ============

/// Front door for retrieval. Selects a strategy by capability check,
/// applies the keyword strategy's fallback chain, and caches assembled
/// context strings.
pub struct RetrievalEngine {
    config: RetrievalConfig,
    cache: QueryCache,
}

impl RetrievalEngine {
    pub fn new(config: RetrievalConfig) -> Self {
        let ttl = std::time::Duration::from_secs(config.cache_ttl_secs);
        Self::with_cache(config, QueryCache::new(ttl))
    }

    /// Construct with an injected cache (tests pass a zero-TTL cache).
    pub fn with_cache(config: RetrievalConfig, cache: QueryCache) -> Self {
        Self { config, cache }
    }

    /// Assemble a bounded, relevant context string for `query` over the
    /// candidate documents.
    ///
    /// Returns an empty string for an empty query or candidate set, the
    /// [`NO_MATCH_SENTINEL`] when scoring ran but found nothing, and
    /// never an error: retrieval failures degrade, they do not abort.
    pub async fn retrieve_context(
        &self,
        query: &str,
        documents: &[Document],
        embedder: Option<&dyn Embedder>,
    ) -> String {
        if query.trim().is_empty() || documents.is_empty() {
            return String::new();
        }

        let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
        let key = context_cache_key(query, &ids);
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }

        // Capability check: chunk embeddings present and an embedder
        // available to embed the query.
        let mut context = None;
        if let Some(embedder) = embedder {
            if documents.iter().any(|d| d.has_embeddings()) {
                let strategy = EmbeddingSimilarityStrategy {
                    embedder,
                    top_chunks: self.config.top_chunks,
                };
                match strategy.rank(query, documents).await {
                    Ok(sections) if !sections.is_empty() => {
                        context = Some(format_embedding_sections(&sections));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        eprintln!("Warning: embedding retrieval failed, using keyword fallback: {}", e);
                    }
                }
            }
        }

        let context = match context {
            Some(c) => c,
            None => self.keyword_context(query, documents),
        };

        self.cache.set(&key, context.clone());
        context
    }

    /// Keyword strategy plus its fallback chain: scored sections, then a
    /// first-paragraph fallback when the query yields no keywords, then a
    /// raw-URL scan for URL-flavored queries, then the sentinel.
    fn keyword_context(&self, query: &str, documents: &[Document]) -> String {
        let keywords = extract_query_keywords(query);
        if keywords.is_empty() {
            return first_paragraph_fallback(documents);
        }

        let strategy = KeywordSectionStrategy {
            top_sections: self.config.top_sections,
            min_section_len: self.config.min_section_len,
        };
        let sections = strategy.rank_sync(query, documents);
        if !sections.is_empty() {
            return format_keyword_sections(&sections);
        }

        if is_url_query(query) {
            if let Some(found) = url_scan_fallback(documents) {
                return found;
            }
        }

        NO_MATCH_SENTINEL.to_string()
    }
}

fn format_keyword_sections(sections: &[RankedSection]) -> String {
    sections
        .iter()
        .map(|s| format!("From {}:\n{}", s.label, s.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_embedding_sections(sections: &[RankedSection]) -> String {
    sections
        .iter()
        .map(|s| format!("From {} [{:.2}]:\n{}", s.label, s.score, s.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// No keywords to score with: return the first paragraph (~500 chars) of
/// the first candidate that has text.
fn first_paragraph_fallback(documents: &[Document]) -> String {
    for doc in documents {
        let text = doc.text();
        if text.is_empty() {
            continue;
        }
        let paragraph = text.split("\n\n").next().unwrap_or(text);
        let snippet: String = paragraph.chars().take(500).collect();
        return format!("From {}:\n{}", doc.file_name, snippet);
    }
    String::new()
}

/// Last-resort URL scan: the first `http(s)://` literal in any candidate
/// document's raw text, labeled by document.
fn url_scan_fallback(documents: &[Document]) -> Option<String> {
    let re = Regex::new(r"https?://\S+").ok()?;
    for doc in documents {
        if let Some(m) = re.find(doc.text()) {
            return Some(format!("From {}: {}", doc.file_name, m.as_str()));
        }
    }
    None
}
