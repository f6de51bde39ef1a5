//! Knowledge-source resolution: turn an agent's attached sources into
//! attributed context text.
//!
//! Sources resolve in isolation: a document that failed processing or an
//! unreachable website drops that one source with a warning and never
//! takes the others down with it.

use anyhow::{bail, Result};
use scraper::{Html, Node};

use crate::models::KnowledgeSource;
use crate::retrieval::relevant_sections;
use crate::store::Store;
use crate::text::collapse_whitespace;

const WEBSITE_TOP_SECTIONS: usize = 3;
const WEBSITE_MIN_SECTION_LEN: usize = 15;
const WEBSITE_FALLBACK_CHARS: usize = 500;

/// Resolve one source to raw text.
///
/// Document sources with no extracted text yet resolve to an empty
/// string (attached-but-unprocessed is not an error); an unknown
/// document id is.
pub async fn resolve_source(
    store: &dyn Store,
    client: &reqwest::Client,
    source: &KnowledgeSource,
) -> Result<String> {
    match source {
        KnowledgeSource::Document { document_id } => {
            match store.get_document(document_id).await? {
                Some(doc) => Ok(doc.text().to_string()),
                None => bail!("document not found: {}", document_id),
            }
        }
        KnowledgeSource::Website { url } => {
            let html = client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            Ok(html_to_text(&html))
        }
        KnowledgeSource::Text { content } | KnowledgeSource::Qa { content } => {
            Ok(content.clone())
        }
    }
}

/// Resolve all sources and join the non-empty results with attribution
/// prefixes, applying kind-specific relevance narrowing: website text is
/// reduced to the paragraphs that score against `query` (with a bounded
/// leading excerpt as fallback), text/qa content is included verbatim.
/// Failed sources are skipped with a warning. Returns an empty string
/// when nothing resolved.
pub async fn build_context(
    store: &dyn Store,
    client: &reqwest::Client,
    query: &str,
    sources: &[KnowledgeSource],
) -> String {
    let mut parts = Vec::new();

    for source in sources {
        match resolve_source(store, client, source).await {
            Ok(text) if !text.trim().is_empty() => {
                let (prefix, body) = match source {
                    KnowledgeSource::Website { url } => {
                        let narrowed = relevant_sections(
                            query,
                            &text,
                            WEBSITE_TOP_SECTIONS,
                            WEBSITE_MIN_SECTION_LEN,
                        )
                        .unwrap_or_else(|| {
                            text.chars().take(WEBSITE_FALLBACK_CHARS).collect()
                        });
                        (format!("From website {}:", url), narrowed)
                    }
                    other => (format!("From {} source:", other.kind_name()), text),
                };
                parts.push(format!("{}\n{}", prefix, body));
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("Warning: skipping {} source: {}", source.kind_name(), e);
            }
        }
    }

    parts.join("\n\n")
}

/// Visible text of an HTML page: text nodes outside `script`, `style`,
/// `noscript`, and `head`, whitespace-collapsed.
pub fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut out = String::new();

    for node in doc.tree.nodes() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|a| match a.value() {
                Node::Element(el) => {
                    matches!(el.name(), "script" | "style" | "noscript" | "head")
                }
                _ => false,
            });
            if !hidden {
                out.push_str(text);
                out.push(' ');
            }
        }
    }

    collapse_whitespace(&out)
}
