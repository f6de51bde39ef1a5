//! Text post-processing and keyword derivation.
//!
//! Cleanup helpers run after extraction (whitespace collapse, OCR artifact
//! repair, header/footer stripping) and the keyword extractor used both
//! for document tags and for website paragraph scoring.

use std::collections::HashMap;

/// Minimum line count before header/footer stripping kicks in. Short
/// documents rarely carry repeated page furniture.
const HEADER_FOOTER_MIN_LINES: usize = 12;
/// Lines at most this long at the document edges are treated as headers
/// or footers.
const HEADER_FOOTER_MAX_LEN: usize = 40;

/// Small stop-word set for tag derivation. Intentionally minimal; the
/// frequency ranking does most of the work.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "of", "to", "in", "on", "for", "with", "is", "are",
    "was", "were", "be", "been", "it", "its", "this", "that", "these", "those", "as", "at", "by",
    "from", "not", "no", "can", "will", "have", "has", "had", "you", "your", "we", "our", "they",
    "their",
];

/// Collapse runs of whitespace into single spaces, preserving paragraph
/// breaks (two or more newlines become exactly one blank line).
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, paragraph) in text.split("\n\n").enumerate() {
        let collapsed = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            continue;
        }
        if i > 0 && !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&collapsed);
    }
    out
}

/// Repair common OCR confusions inside alphabetic words: digits that are
/// visually confusable with letters (`0`→`o`, `1`→`l`, `5`→`s`) when both
/// neighbors are letters. Standalone numbers are left untouched.
pub fn fix_ocr_artifacts(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        let prev_alpha = i > 0 && chars[i - 1].is_alphabetic();
        let next_alpha = i + 1 < chars.len() && chars[i + 1].is_alphabetic();
        let fixed = if prev_alpha && next_alpha {
            match c {
                '0' => 'o',
                '1' => 'l',
                '5' => 's',
                _ => c,
            }
        } else {
            c
        };
        out.push(fixed);
    }
    out
}

/// Drop the first and last line when the document is long enough that
/// short edge lines are likely page headers or footers.
pub fn strip_header_footer(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < HEADER_FOOTER_MIN_LINES {
        return text.to_string();
    }
    let mut start = 0;
    let mut end = lines.len();
    if lines[0].trim().len() <= HEADER_FOOTER_MAX_LEN && !lines[0].trim().is_empty() {
        start = 1;
    }
    if lines[end - 1].trim().len() <= HEADER_FOOTER_MAX_LEN && !lines[end - 1].trim().is_empty() {
        end -= 1;
    }
    lines[start..end].join("\n")
}

/// Derive the top `limit` keyword tags from a body of text.
///
/// Lowercases, strips non-letter characters, tokenizes on whitespace,
/// drops stop words and one-letter tokens, ranks by frequency (ties broken
/// alphabetically for determinism).
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for raw in text.split_whitespace() {
        let token: String = raw
            .chars()
            .filter(|c| c.is_alphabetic())
            .collect::<String>()
            .to_lowercase();
        if token.len() < 2 || STOP_WORDS.contains(&token.as_str()) {
            continue;
        }
        *freq.entry(token).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked.into_iter().map(|(w, _)| w).collect()
}
