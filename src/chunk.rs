//! Sliding-window text chunker.
//!
//! Splits extracted document text into overlapping fixed-size windows.
//! Each chunk records its character offsets into the parent text, so
//! embeddings and citations stay stable across re-chunking: the same
//! input always yields the same chunk boundaries.

use crate::models::Chunk;

/// Split `text` into overlapping windows of `chunk_size` characters.
///
/// The window start advances by `chunk_size - overlap` per step; the final
/// chunk may be shorter than `chunk_size`. Offsets are character offsets,
/// monotonically increasing, and `chunks[i + 1].start == chunks[i].end -
/// overlap` for every pair except possibly the last.
///
/// Empty text yields an empty list. An `overlap >= chunk_size` is clamped
/// so the window always advances by at least one character.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize, source_label: &str) -> Vec<Chunk> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end sentinel, so slices
    // can be taken by character position without re-walking the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    loop {
        let end = (start + chunk_size).min(total_chars);
        chunks.push(Chunk {
            chunk_index: index,
            text: text[boundaries[start]..boundaries[end]].to_string(),
            start,
            end,
            embedding: None,
            source_label: source_label.to_string(),
        });
        if end == total_chars {
            break;
        }
        start += step;
        index += 1;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("", 1000, 200, "doc").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 1000, 200, "doc");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 13);
    }

    #[test]
    fn test_overlap_relationship() {
        let text: String = std::iter::repeat('x').take(2500).collect();
        let chunks = chunk_text(&text, 1000, 200, "doc");
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start, pair[0].end - 200);
        }
    }

    #[test]
    fn test_spans_cover_whole_text() {
        let text: String = ('a'..='z').cycle().take(3713).collect();
        let chunks = chunk_text(&text, 1000, 200, "doc");
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks.last().unwrap().end, 3713);
        // Monotonic offsets, contiguous indices.
        for (i, pair) in chunks.windows(2).enumerate() {
            assert!(pair[1].start > pair[0].start);
            assert!(pair[1].end >= pair[0].end);
            assert_eq!(pair[0].chunk_index, i as i64);
        }
        // No gap: each window starts before the previous one ends.
        for pair in chunks.windows(2) {
            assert!(pair[1].start <= pair[0].end);
        }
    }

    #[test]
    fn test_deterministic() {
        let text: String = ('a'..='z').cycle().take(5000).collect();
        let a = chunk_text(&text, 1000, 200, "doc");
        let b = chunk_text(&text, 1000, 200, "doc");
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!((x.start, x.end), (y.start, y.end));
        }
    }

    #[test]
    fn test_multibyte_boundaries() {
        let text = "héllo wörld ".repeat(200);
        let chunks = chunk_text(&text, 100, 20, "doc");
        // Slicing must not panic and chunk sizes are in characters.
        for c in &chunks {
            assert!(c.text.chars().count() <= 100);
        }
        assert_eq!(
            chunks.last().unwrap().end,
            text.chars().count()
        );
    }

    #[test]
    fn test_degenerate_overlap_still_advances() {
        let text: String = std::iter::repeat('y').take(50).collect();
        let chunks = chunk_text(&text, 10, 10, "doc");
        assert!(chunks.len() <= 50);
        assert_eq!(chunks.last().unwrap().end, 50);
    }
}
