//! Fixed-size overlapping text chunker.
//!
//! Splits a knowledge-base document into character-based chunks of at most
//! `chunk_size` characters, each sharing `overlap` characters with its
//! predecessor. Splits land on `char` boundaries, never inside a code point.
//!
//! Each chunk carries its source filename, a contiguous index, a random UUID
//! used as the vector id, and a SHA-256 hash of its text for staleness
//! detection.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::KnowledgeChunk;

/// Split `text` into overlapping chunks. `overlap` must be < `chunk_size`.
/// Returns chunks with contiguous indices starting at 0; empty or
/// whitespace-only input yields no chunks, so nothing meaningless reaches
/// the index.
pub fn chunk_text(
    source: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<KnowledgeChunk> {
    debug_assert!(overlap < chunk_size);

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        chunks.push(make_chunk(source, index, piece.trim()));
        index += 1;

        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

fn make_chunk(source: &str, index: i64, text: &str) -> KnowledgeChunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    KnowledgeChunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_text("soil.txt", "Loam drains well.", 512, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Loam drains well.");
        assert_eq!(chunks[0].source, "soil.txt");
    }

    #[test]
    fn empty_and_whitespace_text_yield_no_chunks() {
        assert!(chunk_text("empty.txt", "", 512, 50).is_empty());
        assert!(chunk_text("blank.txt", "   \n ", 512, 50).is_empty());
    }

    #[test]
    fn long_text_respects_size_and_overlap() {
        let text = "a".repeat(1200);
        let chunks = chunk_text("doc.txt", &text, 512, 50);
        // step = 462: chunks start at 0, 462, 924 -> 3 chunks.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.chars().count(), 512);
        assert_eq!(chunks[1].text.chars().count(), 512);
        assert_eq!(chunks[2].text.chars().count(), 1200 - 924);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn neighbors_share_overlap() {
        // Distinct characters so the shared region is identifiable.
        let text: String = (0..200).map(|i| ((i % 26) as u8 + b'a') as char).collect();
        let chunks = chunk_text("doc.txt", &text, 100, 20);
        assert!(chunks.len() >= 2);
        let first: Vec<char> = chunks[0].text.chars().collect();
        let second: Vec<char> = chunks[1].text.chars().collect();
        let tail: String = first[first.len() - 20..].iter().collect();
        let head: String = second[..20].iter().collect();
        assert_eq!(tail, head);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "日本語のテキスト。".repeat(100);
        let chunks = chunk_text("doc.txt", &text, 512, 50);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 512);
        }
    }

    #[test]
    fn chunk_text_is_deterministic() {
        let text = "The nitrogen cycle matters for crop rotation planning.".repeat(30);
        let a = chunk_text("doc.txt", &text, 512, 50);
        let b = chunk_text("doc.txt", &text, 512, 50);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.hash, y.hash);
            assert_eq!(x.chunk_index, y.chunk_index);
        }
    }
}
