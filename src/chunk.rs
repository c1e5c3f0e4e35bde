//! Boundary-aware text chunker for corpus ingestion.
//!
//! Splits document text into [`DocumentChunk`]s of at most `max_chars`
//! characters with `overlap_chars` of shared text between adjacent chunks of
//! the same source. Split points prefer paragraph boundaries (`\n\n`), then
//! line breaks, then spaces, falling back to a hard cut.
//!
//! Each chunk carries a UUID, its index within the source, and a SHA-256
//! hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::DocumentChunk;

/// Split `text` into overlapping chunks. Empty or whitespace-only input
/// produces no chunks. Indices are contiguous starting at 0.
pub fn chunk_text(
    source: &str,
    text: &str,
    max_chars: usize,
    overlap_chars: usize,
) -> Vec<DocumentChunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut chunk_index: i64 = 0;
    let mut start = 0usize;

    while start < text.len() {
        let hard_end = floor_boundary(text, (start + max_chars).min(text.len()));
        let end = if hard_end < text.len() {
            split_point(&text[start..hard_end]).map_or(hard_end, |rel| start + rel)
        } else {
            hard_end
        };

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(make_chunk(source, chunk_index, piece));
            chunk_index += 1;
        }

        if end >= text.len() {
            break;
        }

        // Step back by the overlap, but always make forward progress.
        let next = floor_boundary(text, end.saturating_sub(overlap_chars));
        start = if next <= start { end } else { next };
    }

    chunks
}

/// Best split position within a window that does not end the text:
/// after the last paragraph break, else after the last newline, else after
/// the last space.
fn split_point(window: &str) -> Option<usize> {
    if let Some(pos) = window.rfind("\n\n") {
        if pos > 0 {
            return Some(pos + 2);
        }
    }
    if let Some(pos) = window.rfind('\n') {
        if pos > 0 {
            return Some(pos + 1);
        }
    }
    if let Some(pos) = window.rfind(' ') {
        if pos > 0 {
            return Some(pos + 1);
        }
    }
    None
}

/// Largest char-boundary index not exceeding `i`.
fn floor_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn make_chunk(source: &str, index: i64, text: &str) -> DocumentChunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    DocumentChunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
