//! Overlapping sliding-window text chunker.
//!
//! Splits extracted document text into fixed-size windows measured in
//! characters. Consecutive windows share a configured overlap region, so
//! a sentence cut by one window boundary is intact in the next window.
//! Dropping each window's leading overlap and concatenating reconstructs
//! the input exactly.
//!
//! Each materialized chunk receives a UUID plus a SHA-256 hash of its text
//! for staleness detection.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Lazy iterator over overlapping text windows.
///
/// Invariants: every window is at most `chunk_size` characters; every
/// window after the first starts `chunk_size - overlap` characters after
/// its predecessor. The iterator is finite, deterministic, and restartable
/// (construct a new one, or clone before iterating).
#[derive(Debug, Clone)]
pub struct ChunkIter<'a> {
    text: &'a str,
    chunk_size: usize,
    step: usize,
    /// Byte offset of the next window start.
    pos: usize,
    done: bool,
}

impl<'a> ChunkIter<'a> {
    /// `overlap` must be smaller than `chunk_size`; config validation
    /// enforces this before the pipeline gets here.
    pub fn new(text: &'a str, chunk_size: usize, overlap: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be > 0");
        assert!(overlap < chunk_size, "overlap must be < chunk_size");
        Self {
            text,
            chunk_size,
            step: chunk_size - overlap,
            pos: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }

        let rest = &self.text[self.pos..];

        // Byte offset after chunk_size characters (or the whole remainder).
        let window_end = rest
            .char_indices()
            .nth(self.chunk_size)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());

        let window = &rest[..window_end];

        if window_end == rest.len() {
            self.done = true;
        } else {
            let advance = rest
                .char_indices()
                .nth(self.step)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            self.pos += advance;
        }

        Some(window)
    }
}

/// Materialize the windows of `text` into [`Chunk`]s with contiguous
/// indices starting at 0. Always yields at least one chunk.
pub fn chunk_text(document_id: &str, text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    ChunkIter::new(text, chunk_size, overlap)
        .enumerate()
        .map(|(i, window)| make_chunk(document_id, i as i64, window))
        .collect()
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuild the input from windows by dropping each window's leading
    /// overlap characters.
    fn reconstruct(windows: &[&str], overlap: usize) -> String {
        let mut out = String::new();
        for (i, w) in windows.iter().enumerate() {
            if i == 0 {
                out.push_str(w);
            } else {
                let skip = w
                    .char_indices()
                    .nth(overlap)
                    .map(|(b, _)| b)
                    .unwrap_or(w.len());
                out.push_str(&w[skip..]);
            }
        }
        out
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text() {
        let chunks = chunk_text("doc1", "", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
    }

    #[test]
    fn test_windows_respect_max_size() {
        let text = "abcdefghij".repeat(30);
        for w in ChunkIter::new(&text, 37, 9) {
            assert!(w.chars().count() <= 37);
        }
    }

    #[test]
    fn test_consecutive_windows_share_overlap() {
        let text: String = ('a'..='z').cycle().take(500).collect();
        let windows: Vec<&str> = ChunkIter::new(&text, 100, 25).collect();
        for pair in windows.windows(2) {
            let tail: String = pair[0].chars().skip(100 - 25).collect();
            let head: String = pair[1].chars().take(25).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_lossless_reconstruction() {
        let text = "The refund window is 30 days. ".repeat(40);
        for (size, overlap) in [(50, 10), (100, 0), (73, 72), (1000, 200), (7, 3)] {
            let windows: Vec<&str> = ChunkIter::new(&text, size, overlap).collect();
            assert_eq!(
                reconstruct(&windows, overlap),
                text,
                "lossy at size={} overlap={}",
                size,
                overlap
            );
        }
    }

    #[test]
    fn test_lossless_reconstruction_multibyte() {
        let text = "héllo wörld — ünïcode text 文書検索 ".repeat(25);
        let windows: Vec<&str> = ChunkIter::new(&text, 40, 15).collect();
        assert_eq!(reconstruct(&windows, 15), text);
    }

    #[test]
    fn test_deterministic() {
        let text = "alpha beta gamma delta epsilon ".repeat(20);
        let a: Vec<&str> = ChunkIter::new(&text, 64, 16).collect();
        let b: Vec<&str> = ChunkIter::new(&text, 64, 16).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_restartable() {
        let text = "one two three four five ".repeat(10);
        let iter = ChunkIter::new(&text, 50, 10);
        let first: Vec<&str> = iter.clone().collect();
        let second: Vec<&str> = iter.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = "0123456789".repeat(50);
        let chunks = chunk_text("doc1", &text, 40, 8);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_hash_matches_text() {
        let chunks = chunk_text("doc1", "stable text", 100, 10);
        let c1 = &chunks[0];
        let again = chunk_text("doc1", "stable text", 100, 10);
        assert_eq!(c1.hash, again[0].hash);
        assert_ne!(c1.id, again[0].id);
    }
}
