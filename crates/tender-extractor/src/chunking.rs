//! Text chunking for the hierarchical path
//!
//! Chunks are contiguous slices of the unified text: concatenated in index
//! order they reproduce it exactly, with no gap and no overlap. Each chunk
//! stays within the token limit.

use crate::context::{ceil_boundary, floor_boundary};
use tender_domain::tokens::BYTES_PER_TOKEN;

/// One slice of the unified text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in document order
    pub index: usize,
    /// Byte offset where the chunk starts
    pub start: usize,
    /// Byte offset where the chunk ends (exclusive)
    pub end: usize,
    /// The slice itself
    pub text: String,
}

/// Splits text into bounded chunks
///
/// Cut points prefer paragraph breaks, then sentence ends, then whitespace,
/// and fall back to a hard cut on a character boundary.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    max_chunk_bytes: usize,
}

const SENTENCE_ENDS: &[&str] = &[". ", ".\n", "! ", "!\n", "? ", "?\n", "।", "\n"];

impl TextChunker {
    /// Create a chunker for the given token limit
    pub fn new(max_chunk_tokens: u64) -> Self {
        let tokens =
            usize::try_from(max_chunk_tokens.max(1)).unwrap_or(usize::MAX / BYTES_PER_TOKEN);
        Self {
            max_chunk_bytes: tokens.saturating_mul(BYTES_PER_TOKEN),
        }
    }

    /// Chunk the given text
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let end = if text.len() - start <= self.max_chunk_bytes {
                text.len()
            } else {
                self.cut_point(text, start)
            };
            chunks.push(Chunk {
                index: chunks.len(),
                start,
                end,
                text: text[start..end].to_string(),
            });
            start = end;
        }

        chunks
    }

    /// Exclusive end of the chunk beginning at `start`
    fn cut_point(&self, text: &str, start: usize) -> usize {
        let limit = floor_boundary(text, start + self.max_chunk_bytes);
        let window = &text[start..limit];
        let half = window.len() / 2;

        // Prefer a boundary in the back half of the window; accept an early one
        // only when the back half has none of that kind.
        for min_len in [half, 1] {
            if let Some(cut) = last_after(window, &["\n\n"], min_len)
                .or_else(|| last_after(window, SENTENCE_ENDS, min_len))
                .or_else(|| last_whitespace(window, min_len))
            {
                return start + cut;
            }
        }

        if limit > start {
            limit
        } else {
            ceil_boundary(text, start + 1)
        }
    }
}

/// Largest end-of-delimiter offset at or beyond `min_len`
fn last_after(window: &str, delimiters: &[&str], min_len: usize) -> Option<usize> {
    delimiters
        .iter()
        .filter_map(|d| window.rfind(d).map(|i| i + d.len()))
        .filter(|&cut| cut >= min_len.max(1))
        .max()
}

fn last_whitespace(window: &str, min_len: usize) -> Option<usize> {
    window
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .filter(|&cut| cut >= min_len.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tender_domain::estimate_tokens;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = TextChunker::new(100).chunk("Short tender notice.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Short tender notice.");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 20));
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(TextChunker::new(100).chunk("").is_empty());
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let para = "word ".repeat(30);
        let text = format!("{}\n\n{}\n\n{}", para, para, para);
        let chunks = TextChunker::new(50).chunk(&text);
        assert!(chunks.len() > 1);
        assert!(chunks[0].text.ends_with("\n\n"));
    }

    #[test]
    fn test_falls_back_to_sentences() {
        let text = "This is a sentence. ".repeat(40);
        let chunks = TextChunker::new(25).chunk(&text);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.text.ends_with(". "), "chunk {:?}", chunk.text);
        }
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let text = "x".repeat(1000);
        let chunks = TextChunker::new(10).chunk(&text);
        assert_eq!(chunks.len(), 25);
        assert!(chunks.iter().all(|c| c.text.len() == 40));
    }

    #[test]
    fn test_multibyte_text_is_cut_on_char_boundaries() {
        let text = "निविदा".repeat(100);
        let chunks = TextChunker::new(5).chunk(&text);
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_chunks_respect_token_limit() {
        let text = "Eligibility criteria apply. ".repeat(500);
        let chunks = TextChunker::new(200).chunk(&text);
        assert!(chunks.iter().all(|c| estimate_tokens(&c.text) <= 200));
    }
}
