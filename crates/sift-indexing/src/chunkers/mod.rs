mod boundary;
mod outline;
mod rule;

pub use boundary::BoundaryChunker;
pub use outline::OutlineChunker;
pub use rule::RuleChunker;

use std::sync::Arc;

use async_trait::async_trait;
use sift_config::{ChunkStrategy, ChunkingConfig};
use sift_models::LanguageModel;

use crate::text;
use crate::{Chunk, IndexingError};

/// Trait for chunking strategies.
#[async_trait]
pub trait Chunker: Send + Sync {
    /// Partition content into chunks. Given the same content and the
    /// same model responses, the result is byte-identical.
    async fn chunk(&self, content: &str) -> Result<Vec<Chunk>, IndexingError>;

    fn name(&self) -> &'static str;
}

/// Build the configured chunker.
pub fn create_chunker(
    config: &ChunkingConfig,
    llm: Arc<dyn LanguageModel>,
) -> Box<dyn Chunker> {
    match config.strategy {
        ChunkStrategy::Boundary => Box::new(BoundaryChunker::new(config.clone(), llm)),
        ChunkStrategy::Outline => Box::new(OutlineChunker::new(config.clone(), llm)),
    }
}

/// A sentence's location in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentenceSpan {
    pub byte_start: usize,
    pub byte_end: usize,
    pub char_start: usize,
    pub char_end: usize,
}

impl SentenceSpan {
    pub fn text<'a>(&self, content: &'a str) -> &'a str {
        &content[self.byte_start..self.byte_end]
    }
}

/// Split content into sentences. A sentence ends at `.`/`!`/`?`
/// followed by whitespace (or end of text), or at a blank line. Text
/// with no terminator at all becomes a single sentence.
pub fn split_sentences(content: &str) -> Vec<SentenceSpan> {
    let mut spans = Vec::new();
    let mut start: Option<(usize, usize)> = None;
    let mut prev_newline = false;

    let mut iter = content.char_indices().peekable();
    let mut char_idx = 0usize;

    while let Some((byte_idx, ch)) = iter.next() {
        let next_char = iter.peek().map(|&(_, c)| c);

        if start.is_none() && !ch.is_whitespace() {
            start = Some((byte_idx, char_idx));
        }

        if let Some((byte_start, char_start)) = start {
            let terminator_break = matches!(ch, '.' | '!' | '?')
                && next_char.map(|c| c.is_whitespace()).unwrap_or(true);
            let paragraph_break = ch == '\n' && prev_newline;

            if terminator_break {
                spans.push(SentenceSpan {
                    byte_start,
                    byte_end: byte_idx + ch.len_utf8(),
                    char_start,
                    char_end: char_idx + 1,
                });
                start = None;
            } else if paragraph_break {
                // End the sentence before the blank line; the previous
                // char is the first of the two newlines.
                spans.push(SentenceSpan {
                    byte_start,
                    byte_end: byte_idx - 1,
                    char_start,
                    char_end: char_idx - 1,
                });
                start = None;
            }
        }

        prev_newline = ch == '\n';
        char_idx += 1;
    }

    if let Some((byte_start, char_start)) = start {
        spans.push(SentenceSpan {
            byte_start,
            byte_end: content.len(),
            char_start,
            char_end: char_idx,
        });
    }

    spans.retain(|s| !s.text(content).trim().is_empty());
    spans
}

/// Overlapping coarse windows over `content`, in char units.
/// Windows exist only to bound model context; they never decide chunk
/// boundaries themselves.
pub fn coarse_windows(content: &str, window: usize, overlap: usize) -> Vec<String> {
    let total = text::char_len(content);
    if total == 0 {
        return Vec::new();
    }
    // Geometry is validated at config load; clamp anyway so a bad pair
    // cannot stall the scan.
    let window = window.max(1);
    let overlap = overlap.min(window - 1);

    let mut windows = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + window).min(total);
        windows.push(text::char_slice(content, start, end).to_string());
        if end >= total {
            break;
        }
        start = end - overlap.min(end);
    }
    windows
}

/// Resolve proposed boundary sentences into chunks with a forward-only
/// cursor. Each candidate is located at or after the cursor; located
/// candidates close a chunk and advance the cursor, so a sentence that
/// appears in two overlapping windows cannot produce a duplicate.
/// Candidates that cannot be located are dropped. Offsets are computed
/// by cursor arithmetic, never by re-searching.
pub fn resolve_boundaries(content: &str, candidates: &[String]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut cur_byte = 0usize;
    let mut cur_char = 0usize;

    let push_span = |chunks: &mut Vec<Chunk>, byte_start, char_start, byte_end, char_end| {
        let chunk_text = &content[byte_start..byte_end];
        if chunk_text.trim().is_empty() {
            return;
        }
        let (word_start, word_end) = text::word_span(content, byte_start, byte_end);
        chunks.push(Chunk {
            chunk_index: chunks.len(),
            char_start,
            char_end,
            word_start,
            word_end,
            text: chunk_text.to_string(),
        });
    };

    for candidate in candidates {
        let needle = candidate.trim();
        if needle.is_empty() {
            continue;
        }
        let Some(found) = content[cur_byte..].find(needle) else {
            continue;
        };
        let end_byte = cur_byte + found + needle.len();
        let end_char = cur_char + content[cur_byte..end_byte].chars().count();

        push_span(&mut chunks, cur_byte, cur_char, end_byte, end_char);
        cur_byte = end_byte;
        cur_char = end_char;
    }

    if cur_byte < content.len() {
        let end_char = cur_char + content[cur_byte..].chars().count();
        push_span(&mut chunks, cur_byte, cur_char, content.len(), end_char);
    }

    chunks
}
