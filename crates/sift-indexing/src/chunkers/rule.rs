use async_trait::async_trait;
use sift_config::ChunkingConfig;

use super::{split_sentences, Chunker};
use crate::text;
use crate::{Chunk, IndexingError};

/// Group size bounds for the rule-based fallback.
const MIN_GROUP: usize = 3;
const MAX_GROUP: usize = 10;

/// Rule-based chunker: fixed groups of sentences. Used directly when no
/// model is available and as the fallback when the model yields nothing
/// usable.
pub struct RuleChunker {
    group_size: usize,
}

impl RuleChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        RuleChunker {
            group_size: config.fallback_group_size.clamp(MIN_GROUP, MAX_GROUP),
        }
    }

    pub fn with_group_size(group_size: usize) -> Self {
        RuleChunker {
            group_size: group_size.clamp(MIN_GROUP, MAX_GROUP),
        }
    }
}

#[async_trait]
impl Chunker for RuleChunker {
    async fn chunk(&self, content: &str) -> Result<Vec<Chunk>, IndexingError> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let sentences = split_sentences(content);
        if sentences.is_empty() {
            return Ok(Vec::new());
        }

        let mut chunks = Vec::new();
        for group in sentences.chunks(self.group_size) {
            let (Some(first), Some(last)) = (group.first(), group.last()) else {
                continue;
            };
            let (word_start, word_end) =
                text::word_span(content, first.byte_start, last.byte_end);
            chunks.push(Chunk {
                chunk_index: chunks.len(),
                char_start: first.char_start,
                char_end: last.char_end,
                word_start,
                word_end,
                text: content[first.byte_start..last.byte_end].to_string(),
            });
        }
        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "rule"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::assert_chunk_invariants;

    fn config(group: usize) -> ChunkingConfig {
        ChunkingConfig {
            fallback_group_size: group,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_groups_of_n_sentences() {
        let content = "A one. B two. C three. D four. E five. F six. G seven.";
        let chunker = RuleChunker::new(&config(3));
        let chunks = chunker.chunk(content).await.unwrap();
        assert_chunk_invariants(content, &chunks);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "A one. B two. C three.");
        assert_eq!(chunks[2].text, "G seven.");
    }

    #[tokio::test]
    async fn test_group_size_is_clamped() {
        assert_eq!(RuleChunker::with_group_size(1).group_size, 3);
        assert_eq!(RuleChunker::with_group_size(50).group_size, 10);
        assert_eq!(RuleChunker::with_group_size(8).group_size, 8);
    }

    #[tokio::test]
    async fn test_empty_content_yields_no_chunks() {
        let chunker = RuleChunker::new(&config(8));
        assert!(chunker.chunk("").await.unwrap().is_empty());
        assert!(chunker.chunk("   \n\n ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_terminator_single_chunk() {
        let content = "one long fragment with no sentence break at all";
        let chunker = RuleChunker::new(&config(8));
        let chunks = chunker.chunk(content).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, content);
        assert_eq!(chunks[0].char_start, 0);
        assert_eq!(chunks[0].char_end, content.chars().count());
    }

    #[tokio::test]
    async fn test_word_offsets() {
        let content = "a b. c d.";
        let chunker = RuleChunker::new(&config(3));
        let chunks = chunker.chunk(content).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].word_start, 0);
        assert_eq!(chunks[0].word_end, 3);
    }
}
