use std::sync::Arc;

use async_trait::async_trait;
use sift_config::ChunkingConfig;
use sift_models::LanguageModel;
use tracing::{debug, warn};

use super::{coarse_windows, resolve_boundaries, Chunker, RuleChunker};
use crate::{Chunk, IndexingError};

/// Model-guided chunker. Each coarse window is shown to a small model
/// that names the last sentence of every semantically complete span;
/// the candidates are then resolved against the full content with a
/// forward-only cursor. Zero usable candidates means the rule-based
/// fallback runs instead.
pub struct BoundaryChunker {
    config: ChunkingConfig,
    llm: Arc<dyn LanguageModel>,
    fallback: RuleChunker,
}

impl BoundaryChunker {
    pub fn new(config: ChunkingConfig, llm: Arc<dyn LanguageModel>) -> Self {
        let fallback = RuleChunker::new(&config);
        BoundaryChunker {
            config,
            llm,
            fallback,
        }
    }

    fn prompt(window: &str) -> String {
        format!(
            "Find the points where the text below completes a thought, and \
             output the last sentence of each completed span.\n\
             Output one sentence per line, copied exactly as it appears in \
             the text. No numbering, no commentary.\n\n\
             Text:\n{window}\n\nLast sentences:"
        )
    }

    /// Candidate sentences from one window's model response: one per
    /// line, fence lines dropped.
    fn parse_candidates(response: &str) -> Vec<String> {
        response
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("```"))
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl Chunker for BoundaryChunker {
    async fn chunk(&self, content: &str) -> Result<Vec<Chunk>, IndexingError> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let windows = coarse_windows(content, self.config.window, self.config.overlap);
        let mut candidates = Vec::new();
        for (i, window) in windows.iter().enumerate() {
            match self.llm.complete(&Self::prompt(window)).await {
                Ok(response) => {
                    let mut found = Self::parse_candidates(&response);
                    debug!("window {i}: {} boundary candidates", found.len());
                    candidates.append(&mut found);
                }
                Err(e) => {
                    warn!("boundary proposal failed for window {i}: {e}");
                }
            }
        }

        if candidates.is_empty() {
            debug!("no usable boundary candidates; falling back to rule chunker");
            return self.fallback.chunk(content).await;
        }

        let chunks = resolve_boundaries(content, &candidates);
        if chunks.is_empty() {
            return self.fallback.chunk(content).await;
        }
        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "boundary"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::assert_chunk_invariants;
    use sift_models::StubLanguageModel;

    fn config() -> ChunkingConfig {
        ChunkingConfig::default()
    }

    #[tokio::test]
    async fn test_chunks_follow_model_boundaries() {
        let content = "Hello world. This is a test. New sentence.";
        let llm = Arc::new(StubLanguageModel::scripted([
            "Hello world.\nThis is a test.",
        ]));
        let chunker = BoundaryChunker::new(config(), llm);

        let chunks = chunker.chunk(content).await.unwrap();
        assert_chunk_invariants(content, &chunks);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "Hello world.");
    }

    #[tokio::test]
    async fn test_empty_model_output_falls_back_to_rules() {
        let content = "A one. B two. C three. D four.";
        let llm = Arc::new(StubLanguageModel::scripted([""]));
        let chunker = BoundaryChunker::new(config(), llm);

        let chunks = chunker.chunk(content).await.unwrap();
        assert_chunk_invariants(content, &chunks);
        // Rule fallback groups sentences; everything is covered.
        assert!(!chunks.is_empty());
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(" ");
        assert!(joined.contains("D four."));
    }

    #[tokio::test]
    async fn test_unlocatable_candidates_are_dropped() {
        let content = "Alpha. Beta. Gamma.";
        let llm = Arc::new(StubLanguageModel::scripted([
            "Nothing like this appears.\nBeta.",
        ]));
        let chunker = BoundaryChunker::new(config(), llm);

        let chunks = chunker.chunk(content).await.unwrap();
        assert_chunk_invariants(content, &chunks);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Alpha. Beta.");
        assert_eq!(chunks[1].text, " Gamma.");
    }

    #[tokio::test]
    async fn test_empty_content_never_calls_model() {
        let llm = Arc::new(StubLanguageModel::new());
        let chunker = BoundaryChunker::new(config(), Arc::clone(&llm) as Arc<dyn LanguageModel>);
        assert!(chunker.chunk("   ").await.unwrap().is_empty());
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_long_content_queries_every_window() {
        // Two windows at the default 1000/200 geometry.
        let sentence = "This sentence pads the window nicely. ";
        let content = sentence.repeat(40);
        let llm = Arc::new(StubLanguageModel::scripted(["", ""]));
        let chunker = BoundaryChunker::new(config(), Arc::clone(&llm) as Arc<dyn LanguageModel>);

        chunker.chunk(&content).await.unwrap();
        assert_eq!(llm.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_restartable_with_same_responses() {
        let content = "One. Two. Three. Four.";
        let script = ["Two.\nThree."];
        let first = BoundaryChunker::new(config(), Arc::new(StubLanguageModel::scripted(script)))
            .chunk(content)
            .await
            .unwrap();
        let second = BoundaryChunker::new(config(), Arc::new(StubLanguageModel::scripted(script)))
            .chunk(content)
            .await
            .unwrap();
        assert_eq!(first, second);
    }
}
