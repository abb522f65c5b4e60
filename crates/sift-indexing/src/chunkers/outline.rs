use std::sync::Arc;

use async_trait::async_trait;
use sift_config::ChunkingConfig;
use sift_models::{recover, LanguageModel};
use tracing::{debug, warn};

use super::{split_sentences, Chunker, RuleChunker, SentenceSpan};
use crate::text;
use crate::{Chunk, IndexingError};

const SCHEMA_HINT: &str = r#"{"chunks": [{"first": "<string>", "last": "<string>"}]}"#;

/// Sentence-outline chunker. The model sees a numbered sentence list
/// and proposes chunks by their first and last sentences, either as
/// literal text or as indices (0- or 1-based, auto-detected). Proposals
/// are applied with a left-to-right cursor over the sentence list.
pub struct OutlineChunker {
    config: ChunkingConfig,
    llm: Arc<dyn LanguageModel>,
    fallback: RuleChunker,
}

/// One proposed chunk endpoint: literal sentence text or a list index.
#[derive(Debug, Clone, PartialEq)]
enum SentenceRef {
    Text(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
struct Proposal {
    first: SentenceRef,
    last: SentenceRef,
}

impl OutlineChunker {
    pub fn new(config: ChunkingConfig, llm: Arc<dyn LanguageModel>) -> Self {
        let fallback = RuleChunker::new(&config);
        OutlineChunker {
            config,
            llm,
            fallback,
        }
    }

    fn prompt(content: &str, batch: &[SentenceSpan], offset: usize) -> String {
        let mut listing = String::new();
        for (i, span) in batch.iter().enumerate() {
            listing.push_str(&format!("{}. {}\n", offset + i, span.text(content).trim()));
        }
        format!(
            "Group the numbered sentences below into semantically coherent \
             chunks, in order.\n\
             Reply with a single JSON object of the form \
             {SCHEMA_HINT}, where \"first\" and \"last\" are the first and \
             last sentence of each chunk, copied exactly.\n\n\
             Sentences:\n{listing}"
        )
    }

    /// Batch the sentence list so each prompt stays within the coarse
    /// window budget.
    fn batches<'a>(
        &self,
        content: &str,
        sentences: &'a [SentenceSpan],
    ) -> Vec<(usize, &'a [SentenceSpan])> {
        let mut batches = Vec::new();
        let mut start = 0usize;
        let mut size = 0usize;
        for (i, span) in sentences.iter().enumerate() {
            let len = text::char_len(span.text(content));
            if size > 0 && size + len > self.config.window {
                batches.push((start, &sentences[start..i]));
                start = i;
                size = 0;
            }
            size += len;
        }
        if start < sentences.len() {
            batches.push((start, &sentences[start..]));
        }
        batches
    }

    fn parse_ref(value: &serde_json::Value) -> Option<SentenceRef> {
        if let Some(n) = value.as_u64() {
            return Some(SentenceRef::Index(n as usize));
        }
        value
            .as_str()
            .map(|s| SentenceRef::Text(s.trim().to_string()))
    }

    fn parse_proposals(value: &serde_json::Value) -> Vec<Proposal> {
        let Some(items) = value.get("chunks").and_then(|c| c.as_array()) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                let first = item
                    .get("first")
                    .or_else(|| item.get("first_index"))
                    .and_then(Self::parse_ref)?;
                let last = item
                    .get("last")
                    .or_else(|| item.get("last_index"))
                    .and_then(Self::parse_ref)?;
                Some(Proposal { first, last })
            })
            .collect()
    }

    /// If every reported index is >= 1 the model was counting from one;
    /// shift everything down.
    fn normalize_indices(proposals: &mut [Proposal]) {
        let indices: Vec<usize> = proposals
            .iter()
            .flat_map(|p| [&p.first, &p.last])
            .filter_map(|r| match r {
                SentenceRef::Index(i) => Some(*i),
                SentenceRef::Text(_) => None,
            })
            .collect();
        if indices.is_empty() || indices.iter().any(|&i| i == 0) {
            return;
        }
        for proposal in proposals {
            for endpoint in [&mut proposal.first, &mut proposal.last] {
                if let SentenceRef::Index(i) = endpoint {
                    *i -= 1;
                }
            }
        }
    }

    /// Locate a reference at or after `cursor` in the sentence list.
    fn locate(
        content: &str,
        sentences: &[SentenceSpan],
        cursor: usize,
        reference: &SentenceRef,
    ) -> Option<usize> {
        match reference {
            SentenceRef::Index(i) => (*i >= cursor && *i < sentences.len()).then_some(*i),
            SentenceRef::Text(needle) => sentences[cursor..]
                .iter()
                .position(|span| span.text(content).trim() == needle)
                .map(|offset| cursor + offset),
        }
    }

    fn resolve(content: &str, sentences: &[SentenceSpan], proposals: &[Proposal]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut cursor = 0usize;

        let push_range = |chunks: &mut Vec<Chunk>, first: usize, last: usize| {
            let byte_start = sentences[first].byte_start;
            let byte_end = sentences[last].byte_end;
            let (word_start, word_end) = text::word_span(content, byte_start, byte_end);
            chunks.push(Chunk {
                chunk_index: chunks.len(),
                char_start: sentences[first].char_start,
                char_end: sentences[last].char_end,
                word_start,
                word_end,
                text: content[byte_start..byte_end].to_string(),
            });
        };

        for proposal in proposals {
            let Some(first) = Self::locate(content, sentences, cursor, &proposal.first) else {
                continue;
            };
            let Some(last) = Self::locate(content, sentences, first, &proposal.last) else {
                continue;
            };
            push_range(&mut chunks, first, last);
            cursor = last + 1;
        }

        if cursor < sentences.len() {
            push_range(&mut chunks, cursor, sentences.len() - 1);
        }
        chunks
    }

    async fn propose(&self, prompt: &str) -> Option<serde_json::Value> {
        let response = match self.llm.complete(prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!("outline proposal failed: {e}");
                return None;
            }
        };
        if let Some(value) = recover::recover_json(&response) {
            return Some(value);
        }

        // One repair reprompt quoting the malformed output.
        debug!("outline response unparseable; issuing repair reprompt");
        let repair = recover::repair_prompt(SCHEMA_HINT, &response);
        match self.llm.complete(&repair).await {
            Ok(repaired) => recover::recover_json(&repaired),
            Err(e) => {
                warn!("repair reprompt failed: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl Chunker for OutlineChunker {
    async fn chunk(&self, content: &str) -> Result<Vec<Chunk>, IndexingError> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let sentences = split_sentences(content);
        if sentences.is_empty() {
            return Ok(Vec::new());
        }

        let mut proposals = Vec::new();
        for (offset, batch) in self.batches(content, &sentences) {
            let prompt = Self::prompt(content, batch, offset);
            if let Some(value) = self.propose(&prompt).await {
                proposals.extend(Self::parse_proposals(&value));
            }
        }

        if proposals.is_empty() {
            debug!("no usable outline proposals; falling back to rule chunker");
            return self.fallback.chunk(content).await;
        }

        Self::normalize_indices(&mut proposals);
        let chunks = Self::resolve(content, &sentences, &proposals);
        if chunks.is_empty() {
            return self.fallback.chunk(content).await;
        }
        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "outline"
    }
}
