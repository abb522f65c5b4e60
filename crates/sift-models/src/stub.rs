//! Deterministic in-process stand-ins for the model endpoints.
//! Used by tests and by offline runs of the pipeline.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Embedder, LanguageModel, ModelError, RankedDocument, Reranker};

/// Language model that replays scripted responses in order, then an
/// empty string once the script runs out.
#[derive(Default)]
pub struct StubLanguageModel {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<String>>,
}

impl StubLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StubLanguageModel {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Prompts seen so far, for assertions.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self, prompt: &str) -> String {
        self.calls.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for StubLanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        Ok(self.next(prompt))
    }

    async fn complete_structured(
        &self,
        prompt: &str,
        _schema: &serde_json::Value,
    ) -> Result<String, ModelError> {
        Ok(self.next(prompt))
    }
}

/// Embedder producing a deterministic vector from the text bytes, so
/// identical texts always embed identically.
pub struct StubEmbedder {
    dimensions: usize,
}

impl StubEmbedder {
    pub fn new(dimensions: usize) -> Self {
        StubEmbedder { dimensions }
    }
}

impl Default for StubEmbedder {
    fn default() -> Self {
        StubEmbedder::new(16)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dimensions];
                for (i, byte) in text.bytes().enumerate() {
                    vector[i % self.dimensions] += byte as f32 / 255.0;
                }
                vector
            })
            .collect())
    }
}

/// Reranker that scores by naive term overlap with the query.
#[derive(Default)]
pub struct StubReranker;

impl StubReranker {
    pub fn new() -> Self {
        StubReranker
    }
}

#[async_trait]
impl Reranker for StubReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RankedDocument>, ModelError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        let mut ranked: Vec<RankedDocument> = documents
            .iter()
            .enumerate()
            .map(|(index, document)| {
                let lower = document.to_lowercase();
                let score = terms.iter().filter(|t| lower.contains(*t)).count() as f32;
                RankedDocument {
                    index,
                    relevance_score: score,
                    document: document.clone(),
                }
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(top_n);
        Ok(ranked)
    }
}
