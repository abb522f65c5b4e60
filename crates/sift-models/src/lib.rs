//! Capability interfaces for the model endpoints the pipeline talks to.
//!
//! The core never depends on a specific vendor: it sees a completion
//! model, an embedder, and a reranker. HTTP implementations target
//! OpenAI-style APIs; stubs exist for tests and offline runs.

mod embed;
mod llm;
pub mod recover;
mod rerank;
mod stub;

pub use embed::HttpEmbedder;
pub use llm::HttpLanguageModel;
pub use rerank::HttpReranker;
pub use stub::{StubEmbedder, StubLanguageModel, StubReranker};

use async_trait::async_trait;

/// Model call failures.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Embedding count mismatch: asked for {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        ModelError::Http(e.to_string())
    }
}

/// A chat-completion model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-form completion of a single user prompt.
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;

    /// Completion constrained to a JSON schema. Returns the raw model
    /// output; callers parse it leniently.
    async fn complete_structured(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<String, ModelError>;
}

/// A batch text embedder.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. The result has exactly one vector per input.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ModelError::MalformedOutput("no embedding returned".to_string()))
    }
}

/// One reranked document.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDocument {
    /// Index into the input document list.
    pub index: usize,
    pub relevance_score: f32,
    pub document: String,
}

/// A relevance reranker over candidate documents.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score `documents` against `query` and return the best `top_n`,
    /// highest score first.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RankedDocument>, ModelError>;
}
