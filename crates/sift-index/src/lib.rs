//! Vector index abstraction.
//!
//! The index itself is an external system; the pipeline only needs
//! upsert, delete-by-path, and allow-list-restricted search. Record
//! identity is the deterministic `(path, char_start, char_end)`
//! fingerprint, which is what makes delete-then-insert safe to observe
//! concurrently.

mod chroma;
mod memory;

pub use chroma::ChromaStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

/// Vector store failures.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Index endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("Malformed index response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for IndexError {
    fn from(e: reqwest::Error) -> Self {
        IndexError::Http(e.to_string())
    }
}

/// One embedded chunk as stored in the index.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub relative_path: String,
    pub char_start: usize,
    pub char_end: usize,
    pub vector: Vec<f32>,
}

impl EmbeddingRecord {
    /// Deterministic record id: same chunk, same id, across runs.
    pub fn id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.relative_path, self.char_start, self.char_end
        )
    }
}

/// A search result, pointing back into a file's extracted text.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub relative_path: String,
    pub char_start: usize,
    pub char_end: usize,
    pub distance: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert records; an existing record with the same id is replaced.
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<(), IndexError>;

    /// All current records for a file, vectors included. Used to
    /// capture a generation before replacing it.
    async fn fetch_by_path(&self, relative_path: &str) -> Result<Vec<EmbeddingRecord>, IndexError>;

    /// Remove every record for a file. Removing an unknown path is a no-op.
    async fn delete_by_path(&self, relative_path: &str) -> Result<(), IndexError>;

    /// Nearest records to `embedding`, restricted to `allow` paths.
    /// An empty allow-list yields no hits: unauthorized callers see
    /// nothing rather than everything.
    async fn search(
        &self,
        embedding: &[f32],
        n_results: usize,
        allow: &[String],
    ) -> Result<Vec<SearchHit>, IndexError>;
}
