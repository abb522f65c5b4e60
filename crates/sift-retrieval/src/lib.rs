//! Retrieval: allow-list-scoped vector search with reranking, driven by
//! an iterative agent, exposed over a small chat API.

mod agent;
mod retriever;
mod server;

pub use agent::{ChatTurn, RagAgent};
pub use retriever::{Retriever, SearchOutcome};
pub use server::{build_router, serve, AppState};

/// Retrieval failures.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Transport error: {0}")]
    Wire(#[from] sift_wire::WireError),

    #[error("Model error: {0}")]
    Model(#[from] sift_models::ModelError),

    #[error("Index error: {0}")]
    Index(#[from] sift_index::IndexError),

    #[error("Oracle error: {0}")]
    Oracle(String),
}
