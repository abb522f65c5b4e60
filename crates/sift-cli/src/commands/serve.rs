use std::sync::Arc;

use sift_config::SiftConfig;
use sift_index::ChromaStore;
use sift_models::{HttpEmbedder, HttpLanguageModel, HttpReranker};
use sift_retrieval::{AppState, Retriever};
use sift_wire::Shutdown;

pub async fn run(
    config: &SiftConfig,
    shutdown: Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    let llm = Arc::new(HttpLanguageModel::new(&config.models));
    let embedder = Arc::new(HttpEmbedder::new(&config.models));
    let reranker = Arc::new(HttpReranker::new(&config.models));
    let store = Arc::new(ChromaStore::new(&config.index));

    let retriever = Arc::new(Retriever::new(config, embedder, reranker, store));
    let state = AppState::new(llm, retriever, config.retrieval.mode);

    sift_retrieval::serve(state, config.chat_http_port, shutdown).await?;
    Ok(())
}
