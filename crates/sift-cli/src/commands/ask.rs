use std::sync::Arc;

use sift_config::{RetrievalMode, SiftConfig};
use sift_index::ChromaStore;
use sift_models::{HttpEmbedder, HttpLanguageModel, HttpReranker};
use sift_retrieval::{RagAgent, Retriever};

pub async fn run(
    config: &SiftConfig,
    question: &str,
    user: &str,
    mode: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mode = mode
        .and_then(RetrievalMode::parse)
        .unwrap_or(config.retrieval.mode);

    let llm = Arc::new(HttpLanguageModel::new(&config.models));
    let embedder = Arc::new(HttpEmbedder::new(&config.models));
    let reranker = Arc::new(HttpReranker::new(&config.models));
    let store = Arc::new(ChromaStore::new(&config.index));
    let retriever = Arc::new(Retriever::new(config, embedder, reranker, store));

    let agent = RagAgent::new(llm, retriever, mode);
    let answer = agent.process(user, question, &[]).await?;
    println!("{answer}");
    Ok(())
}
