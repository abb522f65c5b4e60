use std::sync::Arc;

use sift_config::SiftConfig;
use sift_index::ChromaStore;
use sift_ingest::PostprocessorService;
use sift_models::{HttpEmbedder, HttpLanguageModel};
use sift_wire::Shutdown;

pub async fn run(
    config: &SiftConfig,
    shutdown: Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    let llm = Arc::new(HttpLanguageModel::new(&config.models));
    let embedder = Arc::new(HttpEmbedder::new(&config.models));
    let store = Arc::new(ChromaStore::new(&config.index));

    PostprocessorService::new(config, llm, embedder, store)
        .run(shutdown)
        .await?;
    Ok(())
}
