//! One search pass: allow-list from the oracle, vector search, chunk
//! originals from the preprocessor, rerank, return the best texts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use sift_config::SiftConfig;
use sift_index::VectorStore;
use sift_indexing::text::char_slice;
use sift_models::{Embedder, Reranker};
use sift_wire::{
    AccessReply, AccessRequest, FetchTextReply, FetchTextRequest, ReqSocket,
};

use crate::RetrievalError;

/// Result of one search pass.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The user has no authorized paths at all.
    NoAccess,
    /// Reranked chunk texts, best first. May be empty.
    Hits(Vec<String>),
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    store: Arc<dyn VectorStore>,
    oracle: ReqSocket,
    preprocessor: ReqSocket,
    top_n: usize,
}

impl Retriever {
    pub fn new(
        config: &SiftConfig,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let timeout = Duration::from_secs(config.transport.request_timeout_secs);
        Retriever {
            embedder,
            reranker,
            store,
            oracle: ReqSocket::connect(config.transport.access_addr.clone(), timeout),
            preprocessor: ReqSocket::connect(config.transport.preprocess_req_addr.clone(), timeout),
            top_n: config.retrieval.top_n,
        }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// The user's allow-list, from the oracle's reply channel.
    pub async fn authorized(&self, user_id: &str) -> Result<Vec<String>, RetrievalError> {
        let reply: AccessReply = self
            .oracle
            .request(&AccessRequest {
                user_id: user_id.to_string(),
            })
            .await?;
        match reply {
            AccessReply::Success { pathlist } => Ok(pathlist),
            AccessReply::Error { error } => Err(RetrievalError::Oracle(error)),
        }
    }

    /// One full search pass for a query under a user's permissions.
    pub async fn search_chunks(
        &self,
        user_id: &str,
        query: &str,
    ) -> Result<SearchOutcome, RetrievalError> {
        let allow = self.authorized(user_id).await?;
        if allow.is_empty() {
            return Ok(SearchOutcome::NoAccess);
        }
        debug!("searching {} authorized paths for {user_id}", allow.len());

        let embedding = self.embedder.embed_one(query).await?;
        let hits = self
            .store
            .search(&embedding, 2 * self.top_n, &allow)
            .await?;
        if hits.is_empty() {
            return Ok(SearchOutcome::Hits(Vec::new()));
        }

        // Pull each file's extracted text once, then slice per hit.
        let mut contents: HashMap<String, Option<String>> = HashMap::new();
        let mut texts = Vec::new();
        for hit in &hits {
            if !contents.contains_key(&hit.relative_path) {
                let fetched = self.fetch_content(&hit.relative_path).await;
                contents.insert(hit.relative_path.clone(), fetched);
            }
            if let Some(Some(content)) = contents.get(&hit.relative_path) {
                let slice = char_slice(content, hit.char_start, hit.char_end);
                if !slice.trim().is_empty() {
                    texts.push(slice.to_string());
                }
            }
        }
        if texts.is_empty() {
            return Ok(SearchOutcome::Hits(Vec::new()));
        }

        // A reranker failure degrades to original search order.
        let ranked = match self.reranker.rerank(query, &texts, self.top_n).await {
            Ok(ranked) => ranked.into_iter().map(|d| d.document).collect(),
            Err(e) => {
                warn!("rerank failed, keeping search order: {e}");
                texts.into_iter().take(self.top_n).collect()
            }
        };
        Ok(SearchOutcome::Hits(ranked))
    }

    async fn fetch_content(&self, relative_path: &str) -> Option<String> {
        let reply: FetchTextReply = match self
            .preprocessor
            .request(&FetchTextRequest {
                relative_path: relative_path.to_string(),
            })
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("text fetch for {relative_path} failed: {e}");
                return None;
            }
        };
        match reply {
            FetchTextReply::Success { content, .. } => Some(content),
            FetchTextReply::Error { error } => {
                warn!("text fetch for {relative_path} refused: {error}");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sift_index::{EmbeddingRecord, MemoryStore};
    use sift_models::{StubEmbedder, StubReranker};
    use sift_wire::{RepServer, Shutdown};

    /// A retriever wired to in-test oracle and preprocessor servers.
    pub(crate) async fn test_retriever(
        shutdown: &Shutdown,
        allow: HashMap<String, Vec<String>>,
        files: HashMap<String, String>,
        store: Arc<MemoryStore>,
    ) -> Retriever {
        let mut oracle: RepServer<AccessRequest, AccessReply> =
            RepServer::bind("127.0.0.1:0", shutdown).await.unwrap();
        let oracle_addr = oracle.local_addr().to_string();
        tokio::spawn(async move {
            while let Some((request, responder)) = oracle.recv().await {
                let pathlist = allow.get(&request.user_id).cloned().unwrap_or_default();
                responder.send(AccessReply::Success { pathlist });
            }
        });

        let mut preproc: RepServer<FetchTextRequest, FetchTextReply> =
            RepServer::bind("127.0.0.1:0", shutdown).await.unwrap();
        let preproc_addr = preproc.local_addr().to_string();
        tokio::spawn(async move {
            while let Some((request, responder)) = preproc.recv().await {
                let reply = match files.get(&request.relative_path) {
                    Some(content) => FetchTextReply::Success {
                        content: content.clone(),
                        length: content.chars().count(),
                        name: request.relative_path.clone(),
                        size: content.len(),
                    },
                    None => FetchTextReply::Error {
                        error: "unknown file".to_string(),
                    },
                };
                responder.send(reply);
            }
        });

        let yaml = format!(
            r#"
watch_root: ./data
transport:
  access_addr: {oracle_addr}
  preprocess_req_addr: {preproc_addr}
retrieval:
  top_n: 3
"#
        );
        let config = SiftConfig::from_yaml(&yaml).unwrap();
        Retriever::new(
            &config,
            Arc::new(StubEmbedder::new(8)),
            Arc::new(StubReranker::new()),
            store,
        )
    }

    async fn seed_store(store: &MemoryStore, path: &str, content: &str, spans: &[(usize, usize)]) {
        let embedder = StubEmbedder::new(8);
        for &(start, end) in spans {
            let text = char_slice(content, start, end).to_string();
            let vector = embedder.embed_one(&text).await.unwrap();
            store
                .upsert(&[EmbeddingRecord {
                    relative_path: path.to_string(),
                    char_start: start,
                    char_end: end,
                    vector,
                }])
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_hits_are_substrings_of_current_content() {
        let shutdown = Shutdown::new();
        let content = "Hello world. This is a test. New sentence.";
        let store = Arc::new(MemoryStore::new());
        seed_store(&store, "docs/intro.txt", content, &[(0, 12), (12, 28)]).await;

        let retriever = test_retriever(
            &shutdown,
            HashMap::from([(
                "admin".to_string(),
                vec!["docs/intro.txt".to_string()],
            )]),
            HashMap::from([("docs/intro.txt".to_string(), content.to_string())]),
            store,
        )
        .await;

        let outcome = retriever.search_chunks("admin", "hello world").await.unwrap();
        match outcome {
            SearchOutcome::Hits(texts) => {
                assert!(!texts.is_empty());
                for text in &texts {
                    assert!(content.contains(text.as_str()));
                }
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        shutdown.cancel_all();
    }

    #[tokio::test]
    async fn test_restricted_user_sees_nothing_from_restricted_file() {
        let shutdown = Shutdown::new();
        let secret = "The launch code is hidden here.";
        let store = Arc::new(MemoryStore::new());
        seed_store(&store, "vault/secret.txt", secret, &[(0, 31)]).await;

        let retriever = test_retriever(
            &shutdown,
            HashMap::from([
                ("admin".to_string(), vec!["vault/secret.txt".to_string()]),
                ("guest".to_string(), vec!["docs/public.txt".to_string()]),
            ]),
            HashMap::from([("vault/secret.txt".to_string(), secret.to_string())]),
            store,
        )
        .await;

        match retriever.search_chunks("guest", "launch code").await.unwrap() {
            SearchOutcome::Hits(texts) => assert!(texts.is_empty()),
            other => panic!("unexpected outcome: {other:?}"),
        }
        match retriever.search_chunks("admin", "launch code").await.unwrap() {
            SearchOutcome::Hits(texts) => {
                assert!(texts.iter().any(|t| t.contains("launch code")));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        shutdown.cancel_all();
    }

    #[tokio::test]
    async fn test_user_without_any_paths_gets_no_access() {
        let shutdown = Shutdown::new();
        let retriever = test_retriever(
            &shutdown,
            HashMap::new(),
            HashMap::new(),
            Arc::new(MemoryStore::new()),
        )
        .await;

        let outcome = retriever.search_chunks("stranger", "anything").await.unwrap();
        assert_eq!(outcome, SearchOutcome::NoAccess);
        shutdown.cancel_all();
    }
}
