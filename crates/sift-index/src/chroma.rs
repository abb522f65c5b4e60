//! HTTP client for a Chroma-style vector store.
//!
//! The collection is resolved lazily on first use with get-or-create,
//! so components can start before the index is reachable.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sift_config::IndexConfig;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{EmbeddingRecord, IndexError, SearchHit, VectorStore};

pub struct ChromaStore {
    client: reqwest::Client,
    endpoint: String,
    collection_name: String,
    collection_id: OnceCell<String>,
}

#[derive(Deserialize)]
struct Collection {
    id: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    metadatas: Vec<Vec<serde_json::Value>>,
    distances: Option<Vec<Vec<f32>>>,
}

#[derive(Deserialize)]
struct GetResponse {
    metadatas: Option<Vec<serde_json::Value>>,
    embeddings: Option<Vec<Vec<f32>>>,
}

impl ChromaStore {
    pub fn new(config: &IndexConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        ChromaStore {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            collection_name: config.collection.clone(),
            collection_id: OnceCell::new(),
        }
    }

    async fn collection_id(&self) -> Result<&str, IndexError> {
        self.collection_id
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .post(format!("{}/api/v1/collections", self.endpoint))
                    .json(&json!({"name": self.collection_name, "get_or_create": true}))
                    .send()
                    .await?;
                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    return Err(IndexError::Endpoint { status, body });
                }
                let collection: Collection = response.json().await?;
                debug!(
                    "resolved collection '{}' to {}",
                    self.collection_name, collection.id
                );
                Ok(collection.id)
            })
            .await
            .map(String::as_str)
    }

    fn op_url(&self, collection_id: &str, op: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{}",
            self.endpoint, collection_id, op
        )
    }

    async fn post_op(&self, op: &str, body: serde_json::Value) -> Result<reqwest::Response, IndexError> {
        let collection_id = self.collection_id().await?.to_string();
        let response = self
            .client
            .post(self.op_url(&collection_id, op))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Endpoint { status, body });
        }
        Ok(response)
    }

    fn span_from_metadata(
        metadata: &serde_json::Value,
    ) -> Result<(String, usize, usize), IndexError> {
        let relative_path = metadata
            .get("relative_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                IndexError::MalformedResponse("metadata missing relative_path".to_string())
            })?;
        let char_start = metadata
            .get("char_start")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                IndexError::MalformedResponse("metadata missing char_start".to_string())
            })?;
        let char_end = metadata
            .get("char_end")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| IndexError::MalformedResponse("metadata missing char_end".to_string()))?;
        Ok((
            relative_path.to_string(),
            char_start as usize,
            char_end as usize,
        ))
    }

    fn hit_from_metadata(
        metadata: &serde_json::Value,
        distance: f32,
    ) -> Result<SearchHit, IndexError> {
        let (relative_path, char_start, char_end) = Self::span_from_metadata(metadata)?;
        Ok(SearchHit {
            relative_path,
            char_start,
            char_end,
            distance,
        })
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<(), IndexError> {
        if records.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = records.iter().map(EmbeddingRecord::id).collect();
        let embeddings: Vec<&[f32]> = records.iter().map(|r| r.vector.as_slice()).collect();
        let metadatas: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                json!({
                    "relative_path": r.relative_path,
                    "char_start": r.char_start,
                    "char_end": r.char_end,
                })
            })
            .collect();

        self.post_op(
            "upsert",
            json!({"ids": ids, "embeddings": embeddings, "metadatas": metadatas}),
        )
        .await?;
        Ok(())
    }

    async fn fetch_by_path(&self, relative_path: &str) -> Result<Vec<EmbeddingRecord>, IndexError> {
        let response = self
            .post_op(
                "get",
                json!({
                    "where": {"relative_path": relative_path},
                    "include": ["metadatas", "embeddings"],
                }),
            )
            .await?;

        let parsed: GetResponse = response
            .json()
            .await
            .map_err(|e| IndexError::MalformedResponse(e.to_string()))?;

        let metadatas = parsed.metadatas.unwrap_or_default();
        let embeddings = parsed.embeddings.unwrap_or_default();
        if metadatas.len() != embeddings.len() {
            return Err(IndexError::MalformedResponse(format!(
                "get returned {} metadatas but {} embeddings",
                metadatas.len(),
                embeddings.len()
            )));
        }

        metadatas
            .iter()
            .zip(embeddings)
            .map(|(metadata, vector)| {
                let (relative_path, char_start, char_end) = Self::span_from_metadata(metadata)?;
                Ok(EmbeddingRecord {
                    relative_path,
                    char_start,
                    char_end,
                    vector,
                })
            })
            .collect()
    }

    async fn delete_by_path(&self, relative_path: &str) -> Result<(), IndexError> {
        self.post_op("delete", json!({"where": {"relative_path": relative_path}}))
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        n_results: usize,
        allow: &[String],
    ) -> Result<Vec<SearchHit>, IndexError> {
        if allow.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .post_op(
                "query",
                json!({
                    "query_embeddings": [embedding],
                    "n_results": n_results,
                    "include": ["metadatas", "distances"],
                    "where": {"relative_path": {"$in": allow}},
                }),
            )
            .await?;

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| IndexError::MalformedResponse(e.to_string()))?;

        let metadatas = parsed.metadatas.into_iter().next().unwrap_or_default();
        let distances = parsed
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        metadatas
            .iter()
            .enumerate()
            .map(|(i, metadata)| {
                let distance = distances.get(i).copied().unwrap_or(0.0);
                Self::hit_from_metadata(metadata, distance)
            })
            .collect()
    }
}
