use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_config::ModelsConfig;

use crate::{ModelError, RankedDocument, Reranker};

/// Client for a `/v1/rerank` endpoint (TEI/Cohere shape).
pub struct HttpReranker {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

impl HttpReranker {
    pub fn new(config: &ModelsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        HttpReranker {
            client,
            endpoint: config.rerank_endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RankedDocument>, ModelError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/v1/rerank", self.endpoint))
            .json(&RerankRequest {
                query,
                documents,
                top_n,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Endpoint { status, body });
        }

        let parsed: RerankResponse = response.json().await?;
        let mut ranked = Vec::with_capacity(parsed.results.len());
        for result in parsed.results {
            let document = documents.get(result.index).ok_or_else(|| {
                ModelError::MalformedOutput(format!(
                    "rerank index {} out of range ({} documents)",
                    result.index,
                    documents.len()
                ))
            })?;
            ranked.push(RankedDocument {
                index: result.index,
                relevance_score: result.relevance_score,
                document: document.clone(),
            });
        }
        ranked.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(top_n);
        Ok(ranked)
    }
}
