use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sift_config::ModelsConfig;

use crate::{LanguageModel, ModelError};

/// Chat-completions client for an OpenAI-style endpoint.
pub struct HttpLanguageModel {
    client: reqwest::Client,
    endpoint: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl HttpLanguageModel {
    pub fn new(config: &ModelsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        HttpLanguageModel {
            client,
            endpoint: config.llm_endpoint.trim_end_matches('/').to_string(),
            max_tokens: 1024,
            temperature: 0.1,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    async fn chat(&self, body: serde_json::Value) -> Result<String, ModelError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Endpoint { status, body });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ModelError::MalformedOutput("empty choices".to_string()))
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        self.chat(json!({
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        }))
        .await
    }

    async fn complete_structured(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<String, ModelError> {
        self.chat(json!({
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "response", "schema": schema, "strict": true},
            },
        }))
        .await
    }
}
