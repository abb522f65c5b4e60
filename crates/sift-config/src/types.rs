use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration for every sift component.
///
/// A single file describes the whole deployment; each component reads the
/// sections it needs and ignores the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiftConfig {
    /// Directory tree monitored by the watcher.
    pub watch_root: PathBuf,

    /// File suffixes (without the dot) accepted by the pipeline.
    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Port for the mailbox read API.
    #[serde(default = "default_mailbox_http_port")]
    pub mailbox_http_port: u16,

    /// Port for the chat API.
    #[serde(default = "default_chat_http_port")]
    pub chat_http_port: u16,

    #[serde(default)]
    pub access: AccessConfig,
}

fn default_extensions() -> Vec<String> {
    ["txt", "docx", "pdf", "hwp"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_mailbox_http_port() -> u16 {
    5001
}

fn default_chat_http_port() -> u16 {
    5000
}

/// Endpoints for the socket topology between components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Watcher → preprocessor file events (push/pull).
    #[serde(default = "default_push_addr")]
    pub push_addr: String,
    /// Raw-file fetch served by the watcher (router).
    #[serde(default = "default_router_addr")]
    pub router_addr: String,
    /// Authorization queries served by the watcher (reply).
    #[serde(default = "default_access_addr")]
    pub access_addr: String,
    /// Preprocessor → postprocessor extracted documents (push/pull).
    #[serde(default = "default_preprocess_out_addr")]
    pub preprocess_out_addr: String,
    /// Extracted-text fetch served by the preprocessor (reply).
    #[serde(default = "default_preprocess_req_addr")]
    pub preprocess_req_addr: String,
    /// Notification post served by the mailbox (reply).
    #[serde(default = "default_mailbox_addr")]
    pub mailbox_addr: String,
    /// Deadline for intra-cluster requests, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Drain window between shutdown stages, in seconds.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_push_addr() -> String {
    "127.0.0.1:5555".to_string()
}

fn default_router_addr() -> String {
    "127.0.0.1:5556".to_string()
}

fn default_access_addr() -> String {
    "127.0.0.1:5559".to_string()
}

fn default_preprocess_out_addr() -> String {
    "127.0.0.1:5558".to_string()
}

fn default_preprocess_req_addr() -> String {
    "127.0.0.1:5557".to_string()
}

fn default_mailbox_addr() -> String {
    "127.0.0.1:5560".to_string()
}

fn default_request_timeout() -> u64 {
    5
}

fn default_shutdown_grace() -> u64 {
    2
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            push_addr: default_push_addr(),
            router_addr: default_router_addr(),
            access_addr: default_access_addr(),
            preprocess_out_addr: default_preprocess_out_addr(),
            preprocess_req_addr: default_preprocess_req_addr(),
            mailbox_addr: default_mailbox_addr(),
            request_timeout_secs: default_request_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl TransportConfig {
    /// All configured endpoint addresses, for validation.
    pub fn addresses(&self) -> [&str; 6] {
        [
            &self.push_addr,
            &self.router_addr,
            &self.access_addr,
            &self.preprocess_out_addr,
            &self.preprocess_req_addr,
            &self.mailbox_addr,
        ]
    }
}

/// Chunk boundary strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Model proposes the last sentence of each complete span.
    #[default]
    Boundary,
    /// Model receives a numbered sentence list and returns first/last per chunk.
    Outline,
}

/// Parameters for semantic chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Coarse window length in characters.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Overlap between adjacent windows in characters.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Sentences per chunk in the rule-based fallback.
    #[serde(default = "default_group_size")]
    pub fallback_group_size: usize,
    #[serde(default)]
    pub strategy: ChunkStrategy,
    /// Parallelism bound for per-chunk summarization.
    #[serde(default = "default_summary_fanout")]
    pub summary_fanout: usize,
}

fn default_window() -> usize {
    1000
}

fn default_overlap() -> usize {
    200
}

fn default_group_size() -> usize {
    8
}

fn default_summary_fanout() -> usize {
    4
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            window: default_window(),
            overlap: default_overlap(),
            fallback_group_size: default_group_size(),
            strategy: ChunkStrategy::default(),
            summary_fanout: default_summary_fanout(),
        }
    }
}

/// Model endpoints. All are OpenAI-style HTTP APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_llm_endpoint")]
    pub llm_endpoint: String,
    #[serde(default = "default_embed_endpoint")]
    pub embed_endpoint: String,
    #[serde(default = "default_rerank_endpoint")]
    pub rerank_endpoint: String,
    /// Model name passed to the embedding endpoint.
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    /// Deadline for model calls, in seconds.
    #[serde(default = "default_model_timeout")]
    pub request_timeout_secs: u64,
}

fn default_llm_endpoint() -> String {
    "http://localhost:12345".to_string()
}

fn default_embed_endpoint() -> String {
    "http://localhost:12347".to_string()
}

fn default_rerank_endpoint() -> String {
    "http://localhost:12346".to_string()
}

fn default_embed_model() -> String {
    "Qwen/Qwen3-Embedding-0.6B".to_string()
}

fn default_model_timeout() -> u64 {
    30
}

impl Default for ModelsConfig {
    fn default() -> Self {
        ModelsConfig {
            llm_endpoint: default_llm_endpoint(),
            embed_endpoint: default_embed_endpoint(),
            rerank_endpoint: default_rerank_endpoint(),
            embed_model: default_embed_model(),
            request_timeout_secs: default_model_timeout(),
        }
    }
}

/// Vector index connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_index_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_collection() -> String {
    "sentences".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            endpoint: default_index_endpoint(),
            collection: default_collection(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Retrieval depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Single search pass.
    Normal,
    /// Up to three refinement passes.
    #[default]
    Deep,
    /// Up to five passes with a strategy per pass.
    Deeper,
}

impl RetrievalMode {
    pub fn max_iterations(&self) -> usize {
        match self {
            RetrievalMode::Normal => 1,
            RetrievalMode::Deep => 3,
            RetrievalMode::Deeper => 5,
        }
    }

    pub fn parse(name: &str) -> Option<RetrievalMode> {
        match name {
            "normal" => Some(RetrievalMode::Normal),
            "deep" => Some(RetrievalMode::Deep),
            "deeper" => Some(RetrievalMode::Deeper),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Normal => "normal",
            RetrievalMode::Deep => "deep",
            RetrievalMode::Deeper => "deeper",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub mode: RetrievalMode,
    /// Chunks kept after reranking each search pass.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_top_n() -> usize {
    3
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            mode: RetrievalMode::default(),
            top_n: default_top_n(),
        }
    }
}

/// Seed data for the access oracle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// user id → authorized relative paths.
    #[serde(default)]
    pub users: BTreeMap<String, Vec<String>>,
    /// folder → user ids subscribed to changes inside it.
    #[serde(default)]
    pub subscribers: BTreeMap<String, Vec<String>>,
}

impl AccessConfig {
    /// A small development table so the system works out of the box.
    pub fn development() -> Self {
        let mut users = BTreeMap::new();
        users.insert(
            "user1".to_string(),
            vec![
                "docs/sample.txt".to_string(),
                "docs/sample_2.txt".to_string(),
                "docs/notes.docx".to_string(),
            ],
        );
        users.insert(
            "guest".to_string(),
            vec!["docs/sample.txt".to_string()],
        );
        users.insert(
            "admin".to_string(),
            vec![
                "docs/sample.txt".to_string(),
                "docs/sample_2.txt".to_string(),
                "docs/notes.docx".to_string(),
                "reports/q3.pdf".to_string(),
            ],
        );

        let mut subscribers = BTreeMap::new();
        subscribers.insert(
            "docs".to_string(),
            vec!["user1".to_string(), "admin".to_string()],
        );
        subscribers.insert("reports".to_string(), vec!["admin".to_string()]);

        AccessConfig { users, subscribers }
    }
}
