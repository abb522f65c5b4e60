//! Chat API over the retrieval agent.
//!
//! Recoverable problems come back as HTTP 200 with a structured error;
//! 4xx is reserved for malformed requests.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use sift_wire::Shutdown;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use sift_config::RetrievalMode;
use sift_models::LanguageModel;

use crate::agent::{ChatTurn, RagAgent};
use crate::retriever::Retriever;

/// Shared state for the chat handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    llm: Arc<dyn LanguageModel>,
    retriever: Arc<Retriever>,
    default_mode: RetrievalMode,
}

impl AppState {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        retriever: Arc<Retriever>,
        default_mode: RetrievalMode,
    ) -> Self {
        AppState {
            inner: Arc::new(Inner {
                llm,
                retriever,
                default_mode,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    history: Option<Vec<ChatTurn>>,
}

/// Build the chat router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the chat API until the final shutdown stage fires. An outer
/// HTTP surface drains last, after the wire sockets it depends on.
pub async fn serve(state: AppState, port: u16, shutdown: Shutdown) -> Result<(), std::io::Error> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("chat API listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.request_token().cancelled_owned())
        .await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy"}))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let message = request.message.trim();
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "error": "message is required"})),
        );
    }
    let user_id = match request.user_id.as_deref().map(str::trim) {
        Some(user_id) if !user_id.is_empty() => user_id.to_string(),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"status": "error", "error": "user_id is required"})),
            )
        }
    };

    // An unknown mode falls back to the configured default.
    let mode = request
        .mode
        .as_deref()
        .and_then(RetrievalMode::parse)
        .unwrap_or(state.inner.default_mode);

    let agent = RagAgent::new(
        Arc::clone(&state.inner.llm),
        Arc::clone(&state.inner.retriever),
        mode,
    );
    let history = request.history.unwrap_or_default();

    match agent.process(&user_id, message, &history).await {
        Ok(response) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "response": response,
                "mode": mode.as_str(),
            })),
        ),
        Err(e) => {
            warn!("chat request failed: {e}");
            (
                StatusCode::OK,
                Json(json!({"status": "error", "error": e.to_string()})),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::tests::test_retriever;
    use axum::body::Body;
    use axum::http::Request;
    use sift_index::MemoryStore;
    use sift_models::StubLanguageModel;
    use std::collections::HashMap;
    use tower::ServiceExt;

    async fn make_state(shutdown: &Shutdown, responses: &[&str]) -> AppState {
        let retriever = Arc::new(
            test_retriever(
                shutdown,
                HashMap::from([("u".to_string(), vec!["docs/a.txt".to_string()])]),
                HashMap::new(),
                Arc::new(MemoryStore::new()),
            )
            .await,
        );
        let llm = Arc::new(StubLanguageModel::scripted(responses.to_vec()));
        AppState::new(llm, retriever, RetrievalMode::Deep)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let shutdown = Shutdown::new();
        let app = build_router(make_state(&shutdown, &[]).await);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "healthy");
        shutdown.cancel_all();
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let shutdown = Shutdown::new();
        let app = build_router(
            make_state(
                &shutdown,
                &[r#"{"answer": "the answer", "need_more": false}"#],
            )
            .await,
        );
        let resp = app
            .oneshot(chat_request(
                r#"{"message": "question?", "mode": "normal", "user_id": "u"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["response"], "the answer");
        assert_eq!(json["mode"], "normal");
        shutdown.cancel_all();
    }

    #[tokio::test]
    async fn test_empty_message_is_bad_request() {
        let shutdown = Shutdown::new();
        let app = build_router(make_state(&shutdown, &[]).await);
        let resp = app
            .oneshot(chat_request(r#"{"message": "   ", "user_id": "u"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        shutdown.cancel_all();
    }

    #[tokio::test]
    async fn test_missing_user_is_bad_request() {
        let shutdown = Shutdown::new();
        let app = build_router(make_state(&shutdown, &[]).await);
        let resp = app
            .oneshot(chat_request(r#"{"message": "hello"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        shutdown.cancel_all();
    }

    #[tokio::test]
    async fn test_unknown_mode_falls_back_to_default() {
        let shutdown = Shutdown::new();
        let app = build_router(
            make_state(
                &shutdown,
                &[r#"{"answer": "ok", "need_more": false}"#],
            )
            .await,
        );
        let resp = app
            .oneshot(chat_request(
                r#"{"message": "question?", "mode": "frantic", "user_id": "u"}"#,
            ))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["mode"], "deep");
        shutdown.cancel_all();
    }

    #[tokio::test]
    async fn test_no_access_is_success_not_error() {
        let shutdown = Shutdown::new();
        // "nobody" has no allow-list entries.
        let app = build_router(make_state(&shutdown, &[]).await);
        let resp = app
            .oneshot(chat_request(
                r#"{"message": "question?", "user_id": "nobody"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "success");
        assert!(json["response"]
            .as_str()
            .unwrap()
            .contains("do not have access"));
        shutdown.cancel_all();
    }
}
