//! Read-only HTTP surface for the mailbox.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::Mailbox;

/// Build the mailbox read API.
pub fn build_router(mailbox: Arc<Mailbox>) -> Router {
    Router::new()
        .route("/messages/:user_id", get(get_messages))
        .with_state(mailbox)
        .layer(TraceLayer::new_for_http())
}

async fn get_messages(
    State(mailbox): State<Arc<Mailbox>>,
    Path(user_id): Path<String>,
) -> Json<serde_json::Value> {
    let messages = mailbox.fetch(&user_id).await;
    Json(json!({
        "user_id": user_id,
        "message_count": messages.len(),
        "messages": messages,
    }))
}
