//! Chat endpoints (§6): unary completion, streaming completion, and
//! history read/clear. Both completion handlers drive the same
//! [`GraphRunner::run_turn`] call; they differ only in which [`TokenSink`]
//! they hand it.

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use futures::stream;
use serde::{Deserialize, Serialize};
use vectorgate_core::models::{ChatMessage, CompletionEnvelope};

use crate::providers::{StreamOrigin, TokenSink};

use super::auth::client_id;
use super::error::AppError;
use super::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<ChatMessage>,
}

pub async fn completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<CompletionEnvelope>, AppError> {
    let client = client_id(&headers);
    let mut sink = crate::graph::NullSink;
    let envelope = state.graph.run_turn(&client, req.messages, &mut sink).await?;
    Ok(Json(envelope))
}

/// Forwards only user-facing token deltas into an mpsc channel that backs
/// the streamed response body; the graph itself appends the terminal
/// `"[stream_finished]"` sentinel once the turn completes.
struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<String>,
}

#[async_trait]
impl TokenSink for ChannelSink {
    async fn push(&mut self, origin: StreamOrigin, delta: &str) {
        if origin == StreamOrigin::UserFacing {
            let _ = self.tx.send(delta.to_string());
        }
    }
}

pub async fn streams(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ChatRequest>) -> Response {
    let client = client_id(&headers);
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    let graph = state.graph.clone();
    tokio::spawn(async move {
        let mut sink = ChannelSink { tx: tx.clone() };
        // §4.1.d/§7: an error reached after headers are flushed (DB
        // unreachable, embedder/LLM upstream failure) can't change the
        // HTTP status, so it is encoded as an assistant apology chunk
        // followed by the terminal sentinel instead of swallowed.
        if let Err(e) = graph.run_turn(&client, req.messages, &mut sink).await {
            let _ = tx.send(format!(
                "Sorry, I ran into a problem while handling this request ({e}). If this keeps happening, please open an issue: https://github.com/vectorgate/vectorgate/issues"
            ));
            let _ = tx.send("[stream_finished]".to_string());
        }
    });

    let body_stream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, std::io::Error>(axum::body::Bytes::from(chunk)), rx))
    });

    // §6: chunked application/octet-stream of raw UTF-8 token bytes
    // terminated by the literal "[stream_finished]" — not text/event-stream,
    // which would advertise SSE `data:` framing the body never emits.
    Response::builder()
        .header(axum::http::header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(body_stream))
        .expect("static response headers are always valid")
}

pub async fn get_history(State(state): State<AppState>, headers: HeaderMap) -> Json<HistoryResponse> {
    let client = client_id(&headers);
    let messages = state.graph.history(&client).await;
    Json(HistoryResponse { messages })
}

pub async fn delete_history(State(state): State<AppState>, headers: HeaderMap) -> axum::http::StatusCode {
    let client = client_id(&headers);
    state.graph.clear_history(&client).await;
    axum::http::StatusCode::OK
}
