//! Bearer-token middleware for the HTTP surface (§6: every route under
//! `/v1` except the health probes requires `Authorization: Bearer
//! <api_server_key>`). Comparison is constant-time via `subtle`, the same
//! guard the MCP surface's `X-API-Key` check uses.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use super::error::AppError;
use super::state::AppState;

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

pub async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, AppError> {
    let expected = &state.config.server.api_server_key;
    if expected.is_empty() {
        // No key configured: the operator has opted out of authentication.
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_eq(token, expected) => Ok(next.run(request).await),
        _ => Err(AppError::new(axum::http::StatusCode::UNAUTHORIZED, "authentication", "missing or invalid bearer token")),
    }
}

/// `client` header identifying which `ClientSettings`/chat thread a request
/// applies to. Unauthenticated or header-less requests are treated as the
/// always-present `"server"` client (§3 lifecycle).
pub fn client_id(headers: &HeaderMap) -> String {
    headers
        .get("client")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or("server")
        .to_string()
}
