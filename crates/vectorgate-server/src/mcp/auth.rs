//! MCP-side authentication: a constant-time `X-API-Key` header check,
//! independent of the HTTP surface's bearer token (§6 "a secondary protocol
//! surface").

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

pub async fn require_api_key(api_key: String, request: Request, next: Next) -> Response {
    if api_key.is_empty() {
        return next.run(request).await;
    }

    let provided = request.headers().get("x-api-key").and_then(|v| v.to_str().ok());
    match provided {
        Some(key) if constant_time_eq(key, &api_key) => next.run(request).await,
        _ => (StatusCode::FORBIDDEN, "missing or invalid X-API-Key").into_response(),
    }
}
