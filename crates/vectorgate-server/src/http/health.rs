//! Unauthenticated health probes (§6).

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string(), version: env!("CARGO_PKG_VERSION").to_string() })
}

pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string(), version: env!("CARGO_PKG_VERSION").to_string() })
}

/// Ready once the default database handle can be acquired.
pub async fn readiness(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.registries.databases.acquire("DEFAULT", true).await {
        Ok(_) => "ok",
        Err(_) => "not_ready",
    };
    Json(HealthResponse { status: status.to_string(), version: env!("CARGO_PKG_VERSION").to_string() })
}
