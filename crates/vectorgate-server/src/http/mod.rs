//! Axum HTTP surface (§6 "EXTERNAL INTERFACES"): every route lives under
//! `/v1`, CORS is wide open the way the teacher's server permits
//! browser-based and cross-origin MCP tool callers, and every route but
//! the three health probes requires the bearer middleware.

pub mod auth;
pub mod chat;
pub mod databases;
pub mod embed;
pub mod error;
pub mod health;
pub mod models;
pub mod oci;
pub mod prompts;
pub mod state;
pub mod testbed;

pub use state::AppState;

use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use error::AppError;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let public = Router::new()
        .route("/v1/healthz", get(health::healthz))
        .route("/v1/liveness", get(health::liveness))
        .route("/v1/readiness", get(health::readiness));

    let protected = Router::new()
        .route("/v1/chat/completions", post(chat::completions))
        .route("/v1/chat/streams", post(chat::streams))
        .route("/v1/chat/history", get(chat::get_history).delete(chat::delete_history))
        .route("/v1/models", get(models::list).post(models::upsert))
        .route("/v1/models/{provider}/{id}", patch(models::patch_one).delete(models::remove))
        .route("/v1/databases", get(databases::list).patch(databases::upsert))
        .route("/v1/databases/{name}/connect", post(databases::connect))
        .route("/v1/embed/local/store", post(embed::local_store))
        .route("/v1/embed/web/store", post(embed::web_store))
        .route("/v1/embed/sql/store", post(embed::sql_store))
        .route("/v1/embed/", post(embed::ingest))
        .route("/v1/embed/refresh", post(embed::refresh))
        .route("/v1/embed/{vs}", delete(embed::drop_store))
        .route("/v1/embed/{vs}/files", get(embed::list_files))
        .route("/v1/oci", get(oci::list).patch(oci::upsert))
        .route("/v1/oci/{profile_name}", patch(oci::patch_one).delete(oci::remove))
        .route("/v1/mcp/prompts", get(prompts::list))
        .route("/v1/mcp/prompts/{name}", patch(prompts::set_override))
        .route("/v1/mcp/prompts/reset", post(prompts::reset))
        .route("/v1/testbed/generate", post(testbed::generate))
        .route("/v1/testbed", get(testbed::list_testsets))
        .route("/v1/testbed/{tid}", get(testbed::get_testset).delete(testbed::delete_testset))
        .route("/v1/testbed/{tid}/evaluate", post(testbed::evaluate))
        .route("/v1/testbed/{tid}/evaluations", get(testbed::list_evaluations))
        .route("/v1/testbed/evaluations/{eid}", get(testbed::get_evaluation))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer));

    public.merge(protected).layer(cors).with_state(state)
}

/// Shallow JSON-merge `patch` onto `target`'s serialized form, then
/// re-deserialize. Used by the registry PATCH handlers (models, databases,
/// OCI profiles), which accept a partial object rather than requiring the
/// full descriptor on every edit.
pub(crate) fn merge_patch<T: Serialize + DeserializeOwned>(target: &T, patch: serde_json::Value) -> Result<T, AppError> {
    let mut value = serde_json::to_value(target).map_err(|e| AppError::new(axum::http::StatusCode::BAD_REQUEST, "validation", e.to_string()))?;
    if let (serde_json::Value::Object(base), serde_json::Value::Object(patch_obj)) = (&mut value, patch) {
        for (k, v) in patch_obj {
            base.insert(k, v);
        }
    }
    serde_json::from_value(value).map_err(|e| AppError::new(axum::http::StatusCode::BAD_REQUEST, "validation", e.to_string()))
}
