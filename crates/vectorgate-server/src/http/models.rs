//! Model Registry CRUD (§6): list, upsert (create-or-replace), patch, and
//! remove.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use vectorgate_core::models::ModelDescriptor;
use vectorgate_core::GatewayError;

use super::error::AppError;
use super::merge_patch;
use super::state::AppState;

pub async fn list(State(state): State<AppState>) -> Json<Vec<ModelDescriptor>> {
    Json(state.registries.models.list())
}

pub async fn upsert(State(state): State<AppState>, Json(descriptor): Json<ModelDescriptor>) -> Result<StatusCode, AppError> {
    state.registries.models.upsert_checked(&state.http_client, descriptor).await?;
    Ok(StatusCode::CREATED)
}

pub async fn patch_one(
    State(state): State<AppState>,
    Path((provider, id)): Path<(String, String)>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<ModelDescriptor>, AppError> {
    let existing = state
        .registries
        .models
        .find(&provider, &id)
        .ok_or_else(|| GatewayError::identity(format!("unknown model: {provider}/{id}")))?;
    let updated: ModelDescriptor = merge_patch(&existing, patch)?;
    state.registries.models.upsert_checked(&state.http_client, updated.clone()).await?;
    Ok(Json(updated))
}

pub async fn remove(State(state): State<AppState>, Path((provider, id)): Path<(String, String)>) -> Result<StatusCode, AppError> {
    state.registries.models.remove(&provider, &id)?;
    Ok(StatusCode::OK)
}
