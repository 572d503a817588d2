//! Cloud Auth Profile Registry CRUD (§6). Compartment/bucket listing
//! against a live OCI tenancy is out of scope here — `object_store.rs`
//! documents why only a local-directory object store ships — so this
//! surface is profile CRUD only.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use vectorgate_core::models::CloudAuthProfile;
use vectorgate_core::GatewayError;

use super::error::AppError;
use super::merge_patch;
use super::state::AppState;

pub async fn list(State(state): State<AppState>) -> Json<Vec<CloudAuthProfile>> {
    Json(state.registries.auth.list())
}

pub async fn upsert(State(state): State<AppState>, Json(profile): Json<CloudAuthProfile>) -> Result<StatusCode, AppError> {
    state.registries.auth.upsert(profile)?;
    Ok(StatusCode::CREATED)
}

pub async fn remove(State(state): State<AppState>, Path(profile_name): Path<String>) -> Result<StatusCode, AppError> {
    state.registries.auth.remove(&profile_name)?;
    Ok(StatusCode::OK)
}

pub async fn patch_one(
    State(state): State<AppState>,
    Path(profile_name): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<CloudAuthProfile>, AppError> {
    let existing = state
        .registries
        .auth
        .find(&profile_name)
        .ok_or_else(|| GatewayError::identity(format!("unknown cloud auth profile: {profile_name}")))?;
    let updated: CloudAuthProfile = merge_patch(&existing, patch)?;
    state.registries.auth.upsert(updated.clone())?;
    Ok(Json(updated))
}
