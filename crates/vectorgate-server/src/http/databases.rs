//! Database Handle Registry CRUD plus explicit connect (§6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use vectorgate_core::models::DatabaseHandleConfig;

use super::error::AppError;
use super::state::AppState;

#[derive(Serialize)]
pub struct DatabaseStatus {
    pub name: String,
    pub connected: bool,
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<DatabaseStatus>> {
    let names = state.registries.databases.list_names();
    let statuses = names
        .into_iter()
        .map(|name| {
            let connected = state.registries.databases.is_connected(&name);
            DatabaseStatus { name, connected }
        })
        .collect();
    Json(statuses)
}

pub async fn upsert(State(state): State<AppState>, Json(cfg): Json<DatabaseHandleConfig>) -> Result<StatusCode, AppError> {
    state.registries.databases.upsert_config(cfg)?;
    Ok(StatusCode::CREATED)
}

pub async fn connect(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode, AppError> {
    state.registries.databases.connect(&name).await?;
    Ok(StatusCode::OK)
}
