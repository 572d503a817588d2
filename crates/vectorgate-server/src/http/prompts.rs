//! HTTP-side prompt listing and override management (§6 "/v1/mcp/prompts").
//! The MCP bridge exposes the same registry as `list_prompts`/`get_prompt`;
//! this is the administrative counterpart for setting overrides and
//! resetting them, which MCP's read-only prompt contract doesn't cover.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use vectorgate_core::models::{PromptCategory, PromptRole};

use super::error::AppError;
use super::state::AppState;

#[derive(Serialize)]
pub struct PromptSummary {
    pub name: String,
    pub category: PromptCategory,
    pub title: String,
    pub description: Option<String>,
    pub role: PromptRole,
    pub tags: Vec<String>,
    pub default_text: String,
    pub override_text: Option<String>,
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<PromptSummary>> {
    let templates = state.registries.prompts.list_all();
    let summaries = templates
        .into_iter()
        .map(|t| {
            let override_text = if state.registries.prompts.has_override(&t.name) {
                state.registries.prompts.resolve(&t.name).map(|r| r.text)
            } else {
                None
            };
            PromptSummary {
                name: t.name,
                category: t.category,
                title: t.title,
                description: t.description,
                role: t.role,
                tags: t.tags,
                default_text: t.default_text,
                override_text,
            }
        })
        .collect();
    Json(summaries)
}

#[derive(Deserialize)]
pub struct SetOverrideRequest {
    pub text: String,
}

pub async fn set_override(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SetOverrideRequest>,
) -> Result<StatusCode, AppError> {
    state
        .registries
        .prompts
        .set_override(&name, req.text)
        .map_err(|msg| vectorgate_core::GatewayError::identity(msg))?;
    Ok(StatusCode::OK)
}

pub async fn reset(State(state): State<AppState>) -> StatusCode {
    state.registries.prompts.reset_all();
    StatusCode::OK
}
