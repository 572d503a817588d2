//! Testbed endpoints (§6, §4.4): testset generation, retrieval, deletion,
//! evaluation, and evaluation retrieval.
//!
//! `tid`/`eid` are opaque uuids generated lowercase internally
//! ([`crate::testbed::store::TestbedStore`]); spec.md requires them
//! "surfaced uppercase", so every response here uppercases them and every
//! path parameter is lowercased again before it reaches the store.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use vectorgate_core::models::{EvaluationReport, TestSet};

use super::auth::client_id;
use super::error::AppError;
use super::state::AppState;

#[derive(Deserialize)]
pub struct GenerateRequest {
    pub name: String,
    pub tid: Option<String>,
    pub documents: Vec<DocumentInput>,
    #[serde(default = "default_questions_per_file")]
    pub questions_per_file: usize,
}

#[derive(Deserialize)]
pub struct DocumentInput {
    pub filename: String,
    pub text: String,
}

fn default_questions_per_file() -> usize {
    3
}

#[derive(Serialize)]
pub struct TestSetResponse {
    pub tid: String,
}

pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<TestSetResponse>, AppError> {
    let client = client_id(&headers);
    let settings = state.registries.settings.get_or_create(&client);
    let documents: Vec<(String, String)> = req.documents.into_iter().map(|d| (d.filename, d.text)).collect();
    let tid_lower = req.tid.map(|t| t.to_ascii_lowercase());

    let tid = state
        .testbed
        .generate(&req.name, tid_lower.as_deref(), &documents, req.questions_per_file, &settings)
        .await?;
    Ok(Json(TestSetResponse { tid: tid.to_ascii_uppercase() }))
}

#[derive(Serialize)]
pub struct TestSetSummary {
    pub tid: String,
    pub name: String,
}

pub async fn list_testsets(State(state): State<AppState>) -> Result<Json<Vec<TestSetSummary>>, AppError> {
    let sets = state.testbed.list_testsets().await?;
    Ok(Json(sets.into_iter().map(|(tid, name)| TestSetSummary { tid: tid.to_ascii_uppercase(), name }).collect()))
}

fn uppercased_testset(mut testset: TestSet) -> TestSet {
    testset.tid = testset.tid.to_ascii_uppercase();
    testset
}

pub async fn get_testset(State(state): State<AppState>, Path(tid): Path<String>) -> Result<Json<TestSet>, AppError> {
    let testset = state
        .testbed
        .get_testset(&tid.to_ascii_lowercase())
        .await?
        .ok_or_else(|| vectorgate_core::GatewayError::identity(format!("unknown testset: {tid}")))?;
    Ok(Json(uppercased_testset(testset)))
}

pub async fn delete_testset(State(state): State<AppState>, Path(tid): Path<String>) -> Result<axum::http::StatusCode, AppError> {
    state.testbed.delete_testset(&tid.to_ascii_lowercase()).await?;
    Ok(axum::http::StatusCode::OK)
}

fn uppercased_report(mut report: EvaluationReport) -> EvaluationReport {
    report.eid = report.eid.to_ascii_uppercase();
    report.tid = report.tid.to_ascii_uppercase();
    report
}

pub async fn evaluate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tid): Path<String>,
) -> Result<Json<EvaluationReport>, AppError> {
    let client = client_id(&headers);
    let settings = state.registries.settings.get_or_create(&client);
    let report = state.testbed.evaluate(&tid.to_ascii_lowercase(), &state.graph, &settings).await?;
    Ok(Json(uppercased_report(report)))
}

#[derive(Serialize)]
pub struct EvaluationSummary {
    pub eid: String,
    pub evaluated_at: chrono::DateTime<chrono::Utc>,
    pub correctness: f64,
}

pub async fn list_evaluations(State(state): State<AppState>, Path(tid): Path<String>) -> Result<Json<Vec<EvaluationSummary>>, AppError> {
    let rows = state.testbed.list_evaluations(&tid.to_ascii_lowercase()).await?;
    Ok(Json(
        rows.into_iter()
            .map(|(eid, evaluated_at, correctness)| EvaluationSummary { eid: eid.to_ascii_uppercase(), evaluated_at, correctness })
            .collect(),
    ))
}

pub async fn get_evaluation(State(state): State<AppState>, Path(eid): Path<String>) -> Result<Json<EvaluationReport>, AppError> {
    let report = state
        .testbed
        .get_evaluation(&eid.to_ascii_lowercase())
        .await?
        .ok_or_else(|| vectorgate_core::GatewayError::identity(format!("unknown evaluation: {eid}")))?;
    Ok(Json(uppercased_report(report)))
}
