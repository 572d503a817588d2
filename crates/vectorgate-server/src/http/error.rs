//! JSON error contract (§6 "EXTERNAL INTERFACES"), generalizing the
//! teacher's `{error: {code, message}}` body and `AppError`/`IntoResponse`
//! pattern (`context-harness::server`) from its four hand-picked codes to
//! the full [`GatewayError`] taxonomy.
//!
//! Spec.md's HTTP status map splits what §7 calls one "Availability" error
//! kind into three codes: 422 for a model URL unreachable at registration,
//! 424 for an upstream LLM/embedding provider erroring on a live call, and
//! 503 for a database or outbound-network fetch being unreachable.
//! [`vectorgate_core::GatewayError`] carries that split as three variants
//! (`Availability`, `UpstreamProvider`, `ModelUnreachable`) so this mapping
//! is a straight lookup rather than a collapse.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use vectorgate_core::GatewayError;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status, code: code.into(), message: message.into() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: ErrorDetail { code: self.code, message: self.message } };
        (self.status, Json(body)).into_response()
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let status = match &err {
            GatewayError::Identity(_) => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Authentication(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Availability(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamProvider(_) => StatusCode::FAILED_DEPENDENCY,
            GatewayError::ModelUnreachable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::Capability(_) => StatusCode::BAD_REQUEST,
            GatewayError::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError { status, code: err.kind().to_string(), message: err.detail() }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError { status: StatusCode::INTERNAL_SERVER_ERROR, code: "internal".to_string(), message: err.to_string() }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError { status: StatusCode::INTERNAL_SERVER_ERROR, code: "internal".to_string(), message: err.to_string() }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError { status: StatusCode::INTERNAL_SERVER_ERROR, code: "internal".to_string(), message: err.to_string() }
    }
}
