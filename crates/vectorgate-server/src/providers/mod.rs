//! Pluggable completion + embedding provider adapters.
//!
//! Generalizes the teacher's `embedding::create_provider` dispatch-by-string
//! pattern (`context-harness::embedding`) from a single `openai/ollama/local`
//! set to the full provider list spec.md's environment-variable table
//! implies: OpenAI, Cohere, Perplexity, on-prem Ollama, on-prem vLLM,
//! on-prem Hugging Face, and OCI GenAI (trusted-cloud). Retry/backoff is
//! shared by every HTTP-backed provider.

pub mod compatible;
pub mod ollama;
pub mod openai;

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::warn;
use vectorgate_core::embedding::EmbeddingProvider;
use vectorgate_core::models::{ChatMessage, ModelDescriptor};

/// Where a streamed token delta originated — used by the graph's sink to
/// drop internal sub-streams before they reach the user (§4.1.c).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOrigin {
    UserFacing,
    Internal,
}

/// Sink that streamed token deltas are pushed to. Modeled as a sink, not a
/// fan-out channel, per DESIGN NOTES §9 — the terminal sentinel write is
/// the graph's responsibility, not the provider's.
#[async_trait]
pub trait TokenSink: Send {
    async fn push(&mut self, origin: StreamOrigin, delta: &str);
}

/// A pluggable chat/completion backend.
#[async_trait]
pub trait LanguageModelProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Tool-definitions-aware chat call. On success the full text content
    /// is returned along with any tool calls the model requested. Tokens
    /// are additionally streamed to `sink` as they arrive, tagged with
    /// `origin`.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
        origin: StreamOrigin,
        sink: &mut dyn TokenSink,
    ) -> Result<ChatMessage>;
}

/// Exponential backoff matching the teacher's embedding retry loop:
/// `1 << (attempt-1).min(5)` seconds, i.e. 1,2,4,8,16,32s capped, retried on
/// 429/5xx and network errors only.
pub async fn retry_with_backoff<T, F, Fut>(max_retries: u32, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, RetryableError>>,
{
    let mut attempt = 0u32;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(RetryableError::Fatal(e)) => return Err(e),
            Err(RetryableError::Retryable(e)) => {
                if attempt >= max_retries {
                    return Err(e);
                }
                let backoff = 1u64 << attempt.min(5);
                warn!(attempt, backoff_secs = backoff, error = %e, "retrying after transient error");
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                attempt += 1;
            }
        }
    }
}

pub enum RetryableError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

/// Classify a reqwest response status into retryable (429/5xx) vs fatal.
pub fn classify_status(status: reqwest::StatusCode, body: &str) -> RetryableError {
    if status.as_u16() == 429 || status.is_server_error() {
        RetryableError::Retryable(anyhow!("provider returned {status}: {body}"))
    } else {
        RetryableError::Fatal(anyhow!("provider returned {status}: {body}"))
    }
}

/// Resolve a [`ModelDescriptor`]'s credential to a literal secret, via a
/// Cloud Auth Profile lookup when `credential` is of the form
/// `"profile:<name>"`, an environment variable lookup when it is of the
/// form `"env:<NAME>"`, or else the literal string itself.
pub fn resolve_credential(
    descriptor: &ModelDescriptor,
    auth: &crate::registries::auth::CloudAuthRegistry,
) -> Option<String> {
    let raw = descriptor.credential.as_ref()?;
    if let Some(profile_name) = raw.strip_prefix("profile:") {
        return auth.find(profile_name).and_then(|p| p.key_material_ref);
    }
    if let Some(var) = raw.strip_prefix("env:") {
        return std::env::var(var).ok();
    }
    Some(raw.clone())
}

/// Create the embedding provider for a descriptor.
pub fn create_embedding_provider(
    descriptor: &ModelDescriptor,
    credential: Option<String>,
) -> Result<Box<dyn EmbeddingProvider>> {
    match descriptor.provider.as_str() {
        "openai" => Ok(Box::new(openai::OpenAiEmbeddingProvider::new(
            descriptor.id.clone(),
            credential.ok_or_else(|| anyhow!("OPENAI_API_KEY not configured"))?,
        ))),
        "ollama" => Ok(Box::new(ollama::OllamaEmbeddingProvider::new(
            descriptor.id.clone(),
            descriptor.endpoint.clone(),
        ))),
        "cohere" => Ok(Box::new(compatible::CohereEmbeddingProvider::new(
            descriptor.id.clone(),
            credential.ok_or_else(|| anyhow!("COHERE_API_KEY not configured"))?,
        ))),
        other => Err(anyhow!("unsupported embedding provider: {other}")),
    }
}

/// Create the language model provider for a descriptor.
pub fn create_language_provider(
    descriptor: &ModelDescriptor,
    credential: Option<String>,
) -> Result<Box<dyn LanguageModelProvider>> {
    match descriptor.provider.as_str() {
        "openai" => Ok(Box::new(openai::OpenAiLanguageProvider::new(
            descriptor.id.clone(),
            credential.ok_or_else(|| anyhow!("OPENAI_API_KEY not configured"))?,
        ))),
        "ollama" => Ok(Box::new(ollama::OllamaLanguageProvider::new(
            descriptor.id.clone(),
            descriptor.endpoint.clone(),
        ))),
        "pplx" => Ok(Box::new(compatible::OpenAiCompatibleProvider::new(
            descriptor.id.clone(),
            "https://api.perplexity.ai".into(),
            credential.ok_or_else(|| anyhow!("PPLX_API_KEY not configured"))?,
        ))),
        "vllm" => Ok(Box::new(compatible::OpenAiCompatibleProvider::new(
            descriptor.id.clone(),
            descriptor.endpoint.clone(),
            credential.unwrap_or_default(),
        ))),
        "hf" => Ok(Box::new(compatible::OpenAiCompatibleProvider::new(
            descriptor.id.clone(),
            descriptor.endpoint.clone(),
            credential.unwrap_or_default(),
        ))),
        "oci_genai" => Ok(Box::new(compatible::OciGenAiProvider::new(descriptor.id.clone()))),
        other => Err(anyhow!("unsupported language provider: {other}")),
    }
}

/// Resolve a model id (as referenced by `ClientSettings.language_model.model`
/// or `.vector_search.model`) to a live provider via the Model Registry and
/// Cloud Auth Registry. Disabled or unknown models surface as the
/// appropriate [`vectorgate_core::GatewayError`] kind rather than panicking,
/// so the graph's error semantics (§4.1.d) can turn them into the canned
/// "unable to initialise" envelope.
pub fn resolve_language_model(
    registries: &crate::registries::Registries,
    model_id: &str,
) -> Result<Box<dyn LanguageModelProvider>, vectorgate_core::GatewayError> {
    let descriptor = registries
        .models
        .find_by_id(model_id)
        .ok_or_else(|| vectorgate_core::GatewayError::identity(format!("unknown model: {model_id}")))?;
    if !descriptor.enabled {
        return Err(vectorgate_core::GatewayError::availability(format!("model '{model_id}' is disabled")));
    }
    let credential = resolve_credential(&descriptor, &registries.auth);
    create_language_provider(&descriptor, credential)
        .map_err(|e| vectorgate_core::GatewayError::availability(e.to_string()))
}

/// As [`resolve_language_model`], for embedding providers (the Vector Store
/// Engine's ingest/retrieve paths).
pub fn resolve_embedding_model(
    registries: &crate::registries::Registries,
    model_id: &str,
) -> Result<Box<dyn EmbeddingProvider>, vectorgate_core::GatewayError> {
    let descriptor = registries
        .models
        .find_by_id(model_id)
        .ok_or_else(|| vectorgate_core::GatewayError::identity(format!("unknown model: {model_id}")))?;
    if !descriptor.enabled {
        return Err(vectorgate_core::GatewayError::availability(format!("model '{model_id}' is disabled")));
    }
    let credential = resolve_credential(&descriptor, &registries.auth);
    create_embedding_provider(&descriptor, credential)
        .map_err(|e| vectorgate_core::GatewayError::availability(e.to_string()))
}
