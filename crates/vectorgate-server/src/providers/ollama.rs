//! On-prem Ollama adapter. Ollama's `/api/embed` and `/api/chat` endpoints
//! speak newline-delimited JSON rather than SSE, and take no credential —
//! reachability is whatever `endpoint` the descriptor carries.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use vectorgate_core::embedding::EmbeddingProvider;
use vectorgate_core::models::{ChatMessage, MessageRole};

use super::{classify_status, retry_with_backoff, LanguageModelProvider, StreamOrigin, TokenSink};

const MAX_RETRIES: u32 = 2;

pub struct OllamaEmbeddingProvider {
    model: String,
    endpoint: String,
    client: Client,
}

impl OllamaEmbeddingProvider {
    pub fn new(model: String, endpoint: String) -> Self {
        Self { model, endpoint, client: Client::new() }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        768
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.endpoint.trim_end_matches('/'));
        retry_with_backoff(MAX_RETRIES, |_attempt| async {
            let resp = self
                .client
                .post(&url)
                .json(&json!({ "model": self.model, "input": texts }))
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
                .ok_or_else(|| super::RetryableError::Fatal(anyhow!("malformed ollama embed response")))?;
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

pub struct OllamaLanguageProvider {
    model: String,
    endpoint: String,
    client: Client,
}

impl OllamaLanguageProvider {
    pub fn new(model: String, endpoint: String) -> Self {
        Self { model, endpoint, client: Client::new() }
    }
}

#[async_trait]
impl LanguageModelProvider for OllamaLanguageProvider {
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
        let url = format!("{}/api/chat", self.endpoint.trim_end_matches('/'));
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
            let resp = self
                .client
                .post(&url)
                .json(&json!({ "model": self.model, "messages": payload_messages, "stream": true }))
                .send()
                .await
                .map_err(|e| super::RetryableError::Retryable(anyhow!(e)))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(classify_status(status, &body));
            }
            let text = resp.text().await.map_err(|e| super::RetryableError::Fatal(anyhow!(e)))?;
            let mut content = String::new();
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Ok(event): Result<serde_json::Value, _> = serde_json::from_str(line) else { continue };
                if let Some(delta) = event["message"]["content"].as_str() {
                    content.push_str(delta);
                    sink.push(origin, delta).await;
                }
            }
            Ok(ChatMessage { role: MessageRole::Assistant, content, tool_calls: vec![], tool_call_id: None })
        })
        .await
        .context("ollama chat completion failed")
    }
}
