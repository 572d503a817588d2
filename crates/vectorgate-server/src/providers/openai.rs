//! OpenAI embedding + chat adapter.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::json;
use vectorgate_core::embedding::EmbeddingProvider;
use vectorgate_core::models::{ChatMessage, MessageRole, ToolCall};

use super::{classify_status, retry_with_backoff, LanguageModelProvider, StreamOrigin, TokenSink};

const MAX_RETRIES: u32 = 3;

pub struct OpenAiEmbeddingProvider {
    model: String,
    api_key: String,
    client: Client,
}

impl OpenAiEmbeddingProvider {
    pub fn new(model: String, api_key: String) -> Self {
        Self { model, api_key, client: Client::new() }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        // text-embedding-3-small's native dimensionality; callers that
        // configure a different OpenAI embedding model should override via
        // the model descriptor's max_chunk_size field if this ever matters.
        1536
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        retry_with_backoff(MAX_RETRIES, |_attempt| async {
            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .bearer_auth(&self.api_key)
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
            let data = body["data"]
                .as_array()
                .ok_or_else(|| super::RetryableError::Fatal(anyhow!("malformed embeddings response")))?;
            let mut out = Vec::with_capacity(data.len());
            for item in data {
                let vec: Vec<f32> = item["embedding"]
                    .as_array()
                    .ok_or_else(|| super::RetryableError::Fatal(anyhow!("missing embedding array")))?
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                    .collect();
                out.push(vec);
            }
            Ok(out)
        })
        .await
    }
}

pub struct OpenAiLanguageProvider {
    model: String,
    api_key: String,
    client: Client,
}

impl OpenAiLanguageProvider {
    pub fn new(model: String, api_key: String) -> Self {
        Self { model, api_key, client: Client::new() }
    }
}

#[async_trait]
impl LanguageModelProvider for OpenAiLanguageProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
        origin: StreamOrigin,
        sink: &mut dyn TokenSink,
    ) -> Result<ChatMessage> {
        let payload_messages: Vec<serde_json::Value> = messages.iter().map(to_openai_message).collect();
        let mut body = json!({
            "model": self.model,
            "messages": payload_messages,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        retry_with_backoff(MAX_RETRIES, |_attempt| async {
            let resp = self
                .client
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| super::RetryableError::Retryable(anyhow!(e)))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(classify_status(status, &text));
            }

            let mut stream = resp.bytes_stream();
            let mut content = String::new();
            let mut tool_calls: Vec<ToolCall> = Vec::new();
            let mut buf = String::new();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| super::RetryableError::Retryable(anyhow!(e)))?;
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf.drain(..=pos);
                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data == "[DONE]" {
                        continue;
                    }
                    let Ok(event): Result<serde_json::Value, _> = serde_json::from_str(data) else {
                        continue;
                    };
                    if let Some(delta) = event["choices"][0]["delta"]["content"].as_str() {
                        content.push_str(delta);
                        sink.push(origin, delta).await;
                    }
                    if let Some(calls) = event["choices"][0]["delta"]["tool_calls"].as_array() {
                        for call in calls {
                            let idx = call["index"].as_u64().unwrap_or(0) as usize;
                            if idx >= tool_calls.len() {
                                tool_calls.push(ToolCall {
                                    id: call["id"].as_str().unwrap_or_default().to_string(),
                                    name: String::new(),
                                    arguments: serde_json::Value::Null,
                                });
                            }
                            if let Some(name) = call["function"]["name"].as_str() {
                                tool_calls[idx].name = name.to_string();
                            }
                            if let Some(args) = call["function"]["arguments"].as_str() {
                                let merged = match &tool_calls[idx].arguments {
                                    serde_json::Value::String(existing) => format!("{existing}{args}"),
                                    _ => args.to_string(),
                                };
                                tool_calls[idx].arguments = serde_json::Value::String(merged);
                            }
                        }
                    }
                }
            }

            Ok(ChatMessage {
                role: MessageRole::Assistant,
                content,
                tool_calls,
                tool_call_id: None,
            })
        })
        .await
        .context("openai chat completion failed")
    }
}

fn to_openai_message(m: &ChatMessage) -> serde_json::Value {
    let role = match m.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    };
    let mut v = json!({ "role": role, "content": m.content });
    if let Some(id) = &m.tool_call_id {
        v["tool_call_id"] = json!(id);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_roles_to_openai_strings() {
        let msg = ChatMessage {
            role: MessageRole::Tool,
            content: "42".into(),
            tool_calls: vec![],
            tool_call_id: Some("call_1".into()),
        };
        let v = to_openai_message(&msg);
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "call_1");
    }
}
