//! LLM-as-judge correctness scoring (§4.4 "Judging").

use vectorgate_core::models::{ChatMessage, MessageRole};
use vectorgate_core::GatewayError;

use crate::graph::NullSink;
use crate::providers::{LanguageModelProvider, StreamOrigin};

/// Call the judge model once with the structured payload
/// `{description, conversation, answer, reference_answer}`. The reply must
/// be strictly `{"correctness": bool}` or
/// `{"correctness": false, "correctness_reason": "<why>"}` — any other
/// shape is an integrity error rather than a silent "incorrect" verdict.
/// `correctness_reason` is never read back when `correctness` is `true`.
pub async fn judge_one(
    provider: &dyn LanguageModelProvider,
    prompt_text: &str,
    description: &str,
    conversation: &str,
    answer: &str,
    reference_answer: &str,
) -> Result<(bool, Option<String>), GatewayError> {
    let payload = serde_json::json!({
        "description": description,
        "conversation": conversation,
        "answer": answer,
        "reference_answer": reference_answer,
    });
    let message = ChatMessage {
        role: MessageRole::User,
        content: format!("{prompt_text}\n\n{payload}"),
        tool_calls: vec![],
        tool_call_id: None,
    };

    let mut sink = NullSink;
    let reply = provider
        .chat(&[message], &[], StreamOrigin::Internal, &mut sink)
        .await
        .map_err(|e| GatewayError::upstream_provider(e.to_string()))?;

    let parsed: serde_json::Value =
        serde_json::from_str(reply.content.trim()).map_err(|_| GatewayError::integrity("judge returned a non-JSON reply"))?;
    let correctness = parsed
        .get("correctness")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| GatewayError::integrity("judge reply missing boolean 'correctness'"))?;

    if correctness {
        Ok((true, None))
    } else {
        let reason = parsed.get("correctness_reason").and_then(|v| v.as_str()).map(|s| s.to_string());
        Ok((false, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vectorgate_core::models::ToolCall;

    struct FakeProvider {
        reply: String,
    }

    #[async_trait]
    impl LanguageModelProvider for FakeProvider {
        fn model_name(&self) -> &str {
            "fake"
        }
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _tools: &[serde_json::Value],
            _origin: StreamOrigin,
            _sink: &mut dyn crate::providers::TokenSink,
        ) -> anyhow::Result<ChatMessage> {
            Ok(ChatMessage { role: MessageRole::Assistant, content: self.reply.clone(), tool_calls: Vec::<ToolCall>::new(), tool_call_id: None })
        }
    }

    #[tokio::test]
    async fn correct_reply_strips_reason() {
        let provider = FakeProvider { reply: r#"{"correctness": true}"#.to_string() };
        let (correct, reason) = judge_one(&provider, "prompt", "d", "c", "a", "r").await.unwrap();
        assert!(correct);
        assert!(reason.is_none());
    }

    #[tokio::test]
    async fn incorrect_reply_carries_reason() {
        let provider = FakeProvider { reply: r#"{"correctness": false, "correctness_reason": "missed the point"}"#.to_string() };
        let (correct, reason) = judge_one(&provider, "prompt", "d", "c", "a", "r").await.unwrap();
        assert!(!correct);
        assert_eq!(reason.as_deref(), Some("missed the point"));
    }

    #[tokio::test]
    async fn non_boolean_shape_is_integrity_error() {
        let provider = FakeProvider { reply: r#"{"correctness": "maybe"}"#.to_string() };
        let err = judge_one(&provider, "prompt", "d", "c", "a", "r").await.unwrap_err();
        assert_eq!(err.kind(), "integrity");
    }

    #[tokio::test]
    async fn non_json_reply_is_integrity_error() {
        let provider = FakeProvider { reply: "nonsense".to_string() };
        let err = judge_one(&provider, "prompt", "d", "c", "a", "r").await.unwrap_err();
        assert_eq!(err.kind(), "integrity");
    }
}
