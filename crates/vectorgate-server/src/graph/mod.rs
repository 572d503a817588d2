//! Chat Orchestration Graph (§4.1): the eight-state sequence
//! `initialise → contextualise → decide_tools → retrieve → grade →
//! complete → tool_branch → finalise`, driven by a single [`GraphRunner`]
//! `run_turn` call rather than a generic DAG library (DESIGN NOTES §9).
//!
//! Per-`client_id` serialization of turns (§5) is the session map's
//! `tokio::sync::Mutex<ChatGraphState>`: the whole turn runs with that
//! client's lock held, so two concurrent requests for the same client
//! execute strictly one after the other while different clients proceed
//! concurrently.

pub mod retrieve;
pub mod tools;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use vectorgate_core::models::{
    ChatGraphState, ChatMessage, ClientSettings, CompletionChoice, CompletionEnvelope, MessageRole, ToolCall,
};
use vectorgate_core::GatewayError;

use crate::providers::{self, LanguageModelProvider, StreamOrigin, TokenSink};
use crate::registries::Registries;

/// Sink that drops every pushed token — used for the graph's internal
/// model calls (rephrase, discovery, grading) whose output is consumed as a
/// whole reply, never streamed (§4.1.c: "internal ... model calls MUST NOT
/// surface to the user stream").
pub struct NullSink;

#[async_trait]
impl TokenSink for NullSink {
    async fn push(&mut self, _origin: StreamOrigin, _delta: &str) {}
}

/// Maximum `complete → tool_branch → complete` re-entries in one turn. Not
/// specified by the spec; bounds a misbehaving model that never stops
/// requesting tools.
const MAX_TOOL_ROUNDS: u32 = 6;

/// Owns every client's in-progress chat thread (§2 "ChatGraphState": "one
/// active chat thread, keyed by client_id") and runs turns against it.
pub struct GraphRunner {
    registries: Registries,
    sessions: Mutex<HashMap<String, Arc<Mutex<ChatGraphState>>>>,
}

impl GraphRunner {
    pub fn new(registries: Registries) -> Self {
        Self { registries, sessions: Mutex::new(HashMap::new()) }
    }

    async fn session_for(&self, client_id: &str) -> Arc<Mutex<ChatGraphState>> {
        let mut guard = self.sessions.lock().await;
        guard
            .entry(client_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ChatGraphState::new(client_id, Vec::new()))))
            .clone()
    }

    /// Run one full turn: append `incoming` to the client's thread, drive
    /// the graph to completion, and return the final envelope. `sink`
    /// receives every token delta tagged with its [`StreamOrigin`]; the
    /// HTTP layer's unary handler passes a [`NullSink`] and reads the
    /// returned envelope instead, the streaming handler passes a sink that
    /// writes user-facing deltas to the response body and appends
    /// `"[stream_finished]"` once this call returns.
    pub async fn run_turn(
        &self,
        client_id: &str,
        incoming: Vec<ChatMessage>,
        sink: &mut dyn TokenSink,
    ) -> Result<CompletionEnvelope, GatewayError> {
        let settings = self.registries.settings.get_or_create(client_id);
        let session = self.session_for(client_id).await;
        let mut state = session.lock().await;
        run_turn_inner(&mut state, &settings, &self.registries, client_id, incoming, sink).await
    }

    /// Run one throwaway turn outside the per-client session map, against
    /// an explicit `settings` snapshot rather than the client's registered
    /// settings. Used by the testbed evaluation runner (§4.4 "Answer
    /// collection"), which asks a question with chat history and grading
    /// both off so every question is scored independently and nothing it
    /// does touches a real client's conversation state.
    pub async fn run_turn_ephemeral(
        &self,
        settings: &ClientSettings,
        question: &str,
    ) -> Result<CompletionEnvelope, GatewayError> {
        let mut settings = settings.clone();
        settings.language_model.chat_history = false;
        settings.vector_search.grade = false;

        let mut state = ChatGraphState::new(&settings.client_id, Vec::new());
        let incoming = vec![ChatMessage { role: MessageRole::User, content: question.to_string(), tool_calls: vec![], tool_call_id: None }];
        let mut sink = NullSink;
        run_turn_inner(&mut state, &settings, &self.registries, &settings.client_id, incoming, &mut sink).await
    }

    /// Current thread's messages for `client_id` (§6 `GET /v1/chat/history`).
    /// An unknown client has no thread yet, so this returns an empty list
    /// rather than creating one.
    pub async fn history(&self, client_id: &str) -> Vec<ChatMessage> {
        let guard = self.sessions.lock().await;
        match guard.get(client_id) {
            Some(session) => session.lock().await.messages.clone(),
            None => Vec::new(),
        }
    }

    /// Drop `client_id`'s thread entirely (§6 `DELETE /v1/chat/history`).
    pub async fn clear_history(&self, client_id: &str) {
        let mut guard = self.sessions.lock().await;
        guard.remove(client_id);
    }
}

async fn run_turn_inner(
    state: &mut ChatGraphState,
    settings: &ClientSettings,
    registries: &Registries,
    client_id: &str,
    incoming: Vec<ChatMessage>,
    sink: &mut dyn TokenSink,
) -> Result<CompletionEnvelope, GatewayError> {
    initialise(state, settings, incoming);
    contextualise(state, settings, registries).await?;

    let tool_defs = tools::tool_definitions(&settings.tools_enabled);

    retrieve::retrieve(state, settings, registries).await?;
    retrieve::grade(state, settings, registries).await?;

    if settings.vector_search.enabled && settings.tools_enabled.iter().any(|t| t == tools::VECTOR_SEARCH) {
        append_internal_retrieval_discipline(state);
    }

    let mut rounds = 0u32;
    let final_message = loop {
        let reply = complete_once(state, settings, registries, &tool_defs, sink).await;
        state.messages.push(reply.clone());
        state.cleaned_messages.push(reply.clone());

        if reply.tool_calls.is_empty() {
            break reply;
        }
        if rounds >= MAX_TOOL_ROUNDS {
            tracing::warn!(client_id, rounds, "tool round limit reached; finishing with last reply");
            break reply;
        }
        rounds += 1;

        for call in &reply.tool_calls {
            let mut tool_msg = tools::execute(&call.name, &call.arguments, settings, registries).await;
            tool_msg.tool_call_id = Some(call.id.clone());
            state.messages.push(tool_msg.clone());
            state.cleaned_messages.push(tool_msg);
        }
    };

    let envelope = finalise(&final_message, settings);
    state.final_response = Some(envelope.clone());
    sink.push(StreamOrigin::UserFacing, "[stream_finished]").await;
    Ok(envelope)
}

/// `initialise` (§4.1 step 1).
fn initialise(state: &mut ChatGraphState, settings: &ClientSettings, incoming: Vec<ChatMessage>) {
    state.messages.extend(incoming);
    state.cleaned_messages = if settings.language_model.chat_history {
        state.messages.clone()
    } else {
        last_human_message_only(&state.messages)
    };
    if !settings.language_model.chat_history {
        state.documents.clear();
        state.context_input.clear();
    }
    state.final_response = None;
}

fn last_human_message_only(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .cloned()
        .into_iter()
        .collect()
}

/// `contextualise` (§4.1 step 2): rephrase into a standalone search query
/// when history and rephrasing are both enabled and there is something to
/// rephrase from; otherwise use the latest human message verbatim. Never
/// alters `state.cleaned_messages` / the user-visible transcript.
async fn contextualise(state: &mut ChatGraphState, settings: &ClientSettings, registries: &Registries) -> Result<(), GatewayError> {
    let last_human = last_human_message_only(&state.cleaned_messages).into_iter().next().map(|m| m.content).unwrap_or_default();

    let should_rephrase = settings.vector_search.enabled
        && settings.vector_search.rephrase
        && settings.language_model.chat_history
        && state.cleaned_messages.len() >= 2;

    if !should_rephrase {
        state.context_input = last_human;
        return Ok(());
    }

    state.context_input = retrieve::rephrase_with_llm(&state.cleaned_messages, &last_human, settings, registries).await;
    Ok(())
}

/// `complete` (§4.1 step 6). Never returns an error: model-unreachable,
/// upstream connection failures, and unsupported function-calling all
/// degrade to a canned assistant message instead (§4.1.d) so the HTTP
/// status stays 200 for a streamed response.
async fn complete_once(
    state: &ChatGraphState,
    settings: &ClientSettings,
    registries: &Registries,
    tool_defs: &[serde_json::Value],
    sink: &mut dyn TokenSink,
) -> ChatMessage {
    let provider = match providers::resolve_language_model(registries, &settings.language_model.model) {
        Ok(p) => p,
        Err(_) => return unreachable_model_message(),
    };

    let system_prompt = match assemble_system_prompt(state, settings, registries) {
        Ok(p) => p,
        Err(_) => return unreachable_model_message(),
    };
    let mut messages = vec![ChatMessage {
        role: MessageRole::System,
        content: system_prompt,
        tool_calls: vec![],
        tool_call_id: None,
    }];
    messages.extend(state.cleaned_messages.clone());

    match provider.chat(&messages, tool_defs, StreamOrigin::UserFacing, sink).await {
        Ok(reply) => {
            if !tool_defs.is_empty() && reply.tool_calls.is_empty() && looks_like_unstructured_tool_call(&reply.content) {
                function_calling_not_supported_message()
            } else {
                reply
            }
        }
        Err(e) => apology_message(&e),
    }
}

fn assemble_system_prompt(state: &ChatGraphState, settings: &ClientSettings, registries: &Registries) -> Result<String, GatewayError> {
    let resolved = registries
        .prompts
        .resolve(&settings.prompt_refs.sys)
        .ok_or_else(|| GatewayError::identity(format!("unknown prompt: {}", settings.prompt_refs.sys)))?;
    let mut text = resolved.text;
    if !state.documents.is_empty() {
        text.push_str("\n\nRelevant Context:\n");
        text.push_str(&state.documents);
    }
    Ok(text)
}

/// Heuristic for §4.1.d's "Unreliable tool-calling detection": a model
/// that doesn't actually support function calling sometimes echoes a
/// tool-call-shaped JSON object back as plain content instead of using the
/// structured `tool_calls` field.
fn looks_like_unstructured_tool_call(content: &str) -> bool {
    let trimmed = content.trim();
    (trimmed.starts_with('{') && trimmed.ends_with('}')) && (trimmed.contains("\"name\"") || trimmed.contains("\"tool_calls\""))
}

fn unreachable_model_message() -> ChatMessage {
    ChatMessage {
        role: MessageRole::Assistant,
        content: "I'm unable to initialise the Language Model. Please refresh the application.".to_string(),
        tool_calls: vec![],
        tool_call_id: None,
    }
}

fn function_calling_not_supported_message() -> ChatMessage {
    ChatMessage {
        role: MessageRole::Assistant,
        content: "This model does not support function calling, so the requested tools were ignored for this turn.".to_string(),
        tool_calls: vec![],
        tool_call_id: None,
    }
}

fn apology_message(error: &anyhow::Error) -> ChatMessage {
    ChatMessage {
        role: MessageRole::Assistant,
        content: format!(
            "Sorry, I ran into a problem reaching the language model ({error}). If this keeps happening, please open an issue: https://github.com/vectorgate/vectorgate/issues",
        ),
        tool_calls: vec![],
        tool_call_id: None,
    }
}

/// `tool_branch`'s internal-discipline pairing (§4.1.b): kept in the
/// conversation, but its content is the minimal status line rather than the
/// actual document text (which is injected through the system prompt
/// instead). Only needed when `vector_search` is also registered as a
/// model-callable tool, so a later explicit call stays consistent with an
/// already-satisfied implicit one.
fn append_internal_retrieval_discipline(state: &mut ChatGraphState) {
    let result = if state.documents.is_empty() {
        format!("No relevant documents found for: '{}'", state.context_input)
    } else {
        format!("Relevant documents found for: '{}'", state.context_input)
    };
    let status = serde_json::json!({"status": "success", "result": result}).to_string();
    let call_id = format!("internal-{}", uuid::Uuid::new_v4());
    let assistant_msg = ChatMessage {
        role: MessageRole::Assistant,
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: call_id.clone(),
            name: tools::VECTOR_SEARCH.to_string(),
            arguments: serde_json::json!({"query": state.context_input}),
        }],
        tool_call_id: None,
    };
    let tool_msg = ChatMessage {
        role: MessageRole::Tool,
        content: status,
        tool_calls: vec![],
        tool_call_id: Some(call_id),
    };
    state.messages.push(assistant_msg.clone());
    state.messages.push(tool_msg.clone());
    state.cleaned_messages.push(assistant_msg);
    state.cleaned_messages.push(tool_msg);
}

/// `finalise` (§4.1 step 8).
fn finalise(message: &ChatMessage, settings: &ClientSettings) -> CompletionEnvelope {
    CompletionEnvelope {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        choices: vec![CompletionChoice { message: message.clone(), finish_reason: "stop".to_string(), index: 0 }],
        created: chrono::Utc::now().timestamp(),
        model: settings.language_model.model.clone(),
        object: "chat.completion".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vectorgate_core::models::MessageRole;

    fn msg(role: MessageRole, content: &str) -> ChatMessage {
        ChatMessage { role, content: content.to_string(), tool_calls: vec![], tool_call_id: None }
    }

    #[test]
    fn history_disabled_keeps_only_last_human_message() {
        let mut state = ChatGraphState::new("c1", vec![msg(MessageRole::User, "hi"), msg(MessageRole::Assistant, "hello")]);
        let settings_json = serde_json::json!({
            "client_id": "c1",
            "language_model": {"model": "gpt-4o-mini", "temperature": 0.1, "max_completion_tokens": 100, "chat_history": false},
            "vector_search": {"enabled": false, "discovery": false, "rephrase": false, "grade": false, "top_k": 4, "score_threshold": 0.0, "mmr_fetch_k": 20, "mmr_lambda": 0.5, "alias": null, "model": "embed", "chunk_size": 512, "chunk_overlap": 50},
            "selectai": {"enabled": false, "profile": null, "params": {}},
            "auth_profile_name": null,
            "prompt_refs": {"sys": "s", "ctx": "c", "grading": "g", "rephrase": "r", "discovery": "d"},
            "tools_enabled": [],
        });
        let settings: ClientSettings = serde_json::from_value(settings_json).unwrap();
        state.documents = "leftover".to_string();
        state.context_input = "leftover query".to_string();

        initialise(&mut state, &settings, vec![msg(MessageRole::User, "new question")]);

        assert_eq!(state.cleaned_messages.len(), 1);
        assert_eq!(state.cleaned_messages[0].content, "new question");
        assert!(state.documents.is_empty());
        assert!(state.context_input.is_empty());
    }

    #[test]
    fn unstructured_tool_call_detection() {
        assert!(looks_like_unstructured_tool_call(r#"{"name": "vector_search", "arguments": {}}"#));
        assert!(!looks_like_unstructured_tool_call("just a normal reply"));
    }

    #[test]
    fn internal_retrieval_discipline_wraps_status_as_json() {
        let mut state = ChatGraphState::new("c1", Vec::new());
        state.context_input = "oracle rac".to_string();

        append_internal_retrieval_discipline(&mut state);
        let tool_msg = state.messages.last().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&tool_msg.content).unwrap();
        assert_eq!(parsed["status"], "success");
        assert_eq!(parsed["result"], "No relevant documents found for: 'oracle rac'");

        state.messages.clear();
        state.documents = "some context".to_string();
        append_internal_retrieval_discipline(&mut state);
        let tool_msg = state.messages.last().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&tool_msg.content).unwrap();
        assert_eq!(parsed["result"], "Relevant documents found for: 'oracle rac'");
    }
}
