//! `retrieve` and `grade` nodes (spec §4.1 steps 4-5): resolve candidate
//! vector tables, run per-table similarity search concurrently, merge, and
//! optionally ask the language model to grade relevance.

use anyhow::Context as _;
use futures::future::join_all;
use vectorgate_core::embedding::EmbeddingProvider;
use vectorgate_core::models::{ChatGraphState, ChatMessage, ClientSettings, MessageRole, VectorStoreDescriptor, VsMetadata};
use vectorgate_core::search::{apply_threshold, merge_dedup_truncate, ScoredChunk};
use vectorgate_core::GatewayError;

use crate::providers;
use crate::registries::Registries;
use crate::vectorstore::discovery;
use crate::vectorstore::sqlite_backend::SqliteVectorBackend;

use super::NullSink;

/// Build a system/user/assistant [`ChatMessage`] from a resolved prompt
/// (shared by `contextualise` and the MCP/tool-callable `rephrase` tool).
pub(crate) fn to_chat_message(prompt: &vectorgate_core::models::ResolvedPrompt) -> ChatMessage {
    use vectorgate_core::models::PromptRole;
    ChatMessage {
        role: match prompt.role {
            PromptRole::System => MessageRole::System,
            PromptRole::User => MessageRole::User,
            PromptRole::Assistant => MessageRole::Assistant,
        },
        content: prompt.text.clone(),
        tool_calls: vec![],
        tool_call_id: None,
    }
}

/// Ask the `rephrase` prompt to turn `messages` (history ending in the
/// latest human message) into a standalone search query. Falls back to
/// `fallback` if the model is unreachable, the prompt is missing, or the
/// reply is empty. Shared by the graph's `contextualise` node and the
/// MCP/tool-callable `rephrase` tool (§6: "rephrase" tool).
pub(crate) async fn rephrase_with_llm(
    messages: &[ChatMessage],
    fallback: &str,
    settings: &ClientSettings,
    registries: &Registries,
) -> String {
    let provider = match providers::resolve_language_model(registries, &settings.language_model.model) {
        Ok(p) => p,
        Err(_) => return fallback.to_string(),
    };
    let prompt = match registries.prompts.resolve(&settings.prompt_refs.rephrase) {
        Some(p) => p,
        None => return fallback.to_string(),
    };

    let mut full = vec![to_chat_message(&prompt)];
    full.extend(messages.iter().cloned());

    let mut sink = NullSink;
    match provider.chat(&full, &[], providers::StreamOrigin::Internal, &mut sink).await {
        Ok(reply) if !reply.content.trim().is_empty() => reply.content.trim().to_string(),
        _ => fallback.to_string(),
    }
}

/// Resolve the candidate tables for this turn: either the one explicitly
/// configured alias, or (when discovery is enabled) the language model's
/// pick among all discoverable tables whose embedding model is enabled.
pub(crate) async fn resolve_candidate_tables(
    backend: &SqliteVectorBackend,
    settings: &ClientSettings,
    registries: &Registries,
) -> Result<Vec<VectorStoreDescriptor>, GatewayError> {
    let all = discovery::list_vector_stores(backend)
        .await
        .map_err(|e| GatewayError::integrity(e.to_string()))?;

    if !settings.vector_search.discovery {
        let alias = settings
            .vector_search
            .alias
            .as_deref()
            .ok_or_else(|| GatewayError::validation("vector_search.alias is required when discovery is disabled"))?;
        return Ok(all.into_iter().filter(|d| d.alias == alias).collect());
    }

    let enabled_ids: Vec<String> = registries
        .models
        .list()
        .into_iter()
        .filter(|m| m.enabled)
        .map(|m| m.id)
        .collect();
    let candidates = discovery::filter_enabled_models(all, &enabled_ids);
    if candidates.is_empty() {
        return Ok(candidates);
    }

    pick_tables_via_discovery_prompt(candidates, settings, registries).await
}

/// Ask the `discovery` prompt to narrow the candidate list down to up to
/// `top_k` tables by alias/description. A malformed or unparseable reply
/// falls back to using every candidate rather than failing the turn.
async fn pick_tables_via_discovery_prompt(
    candidates: Vec<VectorStoreDescriptor>,
    settings: &ClientSettings,
    registries: &Registries,
) -> Result<Vec<VectorStoreDescriptor>, GatewayError> {
    let provider = providers::resolve_language_model(registries, &settings.language_model.model)?;
    let prompt = registries
        .prompts
        .resolve(&settings.prompt_refs.discovery)
        .ok_or_else(|| GatewayError::identity(format!("unknown prompt: {}", settings.prompt_refs.discovery)))?;

    let catalog: Vec<serde_json::Value> = candidates
        .iter()
        .map(|d| serde_json::json!({"table": d.table_name, "alias": d.alias, "description": d.description}))
        .collect();
    let message = ChatMessage {
        role: MessageRole::User,
        content: format!(
            "{}\n\nTables:\n{}\n\nReturn up to {} table names as a JSON array of strings.",
            prompt.text,
            serde_json::Value::Array(catalog),
            settings.vector_search.top_k,
        ),
        tool_calls: vec![],
        tool_call_id: None,
    };

    let mut sink = NullSink;
    let reply = provider
        .chat(&[message], &[], providers::StreamOrigin::Internal, &mut sink)
        .await
        .map_err(|e| GatewayError::upstream_provider(e.to_string()))?;

    let picked: Option<Vec<String>> = serde_json::from_str(reply.content.trim()).ok();
    match picked {
        Some(names) => {
            let chosen: Vec<VectorStoreDescriptor> =
                candidates.into_iter().filter(|d| names.iter().any(|n| n == &d.table_name)).collect();
            Ok(if chosen.is_empty() { Vec::new() } else { chosen })
        }
        None => Ok(candidates),
    }
}

pub(crate) async fn search_one_table(
    backend: &SqliteVectorBackend,
    descriptor: &VectorStoreDescriptor,
    query_vec: &[f32],
    fetch_k: u32,
) -> anyhow::Result<Vec<ScoredChunk>> {
    let candidates = backend
        .similarity_search(&descriptor.table_name, query_vec, fetch_k, descriptor.distance_metric)
        .await
        .with_context(|| format!("searching table {}", descriptor.table_name))?;
    Ok(candidates
        .into_iter()
        .map(|c| ScoredChunk {
            id: c.id,
            document_id: c.document_id,
            searched_table: descriptor.table_name.clone(),
            similarity: descriptor.distance_metric.similarity(c.raw_distance),
            snippet: c.text,
            embedding: Some(c.embedding),
        })
        .collect())
}

/// The `retrieve` node (§4.1 step 4). No-op when vector search is disabled.
pub async fn retrieve(
    state: &mut ChatGraphState,
    settings: &ClientSettings,
    registries: &Registries,
) -> Result<(), GatewayError> {
    if !settings.vector_search.enabled {
        return Ok(());
    }

    let pool = registries.databases.acquire("DEFAULT", false).await?;
    let backend = SqliteVectorBackend::new(pool);
    let descriptors = resolve_candidate_tables(&backend, settings, registries).await?;
    if descriptors.is_empty() {
        return Ok(());
    }

    let embedder = providers::resolve_embedding_model(registries, &settings.vector_search.model)?;
    let query_vecs = embedder
        .embed(&[state.context_input.clone()])
        .await
        .map_err(|e| GatewayError::upstream_provider(e.to_string()))?;
    let query_vec = query_vecs.into_iter().next().unwrap_or_default();

    // §4.1 step 4: "the database is asked for top_k candidates" — the
    // automatic graph retrieve node always ranks with merge_dedup_truncate
    // (dedupe-by-content, similarity desc, table-name tiebreak). MMR is an
    // MCP tool-level `search_type` option (spec §6), never the automatic
    // graph's default algorithm, so it is not reachable from here.
    let top_k = settings.vector_search.top_k;
    let searches = descriptors
        .iter()
        .map(|d| search_one_table(&backend, d, &query_vec, top_k));
    let results = join_all(searches).await;

    let mut merged = Vec::new();
    for (descriptor, result) in descriptors.iter().zip(results) {
        match result {
            Ok(chunks) => merged.extend(chunks),
            Err(e) => tracing::warn!(table = %descriptor.table_name, error = %e, "table search failed; skipping"),
        }
    }

    let filtered = apply_threshold(merged, settings.vector_search.score_threshold);
    let selected = merge_dedup_truncate(filtered, top_k as usize);

    state.vs_metadata = VsMetadata {
        searched_tables: descriptors.iter().map(|d| d.table_name.clone()).collect(),
        doc_count: selected.len(),
    };
    state.documents = selected
        .iter()
        .map(|c| format!("[{}] {}", c.searched_table, c.snippet))
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(())
}

/// The `grade` node (§4.1 step 5). Non-boolean or unparseable judge replies
/// are treated conservatively as "not relevant" (§4.1.d).
pub async fn grade(
    state: &mut ChatGraphState,
    settings: &ClientSettings,
    registries: &Registries,
) -> Result<(), GatewayError> {
    if !settings.vector_search.grade || state.documents.is_empty() {
        return Ok(());
    }

    let provider = providers::resolve_language_model(registries, &settings.language_model.model)?;
    let prompt = registries
        .prompts
        .resolve(&settings.prompt_refs.grading)
        .ok_or_else(|| GatewayError::identity(format!("unknown prompt: {}", settings.prompt_refs.grading)))?;

    let message = ChatMessage {
        role: MessageRole::User,
        content: format!(
            "{}\n\nQuestion: {}\n\nDocuments:\n{}",
            prompt.text, state.context_input, state.documents
        ),
        tool_calls: vec![],
        tool_call_id: None,
    };

    let mut sink = NullSink;
    let reply = provider
        .chat(&[message], &[], providers::StreamOrigin::Internal, &mut sink)
        .await
        .map_err(|e| GatewayError::upstream_provider(e.to_string()))?;

    if !is_relevant(&reply.content) {
        state.documents.clear();
    }
    Ok(())
}

/// Interpret a grading reply as a boolean. Accepts a bare "yes"/"no" (the
/// built-in grading prompt's contract) or a `{"relevant": bool}` JSON
/// object; anything else is logged and treated as "not relevant".
fn is_relevant(reply: &str) -> bool {
    let normalized = reply.trim().to_ascii_lowercase();
    if normalized.contains("yes") {
        return true;
    }
    if normalized.contains("no") {
        return false;
    }
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(reply.trim()) {
        if let Some(b) = v.get("relevant").and_then(|x| x.as_bool()) {
            return b;
        }
        if let Some(b) = v.as_bool() {
            return b;
        }
    }
    tracing::warn!(reply = %reply, "grader returned a non-boolean reply; treating as not relevant");
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_plain_yes_no() {
        assert!(is_relevant("Yes"));
        assert!(!is_relevant("no"));
    }

    #[test]
    fn recognizes_json_boolean() {
        assert!(is_relevant(r#"{"relevant": true}"#));
        assert!(!is_relevant("false"));
    }

    #[test]
    fn unparseable_reply_is_conservative() {
        assert!(!is_relevant("I cannot tell"));
    }
}
