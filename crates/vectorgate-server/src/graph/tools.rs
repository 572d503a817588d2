//! Tool definitions and execution, shared by the `decide_tools`/`tool_branch`
//! graph nodes (spec §4.1 steps 3 and 7) and the MCP tool catalog
//! (`mcp::mod`). `vector_search` and `database_query` are the graph's two
//! built-in, model-callable tools; any other name in `tools_enabled` is
//! treated as an externally-defined tool this graph has no handler for.
//! `discovery`, `rephrase`, and `list_stores` are MCP-only — §6 requires the
//! MCP surface to expose vector-store discovery, vector search with a
//! configurable `search_type`, rephrase, and storage listing as distinct
//! tools, independent of what a given client's `tools_enabled` registers for
//! model tool-calling.

use vectorgate_core::models::{ChatMessage, ClientSettings, MessageRole, VectorStoreDescriptor};
use vectorgate_core::search::{apply_threshold, mmr_select};
use vectorgate_core::GatewayError;

use crate::graph::retrieve;
use crate::providers;
use crate::registries::Registries;
use crate::vectorstore::discovery;
use crate::vectorstore::sqlite_backend::SqliteVectorBackend;

pub const VECTOR_SEARCH: &str = "vector_search";
pub const DATABASE_QUERY: &str = "database_query";
pub const DISCOVERY: &str = "discovery";
pub const REPHRASE: &str = "rephrase";
pub const LIST_STORES: &str = "list_stores";

/// OpenAI-style tool definitions for every name in `tools_enabled` that this
/// graph knows how to describe. Unknown names are passed through with a
/// generic free-form-argument schema so a model can still attempt to call
/// them; [`execute`] reports back that no handler exists.
pub fn tool_definitions(tools_enabled: &[String]) -> Vec<serde_json::Value> {
    tools_enabled.iter().map(|name| definition_for(name)).collect()
}

fn definition_for(name: &str) -> serde_json::Value {
    match name {
        VECTOR_SEARCH => serde_json::json!({
            "type": "function",
            "function": {
                "name": VECTOR_SEARCH,
                "description": "Search the configured vector store(s) for passages relevant to a query.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Search query"},
                        "search_type": {
                            "type": "string",
                            "enum": ["similarity", "similarity_threshold", "mmr"],
                            "description": "similarity (plain top-k), similarity_threshold (filter by the client's score_threshold), or mmr (maximal-marginal-relevance rerank). Defaults to similarity.",
                        },
                    },
                    "required": ["query"],
                },
            },
        }),
        DATABASE_QUERY => serde_json::json!({
            "type": "function",
            "function": {
                "name": DATABASE_QUERY,
                "description": "Run a read-only SQL SELECT against the configured database handle.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "sql": {"type": "string", "description": "A single SELECT statement"},
                    },
                    "required": ["sql"],
                },
            },
        }),
        DISCOVERY => serde_json::json!({
            "type": "function",
            "function": {
                "name": DISCOVERY,
                "description": "List the vector-store tables a client's settings would search, after discovery-by-LLM narrowing when discovery is enabled.",
                "parameters": {"type": "object", "properties": {}},
            },
        }),
        REPHRASE => serde_json::json!({
            "type": "function",
            "function": {
                "name": REPHRASE,
                "description": "Rephrase a conversational question plus optional prior turns into a standalone search query.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "The latest user question"},
                        "history": {
                            "type": "array",
                            "description": "Prior turns, oldest first, as {role, content}",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "role": {"type": "string"},
                                    "content": {"type": "string"},
                                },
                            },
                        },
                    },
                    "required": ["query"],
                },
            },
        }),
        LIST_STORES => serde_json::json!({
            "type": "function",
            "function": {
                "name": LIST_STORES,
                "description": "List every discoverable vector store (table, alias, description, embedding model, chunk params, distance metric, index type).",
                "parameters": {"type": "object", "properties": {}},
            },
        }),
        other => serde_json::json!({
            "type": "function",
            "function": {
                "name": other,
                "description": format!("Externally defined tool '{other}'."),
                "parameters": {"type": "object", "properties": {}},
            },
        }),
    }
}

/// Execute a model-requested tool call. Results here are surfaced verbatim
/// (§4.1.b: "External tools' results are preserved verbatim" — this applies
/// to every tool_branch execution, since by definition the model, not the
/// graph, requested it).
pub async fn execute(name: &str, arguments: &serde_json::Value, settings: &ClientSettings, registries: &Registries) -> ChatMessage {
    let arguments = normalize_arguments(arguments);
    let content = match name {
        VECTOR_SEARCH => run_vector_search(&arguments, settings, registries).await,
        DATABASE_QUERY => run_database_query(&arguments, registries).await,
        DISCOVERY => run_discovery(settings, registries).await,
        REPHRASE => run_rephrase(&arguments, settings, registries).await,
        LIST_STORES => run_list_stores(registries).await,
        other => Err(GatewayError::capability(format!("tool '{other}' has no registered handler"))),
    };

    ChatMessage {
        role: MessageRole::Tool,
        content: content.unwrap_or_else(|e| format!("{{\"error\": {:?}}}", e.detail())),
        tool_calls: vec![],
        tool_call_id: None,
    }
}

/// Streaming providers (e.g. [`crate::providers::openai`]) accumulate a
/// tool call's arguments as raw concatenated JSON text in a string value
/// rather than a parsed object; normalize both shapes to a real object here
/// so every handler can use `.get(...)` uniformly.
fn normalize_arguments(arguments: &serde_json::Value) -> serde_json::Value {
    match arguments {
        serde_json::Value::String(raw) => serde_json::from_str(raw).unwrap_or(serde_json::Value::Null),
        other => other.clone(),
    }
}

/// `search_type` argument accepted by the [`VECTOR_SEARCH`] tool (§6):
/// `similarity` (plain top-k, no filtering), `similarity_threshold` (filter
/// by the client's configured `score_threshold`), or `mmr` (maximal-
/// marginal-relevance rerank using the client's `mmr_fetch_k`/`mmr_lambda`).
fn parse_search_type(arguments: &serde_json::Value) -> &'static str {
    match arguments.get("search_type").and_then(|v| v.as_str()) {
        Some("similarity_threshold") => "similarity_threshold",
        Some("mmr") => "mmr",
        _ => "similarity",
    }
}

async fn run_vector_search(
    arguments: &serde_json::Value,
    settings: &ClientSettings,
    registries: &Registries,
) -> Result<String, GatewayError> {
    let query = arguments
        .get("query")
        .and_then(|v| v.as_str())
        .ok_or_else(|| GatewayError::validation("vector_search tool call missing 'query'"))?;
    let search_type = parse_search_type(arguments);

    let pool = registries.databases.acquire("DEFAULT", false).await?;
    let backend = SqliteVectorBackend::new(pool);
    let all = discovery::list_vector_stores(&backend).await.map_err(|e| GatewayError::integrity(e.to_string()))?;
    let descriptors: Vec<VectorStoreDescriptor> = if let Some(alias) = &settings.vector_search.alias {
        all.into_iter().filter(|d| &d.alias == alias).collect()
    } else {
        all
    };
    if descriptors.is_empty() {
        return Ok("No vector stores are configured.".to_string());
    }

    let embedder = providers::resolve_embedding_model(registries, &settings.vector_search.model)?;
    let query_vecs = embedder.embed(&[query.to_string()]).await.map_err(|e| GatewayError::upstream_provider(e.to_string()))?;
    let query_vec = query_vecs.into_iter().next().unwrap_or_default();

    let fetch_k = if search_type == "mmr" { settings.vector_search.mmr_fetch_k.max(settings.vector_search.top_k) } else { settings.vector_search.top_k };

    let mut candidates = Vec::new();
    for descriptor in &descriptors {
        match retrieve::search_one_table(&backend, descriptor, &query_vec, fetch_k).await {
            Ok(chunks) => candidates.extend(chunks),
            Err(e) => tracing::warn!(table = %descriptor.table_name, error = %e, "table search failed; skipping"),
        }
    }

    let selected = match search_type {
        "similarity_threshold" => apply_threshold(candidates, settings.vector_search.score_threshold),
        "mmr" => mmr_select(&query_vec, &candidates, settings.vector_search.top_k as usize, settings.vector_search.mmr_lambda),
        _ => {
            candidates.truncate(settings.vector_search.top_k as usize);
            candidates
        }
    };

    if selected.is_empty() {
        Ok(format!("No relevant documents found for: '{query}'"))
    } else {
        Ok(selected.iter().map(|c| format!("[{}] {}", c.searched_table, c.snippet)).collect::<Vec<_>>().join("\n\n"))
    }
}

/// The `discovery` MCP tool (§6): the set of tables a chat turn for
/// `settings` would search, after discovery-by-LLM narrowing when
/// `vector_search.discovery` is enabled.
async fn run_discovery(settings: &ClientSettings, registries: &Registries) -> Result<String, GatewayError> {
    let pool = registries.databases.acquire("DEFAULT", false).await?;
    let backend = SqliteVectorBackend::new(pool);
    let descriptors = retrieve::resolve_candidate_tables(&backend, settings, registries).await?;
    serde_json::to_string(&descriptors).map_err(|e| GatewayError::integrity(e.to_string()))
}

/// The `rephrase` MCP tool (§6): turn `query` plus optional `history` into a
/// standalone search query using the same rephrase prompt and fallback
/// behaviour as the graph's `contextualise` node.
async fn run_rephrase(arguments: &serde_json::Value, settings: &ClientSettings, registries: &Registries) -> Result<String, GatewayError> {
    let query = arguments
        .get("query")
        .and_then(|v| v.as_str())
        .ok_or_else(|| GatewayError::validation("rephrase tool call missing 'query'"))?;

    let mut messages: Vec<ChatMessage> = arguments
        .get("history")
        .and_then(|v| v.as_array())
        .map(|entries| entries.iter().filter_map(parse_history_message).collect())
        .unwrap_or_default();
    messages.push(ChatMessage { role: MessageRole::User, content: query.to_string(), tool_calls: vec![], tool_call_id: None });

    let rephrased = retrieve::rephrase_with_llm(&messages, query, settings, registries).await;
    Ok(serde_json::json!({"context_input": rephrased}).to_string())
}

fn parse_history_message(entry: &serde_json::Value) -> Option<ChatMessage> {
    let role = match entry.get("role")?.as_str()? {
        "assistant" => MessageRole::Assistant,
        "system" => MessageRole::System,
        "tool" => MessageRole::Tool,
        _ => MessageRole::User,
    };
    let content = entry.get("content")?.as_str()?.to_string();
    Some(ChatMessage { role, content, tool_calls: vec![], tool_call_id: None })
}

/// The `list_stores` MCP tool (§6 "storage listing"): every discoverable
/// vector store, unfiltered by any client's settings.
async fn run_list_stores(registries: &Registries) -> Result<String, GatewayError> {
    let pool = registries.databases.acquire("DEFAULT", false).await?;
    let backend = SqliteVectorBackend::new(pool);
    let all = discovery::list_vector_stores(&backend).await.map_err(|e| GatewayError::integrity(e.to_string()))?;
    serde_json::to_string(&all).map_err(|e| GatewayError::integrity(e.to_string()))
}

/// Read-only guard: only a single `SELECT` statement is accepted. Anything
/// else (DDL/DML, multiple statements) is rejected before it reaches the
/// pool.
fn is_select_only(sql: &str) -> bool {
    let trimmed = sql.trim().trim_end_matches(';');
    let lowered = trimmed.to_ascii_lowercase();
    lowered.starts_with("select") && !trimmed.contains(';')
}

async fn run_database_query(arguments: &serde_json::Value, registries: &Registries) -> Result<String, GatewayError> {
    let sql = arguments
        .get("sql")
        .and_then(|v| v.as_str())
        .ok_or_else(|| GatewayError::validation("database_query tool call missing 'sql'"))?;
    if !is_select_only(sql) {
        return Err(GatewayError::validation("database_query only accepts a single SELECT statement"));
    }

    let pool = registries.databases.acquire("DEFAULT", false).await?;
    let rows = sqlx::query(sql)
        .fetch_all(&pool)
        .await
        .map_err(|e| GatewayError::integrity(format!("query failed: {e}")))?;

    let as_json: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            use sqlx::{Column, Row, TypeInfo};
            let mut obj = serde_json::Map::new();
            for col in row.columns() {
                let name = col.name();
                let value = match col.type_info().name() {
                    "TEXT" => row.try_get::<Option<String>, _>(name).ok().flatten().map(serde_json::Value::String),
                    "INTEGER" | "BOOLEAN" => row
                        .try_get::<Option<i64>, _>(name)
                        .ok()
                        .flatten()
                        .map(|n| serde_json::Value::Number(n.into())),
                    "REAL" => row
                        .try_get::<Option<f64>, _>(name)
                        .ok()
                        .flatten()
                        .and_then(serde_json::Number::from_f64)
                        .map(serde_json::Value::Number),
                    _ => row.try_get::<Option<String>, _>(name).ok().flatten().map(serde_json::Value::String),
                };
                obj.insert(name.to_string(), value.unwrap_or(serde_json::Value::Null));
            }
            serde_json::Value::Object(obj)
        })
        .collect();

    serde_json::to_string(&as_json).map_err(|e| GatewayError::integrity(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_only_accepts_plain_select() {
        assert!(is_select_only("SELECT * FROM docs"));
        assert!(is_select_only("  select id from docs;  "));
    }

    #[test]
    fn select_only_rejects_mutations_and_stacked_statements() {
        assert!(!is_select_only("DROP TABLE docs"));
        assert!(!is_select_only("SELECT 1; DROP TABLE docs"));
        assert!(!is_select_only("INSERT INTO docs VALUES (1)"));
    }

    #[test]
    fn tool_definitions_cover_requested_names() {
        let defs = tool_definitions(&[VECTOR_SEARCH.to_string(), "custom_tool".to_string()]);
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0]["function"]["name"], VECTOR_SEARCH);
        assert_eq!(defs[1]["function"]["name"], "custom_tool");
    }

    #[test]
    fn mcp_tool_definitions_include_search_type_and_storage_tools() {
        let defs = tool_definitions(&[VECTOR_SEARCH.to_string(), DISCOVERY.to_string(), REPHRASE.to_string(), LIST_STORES.to_string()]);
        let vector_search = &defs[0]["function"]["parameters"]["properties"];
        assert!(vector_search["search_type"]["enum"].as_array().unwrap().iter().any(|v| v == "mmr"));
        assert_eq!(defs[1]["function"]["name"], DISCOVERY);
        assert_eq!(defs[2]["function"]["name"], REPHRASE);
        assert_eq!(defs[3]["function"]["name"], LIST_STORES);
    }

    #[test]
    fn search_type_parsing_defaults_to_similarity() {
        assert_eq!(parse_search_type(&serde_json::json!({})), "similarity");
        assert_eq!(parse_search_type(&serde_json::json!({"search_type": "mmr"})), "mmr");
        assert_eq!(parse_search_type(&serde_json::json!({"search_type": "similarity_threshold"})), "similarity_threshold");
        assert_eq!(parse_search_type(&serde_json::json!({"search_type": "bogus"})), "similarity");
    }

    #[test]
    fn history_message_parsing_maps_roles() {
        let msg = parse_history_message(&serde_json::json!({"role": "assistant", "content": "hi"})).unwrap();
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.content, "hi");
    }
}
