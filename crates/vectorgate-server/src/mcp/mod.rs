//! MCP JSON-RPC protocol bridge (§6 "Model-Context-Protocol").
//!
//! Adapts the graph's built-in tools (`vector_search`, `database_query`) and
//! the prompt registry into a Streamable HTTP MCP endpoint, generalizing the
//! teacher's tool/agent bridge (`context-harness::mcp`) from its
//! `ToolRegistry`/`AgentRegistry` pair to this gateway's registries.

pub mod auth;

use std::sync::Arc;

use rmcp::model::*;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::StreamableHttpService;
use rmcp::{ErrorData as McpError, ServerHandler};

use crate::graph::{tools, GraphRunner};
use crate::registries::Registries;

/// Bridges the gateway's registries to the MCP JSON-RPC protocol. Cloned
/// per session (everything behind `Arc`/cheap clones), so all sessions
/// share the same model/auth/prompt state.
#[derive(Clone)]
pub struct McpBridge {
    registries: Registries,
    #[allow(dead_code)]
    graph: Arc<GraphRunner>,
}

impl McpBridge {
    pub fn new(registries: Registries, graph: Arc<GraphRunner>) -> Self {
        Self { registries, graph }
    }

    /// §6: the MCP surface exposes, at minimum, vector-store discovery,
    /// vector search (with a `search_type` argument), rephrase, and storage
    /// listing, alongside the graph's `database_query` tool.
    fn tool_names() -> &'static [&'static str] {
        &[tools::VECTOR_SEARCH, tools::DATABASE_QUERY, tools::DISCOVERY, tools::REPHRASE, tools::LIST_STORES]
    }

    fn to_mcp_tool(definition: &serde_json::Value) -> Option<Tool> {
        let func = definition.get("function")?;
        let name = func.get("name")?.as_str()?.to_string();
        let description = func.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let input_schema = match func.get("parameters").cloned() {
            Some(serde_json::Value::Object(map)) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };
        Some(Tool {
            name: std::borrow::Cow::Owned(name),
            title: None,
            description: Some(std::borrow::Cow::Owned(description)),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(true)),
            execution: None,
            icons: None,
            meta: None,
        })
    }

    fn to_mcp_prompt(template: &vectorgate_core::models::PromptTemplate) -> Prompt {
        Prompt {
            name: template.name.clone(),
            title: Some(template.title.clone()),
            description: template.description.clone(),
            arguments: None,
            icons: None,
            meta: None,
        }
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().enable_prompts().build(),
            server_info: Implementation {
                name: "vectorgate".to_string(),
                title: Some("VectorGate".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "VectorGate — retrieval-augmented gateway over a vector-capable relational database. \
                 Use vector_search (with an optional search_type of similarity, similarity_threshold, \
                 or mmr) to find relevant passages, discovery to see which tables a client's settings \
                 would search, rephrase to turn a conversational question into a standalone query, \
                 list_stores to see every vector store, and database_query to run a read-only SELECT \
                 against the configured database handle. Prompts are available via list_prompts/get_prompt."
                    .to_string(),
            ),
        }
    }

    // ── Tools ────────────────────────────────────────────────────────────

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let defs = tools::tool_definitions(&Self::tool_names().iter().map(|s| s.to_string()).collect::<Vec<_>>());
        let tools: Vec<Tool> = defs.iter().filter_map(Self::to_mcp_tool).collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        if !Self::tool_names().contains(&name) {
            return None;
        }
        let def = tools::tool_definitions(std::slice::from_ref(&name.to_string()));
        def.first().and_then(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        if !Self::tool_names().contains(&request.name.as_ref()) {
            return Err(McpError::new(ErrorCode::METHOD_NOT_FOUND, format!("no tool registered with name: {}", request.name), None));
        }

        let mut arguments = request.arguments.map(serde_json::Value::Object).unwrap_or(serde_json::Value::Object(serde_json::Map::new()));
        let client_id = arguments
            .get("client_id")
            .and_then(|v| v.as_str())
            .unwrap_or("server")
            .to_string();
        if let serde_json::Value::Object(map) = &mut arguments {
            map.remove("client_id");
        }

        let settings = self.registries.settings.get_or_create(&client_id);
        let message = tools::execute(&request.name, &arguments, &settings, &self.registries).await;
        Ok(CallToolResult::success(vec![Content::text(message.content)]))
    }

    // ── Prompts ──────────────────────────────────────────────────────────

    fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListPromptsResult, McpError>> + Send + '_ {
        let prompts: Vec<Prompt> = self.registries.prompts.list_all().iter().map(Self::to_mcp_prompt).collect();
        std::future::ready(Ok(ListPromptsResult::with_all_items(prompts)))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        let resolved = self.registries.prompts.resolve(&request.name).ok_or_else(|| {
            McpError::new(ErrorCode::METHOD_NOT_FOUND, format!("no prompt registered with name: {}", request.name), None)
        })?;

        let role = match resolved.role {
            vectorgate_core::models::PromptRole::Assistant => PromptMessageRole::Assistant,
            _ => PromptMessageRole::User,
        };
        let description = self
            .registries
            .prompts
            .list_all()
            .into_iter()
            .find(|t| t.name == request.name)
            .and_then(|t| t.description);

        Ok(GetPromptResult { description, messages: vec![PromptMessage::new_text(role, &resolved.text)] })
    }
}

/// Mount the MCP Streamable HTTP endpoint at `/mcp`, gated by the constant-
/// time `X-API-Key` check in [`auth`] when `api_key` is non-empty.
pub fn router(bridge: McpBridge, api_key: String) -> axum::Router {
    let service = StreamableHttpService::new(move || Ok(bridge.clone()), LocalSessionManager::default().into(), Default::default());

    axum::Router::new().nest_service("/mcp", service).layer(axum::middleware::from_fn(move |req, next| {
        let api_key = api_key.clone();
        async move { auth::require_api_key(api_key, req, next).await }
    }))
}
