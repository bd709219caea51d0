//! MCP Server Core
//!
//! Handles the main MCP server logic, routing requests to appropriate
//! tool and resource handlers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult,
    ListResourcesResult, ListToolsResult, ReadResourceRequest, ReadResourceResult,
    ResourceDescription, ServerCapabilities, ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::resources;
use crate::tools;
use grove_core::{Role, SessionCache, Store};

/// MCP Server implementation.
///
/// Holds the shared store and a session cache scoped to this one
/// connection — bulk reads through this server instance see the same
/// suppression history until `reset_memory_cache` clears it.
pub struct McpServer {
    store: Arc<Store>,
    caller_role: Role,
    session: SessionCache,
    initialized: bool,
}

impl McpServer {
    pub fn new(store: Arc<Store>, caller_role: Role) -> Self {
        Self {
            store,
            caller_role,
            session: SessionCache::new(),
            initialized: false,
        }
    }

    /// Handle an incoming JSON-RPC request
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        // Check initialization for non-initialize requests
        if !self.initialized && request.method != "initialize" && request.method != "notifications/initialized" {
            warn!("Rejecting request '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "notifications/initialized" => {
                // Notification, no response needed
                return None;
            }
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(request.params).await,
            "resources/list" => self.handle_resources_list().await,
            "resources/read" => self.handle_resources_read(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    /// Handle initialize request
    async fn handle_initialize(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Version negotiation: use client's version if older than server's
        // Claude Desktop rejects servers with newer protocol versions
        let negotiated_version = if request.protocol_version.as_str() < MCP_VERSION {
            info!("Client requested older protocol version {}, using it", request.protocol_version);
            request.protocol_version.clone()
        } else {
            MCP_VERSION.to_string()
        };

        self.initialized = true;
        info!("MCP session initialized with protocol version {}", negotiated_version);

        let result = InitializeResult {
            protocol_version: negotiated_version,
            server_info: ServerInfo {
                name: "grove".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
                resources: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
                prompts: None,
            },
            instructions: Some(
                "Grove is your long-term memory store. Each entry is a root identified by a \
                 single-letter prefix and sequence number (e.g. L0003) holding a tree of indented \
                 sub-nodes. Write durable facts and decisions with write_memory, retrieve a \
                 token-bounded snapshot with read_memory (omit `id` for a bulk scan across \
                 prefixes), and correct superseded entries by setting obsolete=true with a \
                 `[✓ID]` marker pointing at the replacement — update_memory rejects the \
                 transition without one.".to_string()
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    /// Handle tools/list request
    async fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let tools = vec![
            ToolDescription {
                name: "write_memory".to_string(),
                description: Some(
                    "Create a new root entry under a configured prefix. The first line of \
                     content becomes the title; indented lines become depth-2+ sub-nodes."
                        .to_string(),
                ),
                input_schema: tools::write::schema(),
            },
            ToolDescription {
                name: "read_memory".to_string(),
                description: Some(
                    "Read a single entry by `id`, or omit it for a ranked bulk scan across \
                     prefixes (newest, most-accessed, pinned/favorite, and an obsolete tail)."
                        .to_string(),
                ),
                input_schema: tools::read::schema(),
            },
            ToolDescription {
                name: "update_memory".to_string(),
                description: Some(
                    "Edit a root or node in place: content, links, or flags (favorite, pinned, \
                     active, secret, irrelevant, obsolete)."
                        .to_string(),
                ),
                input_schema: tools::update::schema(),
            },
            ToolDescription {
                name: "append_memory".to_string(),
                description: Some(
                    "Add new indented children under an existing root or node, continuing its \
                     sibling sequence."
                        .to_string(),
                ),
                input_schema: tools::append::schema(),
            },
            ToolDescription {
                name: "search_memory".to_string(),
                description: Some("Full-text search across root titles and bodies.".to_string()),
                input_schema: tools::search::schema(),
            },
            ToolDescription {
                name: "export_memory".to_string(),
                description: Some(
                    "Export as Markdown (default), or a native stripped-of-secrets database copy."
                        .to_string(),
                ),
                input_schema: tools::export::schema(),
            },
            ToolDescription {
                name: "import_memory".to_string(),
                description: Some(
                    "Merge an external native store file into this one, re-keying or merging \
                     incoming roots as needed."
                        .to_string(),
                ),
                input_schema: tools::import::schema(),
            },
            ToolDescription {
                name: "reset_memory_cache".to_string(),
                description: Some(
                    "Clear this connection's session cache so the next bulk read starts over in \
                     discover mode."
                        .to_string(),
                ),
                input_schema: tools::reset_cache::schema(),
            },
            ToolDescription {
                name: "read_agent_memory".to_string(),
                description: Some(
                    "Curator-only read over a named agent's entries, bypassing the caller's own \
                     role for visibility."
                        .to_string(),
                ),
                input_schema: tools::curator::read_schema(),
            },
            ToolDescription {
                name: "fix_agent_memory".to_string(),
                description: Some(
                    "Curator-only update, bypassing the `[✓ID]` correction-marker requirement."
                        .to_string(),
                ),
                input_schema: tools::curator::fix_schema(),
            },
            ToolDescription {
                name: "append_agent_memory".to_string(),
                description: Some("Curator-only append under a named agent's entries.".to_string()),
                input_schema: tools::curator::append_schema(),
            },
            ToolDescription {
                name: "delete_agent_memory".to_string(),
                description: Some("Curator-only deletion of a root entry.".to_string()),
                input_schema: tools::curator::delete_schema(),
            },
            ToolDescription {
                name: "mark_audited".to_string(),
                description: Some("Record that an agent's memory was just reviewed.".to_string()),
                input_schema: tools::audit::mark_audited_schema(),
            },
            ToolDescription {
                name: "get_audit_queue".to_string(),
                description: Some(
                    "List agents oldest-reviewed-first, with never-audited agents first."
                        .to_string(),
                ),
                input_schema: tools::audit::get_audit_queue_schema(),
            },
        ];

        let result = ListToolsResult { tools };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    /// Handle tools/call request
    async fn handle_tools_call(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("Missing tool call parameters")),
        };

        let result: Result<serde_json::Value, String> = match request.name.as_str() {
            "write_memory" => {
                tools::write::execute(&self.store, self.caller_role, request.arguments).await
            }
            "read_memory" => {
                tools::read::execute(&self.store, self.caller_role, &mut self.session, request.arguments)
                    .await
            }
            "update_memory" => {
                tools::update::execute(&self.store, self.caller_role, request.arguments).await
            }
            "append_memory" => {
                tools::append::execute(&self.store, self.caller_role, request.arguments).await
            }
            "search_memory" => {
                tools::search::execute(&self.store, self.caller_role, request.arguments).await
            }
            "export_memory" => {
                tools::export::execute(&self.store, self.caller_role, request.arguments).await
            }
            "import_memory" => {
                tools::import::execute(&self.store, self.caller_role, request.arguments).await
            }
            "reset_memory_cache" => {
                tools::reset_cache::execute(&mut self.session, request.arguments).await
            }
            "read_agent_memory" => {
                tools::curator::execute_read(
                    &self.store,
                    self.caller_role,
                    &mut self.session,
                    request.arguments,
                )
                .await
            }
            "fix_agent_memory" => {
                tools::curator::execute_fix(&self.store, self.caller_role, request.arguments).await
            }
            "append_agent_memory" => {
                tools::curator::execute_append(&self.store, self.caller_role, request.arguments).await
            }
            "delete_agent_memory" => {
                tools::curator::execute_delete(&self.store, self.caller_role, request.arguments).await
            }
            "mark_audited" => {
                tools::audit::execute_mark_audited(&self.store, self.caller_role, request.arguments)
                    .await
            }
            "get_audit_queue" => {
                tools::audit::execute_get_audit_queue(&self.store, self.caller_role, request.arguments)
                    .await
            }
            name => {
                return Err(JsonRpcError::method_not_found_with_message(&format!(
                    "Unknown tool: {}",
                    name
                )));
            }
        };

        let response = match result {
            Ok(content) => {
                let call_result = CallToolResult {
                    content: vec![crate::protocol::messages::ToolResultContent {
                        content_type: "text".to_string(),
                        text: serde_json::to_string_pretty(&content).unwrap_or_else(|_| content.to_string()),
                    }],
                    is_error: Some(false),
                };
                serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
            }
            Err(e) => {
                let call_result = CallToolResult {
                    content: vec![crate::protocol::messages::ToolResultContent {
                        content_type: "text".to_string(),
                        text: serde_json::json!({ "error": e }).to_string(),
                    }],
                    is_error: Some(true),
                };
                serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
            }
        };

        response
    }

    /// Handle resources/list request
    async fn handle_resources_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let resources = vec![ResourceDescription {
            uri: "memory://stats".to_string(),
            name: "Memory Statistics".to_string(),
            description: Some("Entry counts by prefix across the store".to_string()),
            mime_type: Some("application/json".to_string()),
        }];

        let result = ListResourcesResult { resources };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    /// Handle resources/read request
    async fn handle_resources_read(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: ReadResourceRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("Missing resource URI")),
        };

        let uri = &request.uri;
        let content = if uri.starts_with("memory://") {
            resources::memory::read(&self.store, uri)
        } else {
            Err(format!("Unknown resource scheme: {}", uri))
        };

        match content {
            Ok(text) => {
                let result = ReadResourceResult {
                    contents: vec![crate::protocol::messages::ResourceContent {
                        uri: uri.clone(),
                        mime_type: Some("application/json".to_string()),
                        text: Some(text),
                        blob: None,
                    }],
                };
                serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
            }
            Err(e) => Err(JsonRpcError::internal_error(&e)),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::Config;
    use tempfile::TempDir;

    /// Create a test store with a temporary database
    fn test_store() -> (Arc<Store>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(Some(dir.path().join("test.db")), Config::default()).unwrap();
        (Arc::new(store), dir)
    }

    /// Create a test server with temporary storage
    fn test_server() -> (McpServer, TempDir) {
        let (store, dir) = test_store();
        let server = McpServer::new(store, Role::Al);
        (server, dir)
    }

    /// Create a JSON-RPC request
    fn make_request(method: &str, params: Option<serde_json::Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(1)),
            method: method.to_string(),
            params,
        }
    }

    // ========================================================================
    // INITIALIZATION TESTS
    // ========================================================================

    #[tokio::test]
    async fn test_initialize_sets_initialized_flag() {
        let (mut server, _dir) = test_server();
        assert!(!server.initialized);

        let request = make_request("initialize", Some(serde_json::json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        })));

        let response = server.handle_request(request).await;
        assert!(response.is_some());
        let response = response.unwrap();
        assert!(response.result.is_some());
        assert!(response.error.is_none());
        assert!(server.initialized);
    }

    #[tokio::test]
    async fn test_initialize_returns_server_info() {
        let (mut server, _dir) = test_server();
        let params = serde_json::json!({
            "protocolVersion": MCP_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "test", "version": "1.0" }
        });
        let request = make_request("initialize", Some(params));

        let response = server.handle_request(request).await.unwrap();
        let result = response.result.unwrap();

        assert_eq!(result["protocolVersion"], MCP_VERSION);
        assert_eq!(result["serverInfo"]["name"], "grove");
        assert!(result["capabilities"]["tools"].is_object());
        assert!(result["capabilities"]["resources"].is_object());
        assert!(result["instructions"].is_string());
    }

    #[tokio::test]
    async fn test_initialize_with_default_params() {
        let (mut server, _dir) = test_server();
        let request = make_request("initialize", None);

        let response = server.handle_request(request).await.unwrap();
        assert!(response.result.is_some());
        assert!(response.error.is_none());
    }

    // ========================================================================
    // UNINITIALIZED SERVER TESTS
    // ========================================================================

    #[tokio::test]
    async fn test_request_before_initialize_returns_error() {
        let (mut server, _dir) = test_server();

        let request = make_request("tools/list", None);
        let response = server.handle_request(request).await.unwrap();

        assert!(response.result.is_none());
        assert!(response.error.is_some());
        let error = response.error.unwrap();
        assert_eq!(error.code, -32003); // ServerNotInitialized
    }

    #[tokio::test]
    async fn test_ping_before_initialize_returns_error() {
        let (mut server, _dir) = test_server();

        let request = make_request("ping", None);
        let response = server.handle_request(request).await.unwrap();

        assert!(response.error.is_some());
        assert_eq!(response.error.unwrap().code, -32003);
    }

    // ========================================================================
    // NOTIFICATION TESTS
    // ========================================================================

    #[tokio::test]
    async fn test_initialized_notification_returns_none() {
        let (mut server, _dir) = test_server();

        let init_request = make_request("initialize", None);
        server.handle_request(init_request).await;

        let notification = make_request("notifications/initialized", None);
        let response = server.handle_request(notification).await;

        assert!(response.is_none());
    }

    // ========================================================================
    // TOOLS/LIST TESTS
    // ========================================================================

    #[tokio::test]
    async fn test_tools_list_returns_all_tools() {
        let (mut server, _dir) = test_server();

        let init_request = make_request("initialize", None);
        server.handle_request(init_request).await;

        let request = make_request("tools/list", None);
        let response = server.handle_request(request).await.unwrap();

        let result = response.result.unwrap();
        let tools = result["tools"].as_array().unwrap();

        assert_eq!(tools.len(), 14, "Expected exactly 14 tools");

        let tool_names: Vec<&str> = tools
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();

        assert!(tool_names.contains(&"write_memory"));
        assert!(tool_names.contains(&"read_memory"));
        assert!(tool_names.contains(&"update_memory"));
        assert!(tool_names.contains(&"append_memory"));
        assert!(tool_names.contains(&"search_memory"));
        assert!(tool_names.contains(&"export_memory"));
        assert!(tool_names.contains(&"import_memory"));
        assert!(tool_names.contains(&"reset_memory_cache"));
        assert!(tool_names.contains(&"read_agent_memory"));
        assert!(tool_names.contains(&"fix_agent_memory"));
        assert!(tool_names.contains(&"append_agent_memory"));
        assert!(tool_names.contains(&"delete_agent_memory"));
        assert!(tool_names.contains(&"mark_audited"));
        assert!(tool_names.contains(&"get_audit_queue"));
    }

    #[tokio::test]
    async fn test_tools_have_descriptions_and_schemas() {
        let (mut server, _dir) = test_server();

        let init_request = make_request("initialize", None);
        server.handle_request(init_request).await;

        let request = make_request("tools/list", None);
        let response = server.handle_request(request).await.unwrap();

        let result = response.result.unwrap();
        let tools = result["tools"].as_array().unwrap();

        for tool in tools {
            assert!(tool["name"].is_string(), "Tool should have a name");
            assert!(tool["description"].is_string(), "Tool should have a description");
            assert!(tool["inputSchema"].is_object(), "Tool should have an input schema");
        }
    }

    // ========================================================================
    // RESOURCES/LIST TESTS
    // ========================================================================

    #[tokio::test]
    async fn test_resources_list_returns_memory_stats() {
        let (mut server, _dir) = test_server();

        let init_request = make_request("initialize", None);
        server.handle_request(init_request).await;

        let request = make_request("resources/list", None);
        let response = server.handle_request(request).await.unwrap();

        let result = response.result.unwrap();
        let resources = result["resources"].as_array().unwrap();

        let resource_uris: Vec<&str> = resources
            .iter()
            .map(|r| r["uri"].as_str().unwrap())
            .collect();

        assert!(resource_uris.contains(&"memory://stats"));
    }

    #[tokio::test]
    async fn test_resources_have_descriptions() {
        let (mut server, _dir) = test_server();

        let init_request = make_request("initialize", None);
        server.handle_request(init_request).await;

        let request = make_request("resources/list", None);
        let response = server.handle_request(request).await.unwrap();

        let result = response.result.unwrap();
        let resources = result["resources"].as_array().unwrap();

        for resource in resources {
            assert!(resource["uri"].is_string(), "Resource should have a URI");
            assert!(resource["name"].is_string(), "Resource should have a name");
            assert!(resource["description"].is_string(), "Resource should have a description");
        }
    }

    #[tokio::test]
    async fn test_resources_read_returns_stats_json() {
        let (mut server, _dir) = test_server();

        let init_request = make_request("initialize", None);
        server.handle_request(init_request).await;

        let params = serde_json::json!({ "uri": "memory://stats" });
        let response = server.handle_request(make_request("resources/read", Some(params))).await.unwrap();
        let result = response.result.unwrap();
        assert!(result["contents"][0]["text"].as_str().unwrap().contains("total"));
    }

    // ========================================================================
    // UNKNOWN METHOD TESTS
    // ========================================================================

    #[tokio::test]
    async fn test_unknown_method_returns_error() {
        let (mut server, _dir) = test_server();

        let init_request = make_request("initialize", None);
        server.handle_request(init_request).await;

        let request = make_request("unknown/method", None);
        let response = server.handle_request(request).await.unwrap();

        assert!(response.result.is_none());
        assert!(response.error.is_some());
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601); // MethodNotFound
    }

    #[tokio::test]
    async fn test_unknown_tool_returns_error() {
        let (mut server, _dir) = test_server();

        let init_request = make_request("initialize", None);
        server.handle_request(init_request).await;

        let request = make_request("tools/call", Some(serde_json::json!({
            "name": "nonexistent_tool",
            "arguments": {}
        })));

        let response = server.handle_request(request).await.unwrap();
        assert!(response.error.is_some());
        assert_eq!(response.error.unwrap().code, -32601);
    }

    // ========================================================================
    // PING TESTS
    // ========================================================================

    #[tokio::test]
    async fn test_ping_returns_empty_object() {
        let (mut server, _dir) = test_server();

        let init_request = make_request("initialize", None);
        server.handle_request(init_request).await;

        let request = make_request("ping", None);
        let response = server.handle_request(request).await.unwrap();

        assert!(response.result.is_some());
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap(), serde_json::json!({}));
    }

    // ========================================================================
    // TOOLS/CALL TESTS
    // ========================================================================

    #[tokio::test]
    async fn test_tools_call_missing_params_returns_error() {
        let (mut server, _dir) = test_server();

        let init_request = make_request("initialize", None);
        server.handle_request(init_request).await;

        let request = make_request("tools/call", None);
        let response = server.handle_request(request).await.unwrap();

        assert!(response.error.is_some());
        assert_eq!(response.error.unwrap().code, -32602); // InvalidParams
    }

    #[tokio::test]
    async fn test_tools_call_invalid_params_returns_error() {
        let (mut server, _dir) = test_server();

        let init_request = make_request("initialize", None);
        server.handle_request(init_request).await;

        let request = make_request("tools/call", Some(serde_json::json!({
            "invalid": "params"
        })));

        let response = server.handle_request(request).await.unwrap();
        assert!(response.error.is_some());
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_tools_call_write_then_read_round_trips() {
        let (mut server, _dir) = test_server();

        let init_request = make_request("initialize", None);
        server.handle_request(init_request).await;

        let write_params = serde_json::json!({
            "name": "write_memory",
            "arguments": { "prefix": "E", "content": "A fact worth keeping" }
        });
        let response = server.handle_request(make_request("tools/call", Some(write_params))).await.unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);

        let read_params = serde_json::json!({ "name": "read_memory", "arguments": {} });
        let response = server.handle_request(make_request("tools/call", Some(read_params))).await.unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn test_curator_tools_require_ceo_role() {
        let (mut server, _dir) = test_server();

        let init_request = make_request("initialize", None);
        server.handle_request(init_request).await;

        let params = serde_json::json!({
            "name": "get_audit_queue",
            "arguments": {}
        });
        let response = server.handle_request(make_request("tools/call", Some(params))).await.unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
    }
}
