//! MCP request dispatch
//!
//! Handles initialize, tools/list and tools/call. Tool failures come back
//! as isError text content rather than JSON-RPC errors, so the LLM client
//! can read and act on them.

use crate::http::Client;
use crate::mcp::protocol::{JsonRpcError, McpRequest, McpResponse};
use crate::mcp::tools::NettuneTools;
use serde_json::{json, Value};
use tracing::{debug, info};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP server bound over one HTTP client.
pub struct McpServer {
    tools: NettuneTools,
}

impl McpServer {
    pub fn new(client: Client) -> Self {
        Self {
            tools: NettuneTools::new(client),
        }
    }

    /// Handle one incoming request and produce the response.
    pub async fn handle_request(&self, request: McpRequest) -> McpResponse {
        debug!(method = %request.method, "handling MCP request");

        match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "tools/list" => McpResponse::ok(request.id, json!({ "tools": NettuneTools::definitions() })),
            "tools/call" => self.handle_tools_call(request).await,
            // notifications carry no id and expect no error
            "notifications/initialized" => McpResponse::ok(request.id, json!({})),
            _ => McpResponse::error(request.id, JsonRpcError::method_not_found()),
        }
    }

    fn handle_initialize(&self, request: McpRequest) -> McpResponse {
        let client_name = request
            .params
            .as_ref()
            .and_then(|p| p.get("clientInfo"))
            .and_then(|ci| ci.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(client = client_name, "MCP client connected");

        McpResponse::ok(
            request.id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": { "listChanged": false }
                },
                "serverInfo": {
                    "name": "nettune",
                    "version": env!("CARGO_PKG_VERSION"),
                    "description": "Remote Linux network tuning: probes, profiles, apply/rollback"
                }
            }),
        )
    }

    async fn handle_tools_call(&self, request: McpRequest) -> McpResponse {
        let params = request.params.unwrap_or_else(|| json!({}));
        let name = params.get("name").and_then(Value::as_str).unwrap_or("");
        let default_args = json!({});
        let arguments = params.get("arguments").unwrap_or(&default_args);

        if name.is_empty() {
            return McpResponse::error(request.id, JsonRpcError::invalid_params("missing tool name"));
        }

        match self.tools.execute(name, arguments).await {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result).unwrap_or_default();
                McpResponse::ok(
                    request.id,
                    json!({
                        "content": [{ "type": "text", "text": text }],
                        "isError": false
                    }),
                )
            }
            Err(message) => McpResponse::ok(
                request.id,
                json!({
                    "content": [{ "type": "text", "text": format!("Error: {message}") }],
                    "isError": true
                }),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nettune_core::ClientConfig;

    fn server() -> McpServer {
        let client = Client::new(&ClientConfig {
            server: "http://127.0.0.1:1".to_string(),
            api_key: "test".to_string(),
            timeout: 1,
        })
        .unwrap();
        McpServer::new(client)
    }

    fn request(method: &str, params: Option<Value>) -> McpRequest {
        McpRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn initialize_reports_capabilities() {
        let response = server()
            .handle_request(request(
                "initialize",
                Some(json!({"clientInfo": {"name": "claude"}})),
            ))
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "nettune");
    }

    #[tokio::test]
    async fn tools_list_returns_all_tools() {
        let response = server().handle_request(request("tools/list", None)).await;
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 10);
    }

    #[tokio::test]
    async fn unknown_method_is_rpc_error() {
        let response = server().handle_request(request("resources/list", None)).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn missing_tool_name_is_invalid_params() {
        let response = server()
            .handle_request(request("tools/call", Some(json!({"arguments": {}}))))
            .await;
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn unreachable_server_surfaces_as_tool_error() {
        // port 1 refuses connections, so the tool must answer isError text
        let response = server()
            .handle_request(request(
                "tools/call",
                Some(json!({"name": "nettune.list_profiles", "arguments": {}})),
            ))
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Error:"));
    }
}
