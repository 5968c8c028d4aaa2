//! Stdio Transport
//!
//! Standard MCP transport: one JSON-RPC message per line on stdin, one
//! response per line on stdout. Logging goes to stderr so stdout stays a
//! clean protocol channel.

use crate::mcp::protocol::{JsonRpcError, McpRequest, McpResponse};
use crate::mcp::server::McpServer;
use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

/// Serve MCP over stdin/stdout until stdin closes.
pub async fn serve(server: McpServer) -> Result<()> {
    info!("starting MCP stdio transport");

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin).lines();

    while let Some(line) = reader.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        debug!(request = %line, "received request");

        let response = match serde_json::from_str::<McpRequest>(line) {
            Ok(request) => {
                // id-less requests are notifications and must not be answered
                let is_notification = request.id.is_none();
                let response = server.handle_request(request).await;
                if is_notification {
                    continue;
                }
                response
            }
            Err(e) => {
                error!(error = %e, "parse error");
                McpResponse::error(None, JsonRpcError::parse_error(e.to_string()))
            }
        };

        let response_json = serde_json::to_string(&response)?;
        stdout.write_all(response_json.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    info!("stdio transport shutting down");
    Ok(())
}
