//! MCP stdio surface
//!
//! JSON-RPC 2.0 over stdin/stdout, exposing the nettune operations as
//! tools. Pure argument marshalling over the HTTP client; the apply
//! protocol lives entirely server-side.

pub mod protocol;
pub mod server;
pub mod stdio;
pub mod tools;

pub use protocol::{JsonRpcError, McpRequest, McpResponse};
pub use server::McpServer;
