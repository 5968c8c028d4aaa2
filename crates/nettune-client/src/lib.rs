//! nettune-client: Operator Frontend
//!
//! Provides:
//! - Typed HTTP client for the nettune server API
//! - Active probes: RTT, throughput, latency-under-load
//! - MCP stdio server binding the probes and the system API as tools

pub mod http;
pub mod mcp;
pub mod probe;

pub use http::Client;
pub use mcp::McpServer;
