/// Model Context Protocol (MCP) integration
///
/// This module provides the MCP client used as a tool provider handle:
/// connect to a server, discover its tools, and invoke them.
///
/// MCP Protocol Spec: https://spec.modelcontextprotocol.io/specification/
///
/// Architecture:
/// - `client`: MCP client (stdio and streamable HTTP transports)
/// - `types`: MCP protocol types (JSON-RPC 2.0 based)
pub mod client;
pub mod types;

pub use client::McpClient;
pub use types::{
    CallToolResult, McpError, McpServerConfig, McpTool, McpTransport, ToolContent,
    DEFAULT_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
