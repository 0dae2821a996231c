use crate::mcp::{CallToolResult, McpError, McpTool};
use async_trait::async_trait;
use serde_json::Value;

/// A live handle to an external tool-serving endpoint
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Discovery: every tool the provider currently exposes
    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError>;

    /// Invoke one tool by its provider-local name
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError>;

    /// Release the underlying connection
    async fn shutdown(&self) {}
}
