use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Provider '{provider}' for tool '{tool}' is not connected")]
    ProviderUnavailable { tool: String, provider: String },

    #[error("Tool '{tool}' timed out after {}s", .timeout.as_secs())]
    Timeout { tool: String, timeout: Duration },

    #[error("Tool '{tool}' failed: {message}")]
    Invocation { tool: String, message: String },
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "TOOL_NOT_FOUND",
            ToolError::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            ToolError::Timeout { .. } => "TOOL_TIMEOUT",
            ToolError::Invocation { .. } => "TOOL_INVOCATION_ERROR",
        }
    }
}

pub type ToolResult<T> = Result<T, ToolError>;
