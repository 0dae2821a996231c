// Parley Core Library
// Conversational assistant runtime: prompt building, MCP tool routing, response synthesis

pub mod conversation;
pub mod llm;
pub mod mcp;
pub mod session;
pub mod telemetry;
pub mod tools;

// Export core types
pub use conversation::{
    Orchestrator, OrchestratorOptions, Reply, ReplyKind, ReplySink, TurnOutcome, TurnPath,
};
pub use llm::{ChatMessage, ChatModel, LlmClient, LlmClientConfig};
pub use session::{Session, SessionStore};
pub use tools::{ToolDispatcher, ToolError, ToolProvider, ToolRegistry};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Inference error: {0}")]
    Inference(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("MCP error: {0}")]
    Mcp(#[from] mcp::McpError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ParleyError {
    /// Stable error code used in logs and user notices
    pub fn code(&self) -> &'static str {
        match self {
            ParleyError::Inference(_) => "INFERENCE_ERROR",
            ParleyError::Tool(e) => e.code(),
            ParleyError::Mcp(e) => e.code(),
            ParleyError::Config(_) => "CONFIG_ERROR",
            ParleyError::Io(_) => "IO_ERROR",
            ParleyError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;
