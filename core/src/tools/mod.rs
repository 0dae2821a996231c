pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod traits;

// Re-export common types
pub use dispatcher::{
    normalize_result, ToolDispatcher, ToolInvocationRequest, ToolOutput, DEFAULT_TOOL_TIMEOUT,
};
pub use error::{ToolError, ToolResult};
pub use registry::{ProviderConnection, ToolDescriptor, ToolRegistry};
pub use traits::ToolProvider;
