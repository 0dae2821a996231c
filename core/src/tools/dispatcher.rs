use super::error::{ToolError, ToolResult};
use super::registry::{resolve_in, ToolDescriptor, ToolRegistry};
use crate::mcp::{CallToolResult, ToolContent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Fixed bound on a single tool call
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// A tool call parsed from model output; lives for one dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub tool_name: String,
    pub parameters: Value,
}

/// Normalized outcome of a successful tool call
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool_name: String,
    pub provider: String,
    pub text: String,
    pub elapsed: Duration,
}

/// Resolves a tool to its provider and runs it under a timeout
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    timeout: Duration,
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

impl ToolDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Dispatch `request` against the turn's catalog snapshot.
    ///
    /// The provider is looked up live, so a disconnect after discovery surfaces
    /// as `ProviderUnavailable` rather than a stale call.
    #[tracing::instrument(name = "tool_dispatch", skip_all, fields(tool.name = %request.tool_name))]
    pub async fn dispatch(
        &self,
        registry: &ToolRegistry,
        catalog: &[ToolDescriptor],
        request: &ToolInvocationRequest,
    ) -> ToolResult<ToolOutput> {
        let name = request.tool_name.as_str();
        let descriptor = resolve_in(catalog, name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let provider = registry.provider(&descriptor.provider).await.ok_or_else(|| {
            ToolError::ProviderUnavailable {
                tool: name.to_string(),
                provider: descriptor.provider.clone(),
            }
        })?;

        debug!(target: "tool_dispatch", tool = %name, provider = %descriptor.provider, "Invoking tool");
        let started = Instant::now();

        let result = match timeout(
            self.timeout,
            provider.call_tool(name, request.parameters.clone()),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(target: "tool_dispatch", tool = %name, error = %e, "Tool invocation failed");
                return Err(ToolError::Invocation {
                    tool: name.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!(target: "tool_dispatch", tool = %name, timeout_s = self.timeout.as_secs(), "Tool execution timed out");
                return Err(ToolError::Timeout {
                    tool: name.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        let text = normalize_result(&result);
        if result.is_error() {
            warn!(target: "tool_dispatch", tool = %name, "Tool reported an error result");
            return Err(ToolError::Invocation {
                tool: name.to_string(),
                message: text,
            });
        }

        let elapsed = started.elapsed();
        info!(
            target: "tool_dispatch",
            tool = %name,
            provider = %descriptor.provider,
            latency_ms = elapsed.as_millis() as u64,
            chars = text.len(),
            "Tool invocation finished"
        );

        Ok(ToolOutput {
            tool_name: name.to_string(),
            provider: descriptor.provider.clone(),
            text,
            elapsed,
        })
    }
}

/// Flatten a structured tool result into one text block
pub fn normalize_result(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .map(|item| match item {
            ToolContent::Text { text } => text.clone(),
            ToolContent::Image { mime_type, .. } => format!("[image content: {}]", mime_type),
            ToolContent::Audio { mime_type, .. } => format!("[audio content: {}]", mime_type),
            ToolContent::Resource { resource } => match &resource.text {
                Some(text) => text.clone(),
                None => format!("[resource: {}]", resource.uri),
            },
            ToolContent::Unsupported => "[unsupported content]".to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::types::ResourceContents;

    #[test]
    fn normalize_joins_parts_in_order() {
        let result = CallToolResult {
            content: vec![
                ToolContent::Text {
                    text: "line one".into(),
                },
                ToolContent::Resource {
                    resource: ResourceContents {
                        uri: "file:///a".into(),
                        mime_type: None,
                        text: Some("resource body".into()),
                        blob: None,
                    },
                },
                ToolContent::Resource {
                    resource: ResourceContents {
                        uri: "file:///b".into(),
                        mime_type: None,
                        text: None,
                        blob: Some("AAAA".into()),
                    },
                },
                ToolContent::Image {
                    data: "AAAA".into(),
                    mime_type: "image/png".into(),
                },
            ],
            is_error: None,
        };
        assert_eq!(
            normalize_result(&result),
            "line one\nresource body\n[resource: file:///b]\n[image content: image/png]"
        );
    }

    #[test]
    fn empty_result_is_empty_text() {
        assert_eq!(normalize_result(&CallToolResult::default()), "");
    }
}
