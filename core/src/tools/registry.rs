use super::traits::ToolProvider;
use crate::mcp::{McpError, McpTool};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A tool as advertised to the model, tagged with its owning provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub provider: String,
}

impl ToolDescriptor {
    pub fn from_mcp(tool: McpTool, provider: &str) -> Self {
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            input_schema: tool.input_schema,
            provider: provider.to_string(),
        }
    }
}

/// A connected provider and the tools discovered on it
pub struct ProviderConnection {
    pub id: String,
    pub handle: Arc<dyn ToolProvider>,
    pub tools: Vec<ToolDescriptor>,
}

/// First descriptor named `name`, scanning providers in connect order
pub fn resolve_in<'a>(catalog: &'a [ToolDescriptor], name: &str) -> Option<&'a ToolDescriptor> {
    catalog.iter().find(|t| t.name == name)
}

/// Per-session registry of connected tool providers.
///
/// Cloning yields another handle onto the same state, so host connect/disconnect
/// hooks can run while a turn is in flight.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    providers: Arc<RwLock<Vec<ProviderConnection>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect hook: discover the provider's tools and record them.
    ///
    /// Reconnecting an id replaces the old connection in place, so it keeps its
    /// position in name-resolution order.
    pub async fn connect(
        &self,
        id: impl Into<String>,
        handle: Arc<dyn ToolProvider>,
    ) -> Result<usize, McpError> {
        let id = id.into();
        debug!(target: "tool_registry", provider = %id, "Discovering tools");

        let tools: Vec<ToolDescriptor> = handle
            .list_tools()
            .await?
            .into_iter()
            .map(|t| ToolDescriptor::from_mcp(t, &id))
            .collect();
        let count = tools.len();
        let new_handle = Arc::clone(&handle);

        let replaced = {
            let mut providers = self.providers.write().await;
            let conn = ProviderConnection {
                id: id.clone(),
                handle,
                tools,
            };
            match providers.iter_mut().find(|p| p.id == id) {
                Some(existing) => Some(std::mem::replace(existing, conn)),
                None => {
                    providers.push(conn);
                    None
                }
            }
        };

        if let Some(old) = replaced {
            warn!(target: "tool_registry", provider = %id, "Provider reconnected; replacing previous handle");
            if !Arc::ptr_eq(&old.handle, &new_handle) {
                old.handle.shutdown().await;
            }
        }

        info!(target: "tool_registry", provider = %id, tool_count = count, "Provider connected");
        Ok(count)
    }

    /// Disconnect hook: drop the provider and its tools. Returns false if unknown.
    pub async fn disconnect(&self, id: &str) -> bool {
        let removed = {
            let mut providers = self.providers.write().await;
            providers
                .iter()
                .position(|p| p.id == id)
                .map(|idx| providers.remove(idx))
        };

        match removed {
            Some(conn) => {
                conn.handle.shutdown().await;
                info!(target: "tool_registry", provider = %id, "Provider disconnected");
                true
            }
            None => {
                warn!(target: "tool_registry", provider = %id, "Disconnect for unknown provider");
                false
            }
        }
    }

    /// Snapshot of the tool catalog in provider connect order
    pub async fn catalog(&self) -> Vec<ToolDescriptor> {
        self.providers
            .read()
            .await
            .iter()
            .flat_map(|p| p.tools.iter().cloned())
            .collect()
    }

    /// Linear first-match lookup across all connected providers
    pub async fn resolve(&self, name: &str) -> Option<ToolDescriptor> {
        let providers = self.providers.read().await;
        providers
            .iter()
            .flat_map(|p| p.tools.iter())
            .find(|t| t.name == name)
            .cloned()
    }

    /// Live handle for a provider id
    pub async fn provider(&self, id: &str) -> Option<Arc<dyn ToolProvider>> {
        self.providers
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .map(|p| Arc::clone(&p.handle))
    }

    pub async fn provider_ids(&self) -> Vec<String> {
        self.providers
            .read()
            .await
            .iter()
            .map(|p| p.id.clone())
            .collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.providers.read().await.is_empty()
    }

    /// Disconnect every provider
    pub async fn shutdown_all(&self) {
        let drained: Vec<ProviderConnection> = self.providers.write().await.drain(..).collect();
        for conn in drained {
            debug!(target: "tool_registry", provider = %conn.id, "Shutting down provider");
            conn.handle.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::CallToolResult;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticProvider {
        tools: Vec<&'static str>,
        shutdowns: AtomicUsize,
    }

    impl StaticProvider {
        fn new(tools: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                tools,
                shutdowns: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ToolProvider for StaticProvider {
        async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
            Ok(self
                .tools
                .iter()
                .map(|n| McpTool {
                    name: n.to_string(),
                    description: Some(format!("{} tool", n)),
                    input_schema: json!({"type": "object"}),
                })
                .collect())
        }

        async fn call_tool(&self, name: &str, _arguments: Value) -> Result<CallToolResult, McpError> {
            Ok(CallToolResult::text(name))
        }

        async fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn connect_records_descriptors_with_owner() {
        let registry = ToolRegistry::new();
        let count = registry
            .connect("notify", StaticProvider::new(vec!["gcnotify", "templates"]))
            .await
            .unwrap();
        assert_eq!(count, 2);

        let catalog = registry.catalog().await;
        assert_eq!(catalog.len(), 2);
        assert!(catalog.iter().all(|t| t.provider == "notify"));
        assert_eq!(catalog[0].description, "gcnotify tool");
    }

    #[tokio::test]
    async fn first_connected_provider_wins_name_collisions() {
        let registry = ToolRegistry::new();
        registry
            .connect("alpha", StaticProvider::new(vec!["search"]))
            .await
            .unwrap();
        registry
            .connect("beta", StaticProvider::new(vec!["search", "fetch"]))
            .await
            .unwrap();

        assert_eq!(registry.resolve("search").await.unwrap().provider, "alpha");
        assert_eq!(registry.resolve("fetch").await.unwrap().provider, "beta");
        assert!(registry.resolve("missing").await.is_none());

        let catalog = registry.catalog().await;
        assert_eq!(resolve_in(&catalog, "search").unwrap().provider, "alpha");
    }

    #[tokio::test]
    async fn reconnect_keeps_precedence_and_shuts_old_handle() {
        let registry = ToolRegistry::new();
        let first = StaticProvider::new(vec!["search"]);
        registry.connect("alpha", first.clone()).await.unwrap();
        registry
            .connect("beta", StaticProvider::new(vec!["search"]))
            .await
            .unwrap();
        registry
            .connect("alpha", StaticProvider::new(vec!["search", "lookup"]))
            .await
            .unwrap();

        assert_eq!(registry.provider_ids().await, vec!["alpha", "beta"]);
        assert_eq!(registry.resolve("search").await.unwrap().provider, "alpha");
        assert!(registry.resolve("lookup").await.is_some());
        assert_eq!(first.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_removes_tools_and_shuts_down() {
        let registry = ToolRegistry::new();
        let provider = StaticProvider::new(vec!["gcnotify"]);
        registry.connect("notify", provider.clone()).await.unwrap();

        assert!(registry.disconnect("notify").await);
        assert!(registry.catalog().await.is_empty());
        assert!(registry.provider("notify").await.is_none());
        assert_eq!(provider.shutdowns.load(Ordering::SeqCst), 1);

        assert!(!registry.disconnect("notify").await);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let registry = ToolRegistry::new();
        let hook = registry.clone();
        hook.connect("notify", StaticProvider::new(vec!["gcnotify"]))
            .await
            .unwrap();
        assert!(!registry.is_empty().await);

        registry.shutdown_all().await;
        assert!(hook.is_empty().await);
    }
}
