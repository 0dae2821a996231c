use std::fs;
use std::path::Path;

use parley_core::conversation::history::DEFAULT_HISTORY_LIMIT;
use parley_core::llm::ApiFlavor;
use parley_core::mcp::McpServerConfig;
use parley_core::{LlmClientConfig, OrchestratorOptions};

/// High-level configuration for the chat agent demo
#[derive(Clone, Debug)]
pub struct ChatAgentConfig {
    pub llm: LlmClientConfig,
    pub orchestrator: OrchestratorOptions,
    /// Conversation entries kept per session
    pub history_limit: usize,
    /// MCP servers connected at startup, in resolution order
    pub servers: Vec<McpServerConfig>,
}

impl Default for ChatAgentConfig {
    fn default() -> Self {
        let mut orchestrator = OrchestratorOptions::default();
        if let Some(prompt) = std::env::var("CHAT_SYSTEM_PROMPT")
            .ok()
            .filter(|s| !s.is_empty())
        {
            orchestrator.persona = prompt;
        }

        Self {
            llm: LlmClientConfig::default(),
            orchestrator,
            history_limit: std::env::var("CHAT_HISTORY_LIMIT")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(DEFAULT_HISTORY_LIMIT),
            servers: Vec::new(),
        }
    }
}

impl ChatAgentConfig {
    /// Load configuration from a TOML file (path via CHAT_AGENT_CONFIG or ./chat_agent.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("CHAT_AGENT_CONFIG").unwrap_or_else(|_| "chat_agent.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "chat_agent", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match Self::overlay_str(&s, default.clone()) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(target: "chat_agent", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "chat_agent", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    /// Apply a TOML document on top of `base`
    pub fn overlay_str(s: &str, base: Self) -> Result<Self, toml::de::Error> {
        let t = toml::from_str::<ChatAgentToml>(s)?;
        Ok(t.overlay(base))
    }

    pub fn server(&self, name: &str) -> Option<&McpServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ChatAgentToml {
    pub llm: Option<LlmToml>,
    pub orchestrator: Option<OrchestratorToml>,
    pub servers: Option<Vec<McpServerConfig>>,
}

impl ChatAgentToml {
    fn overlay(self, mut base: ChatAgentConfig) -> ChatAgentConfig {
        if let Some(l) = self.llm {
            l.apply(&mut base.llm);
        }
        if let Some(o) = self.orchestrator {
            if let Some(limit) = o.history_limit {
                base.history_limit = limit.max(1);
            }
            o.apply(&mut base.orchestrator);
        }
        if let Some(servers) = self.servers {
            base.servers = servers;
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct LlmToml {
    pub flavor: Option<String>, // "openai" | "azure"
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub request_timeout_ms: Option<u64>,
}
impl LlmToml {
    fn apply(self, l: &mut LlmClientConfig) {
        match self.flavor.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("azure") => l.flavor = ApiFlavor::Azure,
            Some("openai") => l.flavor = ApiFlavor::OpenAi,
            Some(other) => {
                tracing::warn!(target: "chat_agent", flavor = %other, "Unknown LLM flavor; keeping default")
            }
            None => {}
        }
        if let Some(x) = self.base_url {
            l.base_url = x;
        }
        if let Some(x) = self.model {
            l.model = x;
        }
        if let Some(x) = self.api_key {
            l.api_key = Some(x);
        }
        if let Some(x) = self.api_version {
            l.api_version = Some(x);
        }
        if let Some(x) = self.request_timeout_ms {
            l.request_timeout_ms = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct OrchestratorToml {
    pub tool_timeout_ms: Option<u64>,
    pub history_limit: Option<usize>,
    pub synthesis_context: Option<usize>,
    pub nudge_keywords: Option<Vec<String>>,
    pub system_prompt: Option<String>,
}
impl OrchestratorToml {
    fn apply(self, o: &mut OrchestratorOptions) {
        if let Some(x) = self.tool_timeout_ms {
            o.tool_timeout_ms = x;
        }
        if let Some(x) = self.synthesis_context {
            o.synthesis_context = x;
        }
        if let Some(x) = self.nudge_keywords {
            o.nudge_keywords = x;
        }
        if let Some(x) = self.system_prompt {
            o.persona = x;
        }
    }
}
