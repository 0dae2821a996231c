use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

use super::types::{ChatMessage, ChatModel, CompletionOptions, LlmResponse};
use crate::{ParleyError, Result};

/// Which wire dialect the endpoint speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `{base_url}/chat/completions` with bearer auth
    OpenAi,
    /// `{endpoint}/openai/deployments/{model}/chat/completions?api-version=…` with `api-key` header
    Azure,
}

pub const DEFAULT_AZURE_DEPLOYMENT: &str = "openai-gpt4o-mini";
pub const DEFAULT_AZURE_API_VERSION: &str = "2025-01-01-preview";

/// Configuration for LlmClient loaded from environment variables
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub flavor: ApiFlavor,
    pub base_url: String, // e.g., http://localhost:8000/v1 or https://<resource>.openai.azure.com
    pub model: String,    // model name, or deployment name for Azure
    pub api_key: Option<String>,
    pub api_version: Option<String>, // Azure only
    pub request_timeout_ms: u64,
}

impl Default for LlmClientConfig {
    fn default() -> Self {
        let request_timeout_ms = env_nonempty("LLM_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(120_000);

        if let Some(endpoint) = env_nonempty("AZURE_OPENAI_ENDPOINT") {
            return Self {
                flavor: ApiFlavor::Azure,
                base_url: endpoint,
                model: env_nonempty("AZURE_OPENAI_DEPLOYMENT")
                    .unwrap_or_else(|| DEFAULT_AZURE_DEPLOYMENT.to_string()),
                api_key: env_nonempty("AZURE_OPENAI_API_KEY"),
                api_version: Some(
                    env_nonempty("AZURE_OPENAI_API_VERSION")
                        .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
                ),
                request_timeout_ms,
            };
        }

        Self {
            flavor: ApiFlavor::OpenAi,
            base_url: env_nonempty("LLM_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8000/v1".to_string()),
            model: env_nonempty("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            api_key: env_nonempty("LLM_API_KEY"),
            api_version: None,
            request_timeout_ms,
        }
    }
}

impl LlmClientConfig {
    /// Full chat-completions URL for the configured flavor
    pub fn chat_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.flavor {
            ApiFlavor::OpenAi => format!("{}/chat/completions", base),
            ApiFlavor::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base,
                self.model,
                self.api_version
                    .as_deref()
                    .unwrap_or(DEFAULT_AZURE_API_VERSION)
            ),
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

/// HTTP client for non-streaming chat completions
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    cfg: LlmClientConfig,
}

impl LlmClient {
    pub fn new(cfg: LlmClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| ParleyError::Inference(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(LlmClientConfig::default())
    }

    pub fn config(&self) -> &LlmClientConfig {
        &self.cfg
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    /// Contract:
    /// - Input: ordered messages + sampling options
    /// - Output: LlmResponse with trimmed assistant text
    /// - Error: any transport, status, or shape problem becomes `ParleyError::Inference`
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<LlmResponse> {
        let url = self.cfg.chat_url();
        debug!(
            target: "llm_client",
            url = %url,
            messages = messages.len(),
            "POST chat completions"
        );

        let mut req = self
            .http
            .post(&url)
            .header("content-type", "application/json");
        if let Some(key) = &self.cfg.api_key {
            req = match self.cfg.flavor {
                ApiFlavor::OpenAi => req.bearer_auth(key),
                ApiFlavor::Azure => req.header("api-key", key),
            };
        }

        let body = json!({
            "model": self.cfg.model,
            "messages": messages,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "stream": false,
        });

        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| ParleyError::Inference(format!("Chat Completions HTTP error: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(target: "llm_client", %status, body = %text, "Chat Completions error");
            return Err(ParleyError::Inference(format!(
                "Chat Completions error: status={} body={}",
                status, text
            )));
        }

        let val: serde_json::Value = resp.json().await.map_err(|e| {
            ParleyError::Inference(format!("Failed to parse Chat Completions JSON: {e}"))
        })?;
        let text = extract_text_from_chat_completions(&val).ok_or_else(|| {
            ParleyError::Inference("Missing choices[0].message.content in chat completions".into())
        })?;
        Ok(LlmResponse {
            text: text.trim().to_string(),
            model: val
                .get("model")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            usage: val.get("usage").cloned(),
            raw: Some(val),
        })
    }
}

pub(crate) fn extract_text_from_chat_completions(v: &serde_json::Value) -> Option<String> {
    v.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}
