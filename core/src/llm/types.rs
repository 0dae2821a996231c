use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Chat message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat-completions message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Sampling knobs for one completion request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionOptions {
    /// First pass: decide between a direct answer and a tool call
    pub fn first_pass() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1500,
        }
    }

    /// Narrating a tool result; kept cooler so the model sticks to the data
    pub fn synthesis() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2000,
        }
    }

    /// Tool-free answer after a failed tool path
    pub fn fallback() -> Self {
        Self::first_pass()
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self::first_pass()
    }
}

/// Minimal response containing the assistant text
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
    pub usage: Option<serde_json::Value>,
    pub raw: Option<serde_json::Value>,
}

impl LlmResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Anything that can turn a message list into one completion
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<LlmResponse>;
}
