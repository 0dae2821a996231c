//! LLM module: chat message types and the HTTP inference client
//!
//! This module provides:
//! - `ChatMessage`, `Role`, `CompletionOptions`, `LlmResponse` payload types
//! - `ChatModel`, the seam the orchestrator talks to
//! - `LlmClientConfig`, `LlmClient` for OpenAI-compatible and Azure OpenAI chat completions

mod client;
mod types;

pub use client::{ApiFlavor, LlmClient, LlmClientConfig};
pub use types::{ChatMessage, ChatModel, CompletionOptions, LlmResponse, Role};
