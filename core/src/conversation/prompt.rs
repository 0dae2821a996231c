use serde_json::json;

use super::history::ConversationHistory;
use crate::llm::ChatMessage;
use crate::tools::ToolDescriptor;

pub const DEFAULT_PERSONA: &str = "You are a helpful AI assistant.";

/// Words that suggest the user wants something a tool can fetch
pub const DEFAULT_NUDGE_KEYWORDS: &[&str] = &[
    "gcnotify",
    "notify",
    "notification",
    "service",
    "template",
    "tool",
    "lookup",
    "search",
    "fetch",
    "list",
];

const TOOL_CALL_INSTRUCTIONS: &str = "If you want to call a tool, instead reply ONLY with a single-line JSON object \
using double quotes for all keys and string values, and use true/false/null in lowercase \
(valid JSON only, no single quotes, no code fences). \
Example: {\"tool_name\": \"TOOL\", \"parameters\": {\"foo\": \"bar\"}}.\n\
If you do NOT want to call a tool, reply as a normal helpful assistant, NOT as a JSON object.";

const NUDGE: &str = "The user's request looks like something one of the available tools can answer. \
If a listed tool fits, reply ONLY with the single-line JSON tool call instead of answering from memory.";

/// Assembles the first-pass message list
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
    nudge_keywords: Vec<String>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(
            DEFAULT_PERSONA,
            DEFAULT_NUDGE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl PromptBuilder {
    pub fn new(persona: impl Into<String>, nudge_keywords: Vec<String>) -> Self {
        Self {
            persona: persona.into(),
            nudge_keywords: nudge_keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn nudge_keywords(&self) -> &[String] {
        &self.nudge_keywords
    }

    /// System prompt: persona, tool catalog, and the JSON call contract
    pub fn system_prompt(&self, catalog: &[ToolDescriptor]) -> String {
        format!(
            "{}\n\nAvailable MCP tools:\n{}\n\n{}",
            self.persona,
            render_catalog(catalog),
            TOOL_CALL_INSTRUCTIONS
        )
    }

    /// Case-insensitive substring match against the keyword set
    pub fn wants_nudge(&self, user_text: &str) -> bool {
        let lowered = user_text.to_lowercase();
        self.nudge_keywords.iter().any(|k| lowered.contains(k.as_str()))
    }

    /// system → history turns → current user turn → optional nudge
    pub fn build(
        &self,
        user_text: &str,
        catalog: &[ToolDescriptor],
        history: &ConversationHistory,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(ChatMessage::system(self.system_prompt(catalog)));
        messages.extend(history.as_messages());
        messages.push(ChatMessage::user(user_text));
        if self.wants_nudge(user_text) {
            messages.push(ChatMessage::system(NUDGE));
        }
        messages
    }
}

/// Schemas are embedded as-is
fn render_catalog(catalog: &[ToolDescriptor]) -> String {
    if catalog.is_empty() {
        return "(none)".to_string();
    }
    let tools: Vec<_> = catalog
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.input_schema,
                "provider": t.provider,
            })
        })
        .collect();
    serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
}
