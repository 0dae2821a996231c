//! Bounded conversation history.
//!
//! Keeps a sliding window of recent turns for prompt building.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{ChatMessage, Role};

/// Default number of entries retained per session
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryRole {
    User,
    Assistant,
}

/// Record of a tool used to produce an assistant entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUsage {
    pub tool_name: String,
    pub parameters: Value,
    pub succeeded: bool,
}

/// A single turn in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: EntryRole,
    pub text: String,
    pub tool: Option<ToolUsage>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: EntryRole::User,
            text: text.into(),
            tool: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>, tool: Option<ToolUsage>) -> Self {
        Self {
            role: EntryRole::Assistant,
            text: text.into(),
            tool,
            timestamp: Utc::now(),
        }
    }

    pub fn to_message(&self) -> ChatMessage {
        let role = match self.role {
            EntryRole::User => Role::User,
            EntryRole::Assistant => Role::Assistant,
        };
        ChatMessage::new(role, self.text.clone())
    }
}

/// Oldest-first sliding window of conversation entries
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    max_entries: usize,
    entries: VecDeque<ConversationEntry>,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ConversationHistory {
    /// A zero limit is bumped to one so the latest turn is always kept
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            max_entries,
            entries: VecDeque::with_capacity(max_entries),
        }
    }

    /// Append, evicting the oldest entries beyond the limit
    pub fn push(&mut self, entry: ConversationEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(ConversationEntry::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>, tool: Option<ToolUsage>) {
        self.push(ConversationEntry::assistant(text, tool));
    }

    /// The last `n` entries, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &ConversationEntry> {
        self.entries.iter().skip(self.entries.len().saturating_sub(n))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationEntry> {
        self.entries.iter()
    }

    /// Every retained entry as chat messages
    pub fn as_messages(&self) -> Vec<ChatMessage> {
        self.entries.iter().map(ConversationEntry::to_message).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
