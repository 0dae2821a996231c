use std::sync::Arc;

use tracing::debug;

use super::history::ConversationHistory;
use crate::llm::{ChatMessage, ChatModel, CompletionOptions};
use crate::Result;

/// History entries given to the synthesis call as context
pub const DEFAULT_SYNTHESIS_CONTEXT: usize = 5;

const SYNTHESIS_SYSTEM: &str = "You are a helpful AI assistant. A tool was just executed to help answer the user's question. \
Read the tool result and write a natural, well-formatted response that directly addresses the user's original question. \
Present ALL of the information in the tool result faithfully: do not drop, summarize away, or invent items. \
Format lists with bullet points or numbering when appropriate.";

const FALLBACK_SYSTEM: &str = "You are a helpful AI assistant. \
Answer the user's question to the best of your ability without using external tools.";

/// Second and third inference calls: narrate a tool result, or answer without tools
pub struct ResponseSynthesizer {
    model: Arc<dyn ChatModel>,
    context_entries: usize,
    synthesis_options: CompletionOptions,
    fallback_options: CompletionOptions,
}

impl ResponseSynthesizer {
    pub fn new(model: Arc<dyn ChatModel>, context_entries: usize) -> Self {
        Self {
            model,
            context_entries,
            synthesis_options: CompletionOptions::synthesis(),
            fallback_options: CompletionOptions::fallback(),
        }
    }

    pub fn with_options(mut self, synthesis: CompletionOptions, fallback: CompletionOptions) -> Self {
        self.synthesis_options = synthesis;
        self.fallback_options = fallback;
        self
    }

    /// Messages for the synthesis call
    pub fn synthesis_messages(
        &self,
        user_text: &str,
        tool_name: &str,
        tool_text: &str,
        history: &ConversationHistory,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(SYNTHESIS_SYSTEM)];
        messages.extend(history.recent(self.context_entries).map(|e| e.to_message()));
        messages.push(ChatMessage::user(format!("Original question: {}", user_text)));
        messages.push(ChatMessage::assistant(format!(
            "I'll help you with that. Let me use the {} tool.",
            tool_name
        )));
        messages.push(ChatMessage::user(format!("Tool result: {}", tool_text)));
        messages.push(ChatMessage::user(
            "Please provide a natural, well-formatted response based on this tool result, \
             keeping every item it contains.",
        ));
        messages
    }

    pub async fn synthesize(
        &self,
        user_text: &str,
        tool_name: &str,
        tool_text: &str,
        history: &ConversationHistory,
    ) -> Result<String> {
        let messages = self.synthesis_messages(user_text, tool_name, tool_text, history);
        debug!(target: "orchestrator", tool = %tool_name, messages = messages.len(), "Synthesis call");
        let resp = self
            .model
            .complete(&messages, &self.synthesis_options)
            .await?;
        Ok(resp.text)
    }

    /// Messages for the tool-free fallback call
    pub fn fallback_messages(&self, user_text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(FALLBACK_SYSTEM),
            ChatMessage::user(user_text),
        ]
    }

    pub async fn fallback(&self, user_text: &str) -> Result<String> {
        debug!(target: "orchestrator", "Fallback call");
        let resp = self
            .model
            .complete(&self.fallback_messages(user_text), &self.fallback_options)
            .await?;
        Ok(resp.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, Role};
    use async_trait::async_trait;

    struct Unused;

    #[async_trait]
    impl ChatModel for Unused {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<LlmResponse> {
            Ok(LlmResponse::from_text("unused"))
        }
    }

    #[test]
    fn synthesis_uses_last_five_entries() {
        let synth = ResponseSynthesizer::new(Arc::new(Unused), DEFAULT_SYNTHESIS_CONTEXT);
        let mut history = ConversationHistory::default();
        for i in 0..8 {
            history.push_user(format!("q{}", i));
        }

        let msgs = synth.synthesis_messages("get gcnotify services", "gcnotify", "svc-a\nsvc-b", &history);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[0].content.contains("do not drop"));
        assert_eq!(msgs[1].content, "q3");
        assert_eq!(msgs[5].content, "q7");
        assert_eq!(msgs[6].content, "Original question: get gcnotify services");
        assert!(msgs[7].content.contains("gcnotify tool"));
        assert_eq!(msgs[8].content, "Tool result: svc-a\nsvc-b");
        assert_eq!(msgs.len(), 10);
    }

    #[test]
    fn fallback_is_tool_free() {
        let synth = ResponseSynthesizer::new(Arc::new(Unused), DEFAULT_SYNTHESIS_CONTEXT);
        let msgs = synth.fallback_messages("what is notify?");
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].content.contains("without using external tools"));
        assert_eq!(msgs[1], ChatMessage::user("what is notify?"));
    }
}
