//! Conversation orchestration
//!
//! - `history`: bounded per-session conversation window
//! - `prompt`: first-pass prompt assembly with tool catalog and keyword nudge
//! - `parser`: strict JSON tool-call detection
//! - `synthesizer`: narration of tool output and the tool-free fallback
//! - `orchestrator`: the per-message state machine
//! - `reply`: what the host receives

pub mod history;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod reply;
pub mod synthesizer;

pub use history::{ConversationEntry, ConversationHistory, EntryRole, ToolUsage};
pub use orchestrator::{Orchestrator, OrchestratorOptions, OrchestratorStats, TurnOutcome, TurnPath};
pub use parser::parse_tool_call;
pub use prompt::PromptBuilder;
pub use reply::{Reply, ReplyKind, ReplySink, VecSink};
pub use synthesizer::ResponseSynthesizer;
