use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Span};

use super::history::ToolUsage;
use super::parser::parse_tool_call;
use super::prompt::{PromptBuilder, DEFAULT_NUDGE_KEYWORDS, DEFAULT_PERSONA};
use super::reply::{Reply, ReplySink};
use super::synthesizer::{ResponseSynthesizer, DEFAULT_SYNTHESIS_CONTEXT};
use crate::llm::{ChatModel, CompletionOptions};
use crate::session::Session;
use crate::tools::{ToolDescriptor, ToolDispatcher, ToolInvocationRequest, DEFAULT_TOOL_TIMEOUT};
use crate::Result;

/// Knobs for one orchestrator instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorOptions {
    pub tool_timeout_ms: u64,
    pub synthesis_context: usize,
    pub persona: String,
    pub nudge_keywords: Vec<String>,
    pub first_pass: CompletionOptions,
    pub synthesis: CompletionOptions,
    pub fallback: CompletionOptions,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT.as_millis() as u64,
            synthesis_context: DEFAULT_SYNTHESIS_CONTEXT,
            persona: DEFAULT_PERSONA.to_string(),
            nudge_keywords: DEFAULT_NUDGE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            first_pass: CompletionOptions::first_pass(),
            synthesis: CompletionOptions::synthesis(),
            fallback: CompletionOptions::fallback(),
        }
    }
}

/// Which terminal state a turn reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPath {
    /// The first inference was relayed verbatim
    Direct,
    /// A tool ran and its output was narrated
    Synthesized,
    /// Something failed; the answer came from the tool-free call
    Fallback,
}

impl TurnPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnPath::Direct => "direct",
            TurnPath::Synthesized => "synthesized",
            TurnPath::Fallback => "fallback",
        }
    }
}

/// Result of handling one user message
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub path: TurnPath,
    pub tool: Option<ToolUsage>,
    /// Failure that pushed the turn onto the fallback path
    pub error: Option<String>,
}

/// Lightweight in-orchestrator counters for observability
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub turns: u64,
    pub direct_replies: u64,
    pub tool_calls: u64,
    pub tool_failures: u64,
    pub fallbacks: u64,
    pub inference_errors: u64,
}

#[derive(Default)]
struct Counters {
    turns: AtomicU64,
    direct_replies: AtomicU64,
    tool_calls: AtomicU64,
    tool_failures: AtomicU64,
    fallbacks: AtomicU64,
    inference_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> OrchestratorStats {
        OrchestratorStats {
            turns: self.turns.load(Ordering::Relaxed),
            direct_replies: self.direct_replies.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            tool_failures: self.tool_failures.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
        }
    }
}

/// Drives one message through prompt → inference → optional tool → reply.
///
/// Stateless across sessions: everything turn-scoped lives in the `Session`
/// passed to `handle_message`, so one orchestrator serves every session.
pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    prompts: PromptBuilder,
    dispatcher: ToolDispatcher,
    synthesizer: ResponseSynthesizer,
    first_pass: CompletionOptions,
    counters: Counters,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn ChatModel>, options: OrchestratorOptions) -> Self {
        let synthesizer = ResponseSynthesizer::new(Arc::clone(&model), options.synthesis_context)
            .with_options(options.synthesis, options.fallback);
        Self {
            prompts: PromptBuilder::new(options.persona, options.nudge_keywords),
            dispatcher: ToolDispatcher::new(Duration::from_millis(options.tool_timeout_ms)),
            synthesizer,
            first_pass: options.first_pass,
            counters: Counters::default(),
            model,
        }
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.counters.snapshot()
    }

    /// Handle one user message end to end.
    ///
    /// Exactly one `Answer` reply is sent per call; the tool path may also send a
    /// "calling tool" notice and an error notice before it. Inference and tool
    /// failures never escape: only a failing `ReplySink` yields `Err`.
    #[tracing::instrument(name = "orchestrator.turn", skip_all, fields(session = %session.id, path))]
    pub async fn handle_message(
        &self,
        session: &mut Session,
        text: &str,
        sink: &dyn ReplySink,
    ) -> Result<TurnOutcome> {
        let started = Instant::now();
        Counters::bump(&self.counters.turns);
        debug!(target: "orchestrator", state = "received", chars = text.len());

        let catalog = session.registry.catalog().await;
        debug!(target: "orchestrator", state = "catalog-fetched", tools = catalog.len());

        let messages = self.prompts.build(text, &catalog, &session.history);
        let first = self.model.complete(&messages, &self.first_pass).await;
        debug!(target: "orchestrator", state = "first-inference", ok = first.is_ok());

        let outcome = match first {
            Err(e) => {
                Counters::bump(&self.counters.inference_errors);
                warn!(target: "orchestrator", error = %e, "First inference failed");
                sink.send(Reply::error(format!(
                    "I couldn't get an answer from the language model: {}. Let me try to help you in another way.",
                    e
                )))
                .await?;
                self.fallback_turn(text, None, e.to_string()).await
            }
            Ok(resp) => match parse_tool_call(&resp.text) {
                None => {
                    Counters::bump(&self.counters.direct_replies);
                    TurnOutcome {
                        reply: resp.text,
                        path: TurnPath::Direct,
                        tool: None,
                        error: None,
                    }
                }
                Some(request) => self.tool_turn(session, &catalog, text, request, sink).await?,
            },
        };

        sink.send(Reply::answer(outcome.reply.clone())).await?;

        session.history.push_user(text);
        session
            .history
            .push_assistant(outcome.reply.clone(), outcome.tool.clone());

        Span::current().record("path", outcome.path.as_str());
        info!(
            target: "orchestrator",
            path = outcome.path.as_str(),
            tool = outcome.tool.as_ref().map(|t| t.tool_name.as_str()).unwrap_or("-"),
            latency_ms = started.elapsed().as_millis() as u64,
            "Turn complete"
        );
        Ok(outcome)
    }

    /// tool-dispatch → synthesis-reply | fallback-reply
    async fn tool_turn(
        &self,
        session: &Session,
        catalog: &[ToolDescriptor],
        text: &str,
        request: ToolInvocationRequest,
        sink: &dyn ReplySink,
    ) -> Result<TurnOutcome> {
        Counters::bump(&self.counters.tool_calls);
        let tool_name = request.tool_name.clone();
        info!(target: "orchestrator", state = "tool-dispatch", tool = %tool_name);

        sink.send(Reply::notice(format!("🔄 Calling tool `{}`...", tool_name)))
            .await?;

        let attempt: Result<String> = async {
            let output = self
                .dispatcher
                .dispatch(&session.registry, catalog, &request)
                .await?;
            self.synthesizer
                .synthesize(text, &tool_name, &output.text, &session.history)
                .await
        }
        .await;

        match attempt {
            Ok(reply) => Ok(TurnOutcome {
                reply,
                path: TurnPath::Synthesized,
                tool: Some(ToolUsage {
                    tool_name,
                    parameters: request.parameters,
                    succeeded: true,
                }),
                error: None,
            }),
            Err(e) => {
                Counters::bump(&self.counters.tool_failures);
                warn!(target: "orchestrator", tool = %tool_name, code = e.code(), error = %e, "Tool path failed");
                sink.send(Reply::error(format!(
                    "I encountered an error while using the {} tool: {}. Let me try to help you in another way.",
                    tool_name, e
                )))
                .await?;
                let usage = ToolUsage {
                    tool_name,
                    parameters: request.parameters,
                    succeeded: false,
                };
                Ok(self.fallback_turn(text, Some(usage), e.to_string()).await)
            }
        }
    }

    /// Third, tool-free call. Never fails: a failed fallback becomes an apology.
    async fn fallback_turn(
        &self,
        text: &str,
        tool: Option<ToolUsage>,
        reason: String,
    ) -> TurnOutcome {
        Counters::bump(&self.counters.fallbacks);
        let reply = match self.synthesizer.fallback(text).await {
            Ok(reply) => reply,
            Err(e) => {
                Counters::bump(&self.counters.inference_errors);
                warn!(target: "orchestrator", error = %e, "Fallback inference failed");
                format!(
                    "Sorry, I couldn't produce an answer right now ({}). Please try again later.",
                    e
                )
            }
        };
        TurnOutcome {
            reply,
            path: TurnPath::Fallback,
            tool,
            error: Some(reason),
        }
    }
}
