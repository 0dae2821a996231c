use async_trait::async_trait;
use mockall::mock;
use parley_core::conversation::{ReplyKind, VecSink};
use parley_core::llm::{ChatMessage, ChatModel, CompletionOptions, LlmResponse, Role};
use parley_core::mcp::{CallToolResult, McpError, McpTool};
use parley_core::{
    Orchestrator, OrchestratorOptions, ParleyError, Result, Session, ToolProvider, TurnPath,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays canned completions in order and records every prompt it saw
#[derive(Default)]
struct ScriptedModel {
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: Mutex<Vec<(Vec<ChatMessage>, CompletionOptions)>>,
}

impl ScriptedModel {
    fn new(script: Vec<std::result::Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(Vec<ChatMessage>, CompletionOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<LlmResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), *options));
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(LlmResponse::from_text(text)),
            Some(Err(e)) => Err(ParleyError::Inference(e)),
            None => Err(ParleyError::Inference("script exhausted".into())),
        }
    }
}

mock! {
    pub Provider {}

    #[async_trait]
    impl ToolProvider for Provider {
        async fn list_tools(&self) -> std::result::Result<Vec<McpTool>, McpError>;
        async fn call_tool(&self, name: &str, arguments: Value) -> std::result::Result<CallToolResult, McpError>;
    }
}

fn tool(name: &str) -> McpTool {
    McpTool {
        name: name.to_string(),
        description: Some(format!("{} tool", name)),
        input_schema: json!({"type": "object", "properties": {"service_id": {"type": "string"}}}),
    }
}

fn notify_provider(reply: &'static str) -> MockProvider {
    let mut provider = MockProvider::new();
    provider
        .expect_list_tools()
        .returning(|| Ok(vec![tool("gcnotify_list_templates")]));
    provider
        .expect_call_tool()
        .withf(|name, args| name == "gcnotify_list_templates" && args["service_id"] == "abc")
        .times(1)
        .returning(move |_, _| Ok(CallToolResult::text(reply)));
    provider
}

/// Plain async provider whose calls never finish in time
struct SlowProvider;

#[async_trait]
impl ToolProvider for SlowProvider {
    async fn list_tools(&self) -> std::result::Result<Vec<McpTool>, McpError> {
        Ok(vec![tool("slow_lookup")])
    }

    async fn call_tool(
        &self,
        _name: &str,
        _arguments: Value,
    ) -> std::result::Result<CallToolResult, McpError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(CallToolResult::text("too late"))
    }
}

const GCNOTIFY_CALL: &str =
    r#"{"tool_name": "gcnotify_list_templates", "parameters": {"service_id": "abc"}}"#;

#[tokio::test]
async fn direct_reply_for_plain_greeting() {
    let model = ScriptedModel::new(vec![Ok("Hi there! How can I help?")]);
    let orchestrator = Orchestrator::new(model.clone(), OrchestratorOptions::default());
    let mut session = Session::new("s1", 20);
    let sink = VecSink::new();

    let outcome = orchestrator
        .handle_message(&mut session, "hello", &sink)
        .await
        .unwrap();

    assert_eq!(outcome.path, TurnPath::Direct);
    assert_eq!(outcome.reply, "Hi there! How can I help?");
    assert!(outcome.tool.is_none());
    assert_eq!(sink.replies().await.len(), 1);
    assert_eq!(sink.answers().await, vec!["Hi there! How can I help?"]);

    let calls = model.calls();
    assert_eq!(calls.len(), 1);
    let (messages, options) = &calls[0];
    // No keyword, no nudge: system + user only
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::System);
    assert!(messages[0].content.contains("(none)"));
    assert_eq!(messages[1].content, "hello");
    assert_eq!(*options, CompletionOptions::first_pass());

    assert_eq!(session.history.len(), 2);
}

#[tokio::test]
async fn tool_call_is_dispatched_and_synthesized() {
    let model = ScriptedModel::new(vec![
        Ok(GCNOTIFY_CALL),
        Ok("You have two templates:\n- Welcome\n- Reminder"),
    ]);
    let orchestrator = Orchestrator::new(model.clone(), OrchestratorOptions::default());
    let mut session = Session::new("s1", 20);
    session
        .registry
        .connect("gcnotify", Arc::new(notify_provider("Welcome\nReminder")))
        .await
        .unwrap();
    let sink = VecSink::new();

    let outcome = orchestrator
        .handle_message(&mut session, "List my gcnotify templates for service abc", &sink)
        .await
        .unwrap();

    assert_eq!(outcome.path, TurnPath::Synthesized);
    let usage = outcome.tool.as_ref().unwrap();
    assert_eq!(usage.tool_name, "gcnotify_list_templates");
    assert!(usage.succeeded);

    let replies = sink.replies().await;
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].kind, ReplyKind::Notice);
    assert!(replies[0].text.contains("gcnotify_list_templates"));
    assert_eq!(replies[1].kind, ReplyKind::Answer);
    assert!(replies[1].text.contains("Reminder"));

    let calls = model.calls();
    assert_eq!(calls.len(), 2);

    // First pass carries the catalog and the keyword nudge
    let (first, _) = &calls[0];
    assert!(first[0].content.contains("gcnotify_list_templates"));
    assert_eq!(first.last().unwrap().role, Role::System);

    // Synthesis pass carries the raw tool output
    let (synthesis, options) = &calls[1];
    assert!(synthesis
        .iter()
        .any(|m| m.content == "Tool result: Welcome\nReminder"));
    assert_eq!(*options, CompletionOptions::synthesis());

    let last = session.history.iter().last().unwrap();
    assert_eq!(last.tool.as_ref().unwrap().parameters, json!({"service_id": "abc"}));
}

#[tokio::test]
async fn unknown_tool_falls_back() {
    let model = ScriptedModel::new(vec![
        Ok(r#"{"tool_name": "does_not_exist", "parameters": {}}"#),
        Ok("Here is what I know without tools."),
    ]);
    let orchestrator = Orchestrator::new(model.clone(), OrchestratorOptions::default());
    let mut session = Session::new("s1", 20);
    let sink = VecSink::new();

    let outcome = orchestrator
        .handle_message(&mut session, "search for it", &sink)
        .await
        .unwrap();

    assert_eq!(outcome.path, TurnPath::Fallback);
    assert!(outcome.error.as_deref().unwrap().contains("does_not_exist"));
    assert!(!outcome.tool.as_ref().unwrap().succeeded);

    let replies = sink.replies().await;
    let kinds: Vec<_> = replies.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![ReplyKind::Notice, ReplyKind::Error, ReplyKind::Answer]
    );
    assert!(replies[1]
        .text
        .starts_with("I encountered an error while using the does_not_exist tool"));
    assert_eq!(sink.answers().await, vec!["Here is what I know without tools."]);

    // Fallback is tool-free: fixed system prompt plus the bare question
    let calls = model.calls();
    let (fallback, options) = &calls[1];
    assert_eq!(fallback.len(), 2);
    assert_eq!(fallback[1].content, "search for it");
    assert!(!fallback[0].content.contains("Available MCP tools"));
    assert_eq!(*options, CompletionOptions::fallback());

    let stats = orchestrator.stats();
    assert_eq!(stats.tool_calls, 1);
    assert_eq!(stats.tool_failures, 1);
    assert_eq!(stats.fallbacks, 1);
}

#[tokio::test]
async fn slow_tool_times_out_and_falls_back() {
    let model = ScriptedModel::new(vec![
        Ok(r#"{"tool_name": "slow_lookup", "parameters": {"q": "x"}}"#),
        Ok("fallback answer"),
    ]);
    let options = OrchestratorOptions {
        tool_timeout_ms: 50,
        ..OrchestratorOptions::default()
    };
    let orchestrator = Orchestrator::new(model, options);
    let mut session = Session::new("s1", 20);
    session
        .registry
        .connect("slow", Arc::new(SlowProvider))
        .await
        .unwrap();
    let sink = VecSink::new();

    let outcome = orchestrator
        .handle_message(&mut session, "lookup x", &sink)
        .await
        .unwrap();

    assert_eq!(outcome.path, TurnPath::Fallback);
    assert!(outcome.error.as_deref().unwrap().contains("timed out"));
    assert_eq!(sink.answers().await, vec!["fallback answer"]);
}

#[tokio::test]
async fn tool_error_result_falls_back() {
    let model = ScriptedModel::new(vec![Ok(GCNOTIFY_CALL), Ok("fallback answer")]);
    let orchestrator = Orchestrator::new(model, OrchestratorOptions::default());
    let mut session = Session::new("s1", 20);

    let mut provider = MockProvider::new();
    provider
        .expect_list_tools()
        .returning(|| Ok(vec![tool("gcnotify_list_templates")]));
    provider.expect_call_tool().returning(|_, _| {
        Ok(CallToolResult {
            content: vec![],
            is_error: Some(true),
        })
    });
    session
        .registry
        .connect("gcnotify", Arc::new(provider))
        .await
        .unwrap();
    let sink = VecSink::new();

    let outcome = orchestrator
        .handle_message(&mut session, "gcnotify templates for abc", &sink)
        .await
        .unwrap();
    assert_eq!(outcome.path, TurnPath::Fallback);
    assert_eq!(sink.answers().await, vec!["fallback answer"]);
}

#[tokio::test]
async fn synthesis_failure_falls_back() {
    let model = ScriptedModel::new(vec![
        Ok(GCNOTIFY_CALL),
        Err("HTTP 500"),
        Ok("fallback answer"),
    ]);
    let orchestrator = Orchestrator::new(model.clone(), OrchestratorOptions::default());
    let mut session = Session::new("s1", 20);
    session
        .registry
        .connect("gcnotify", Arc::new(notify_provider("Welcome")))
        .await
        .unwrap();
    let sink = VecSink::new();

    let outcome = orchestrator
        .handle_message(&mut session, "gcnotify templates for abc", &sink)
        .await
        .unwrap();

    assert_eq!(outcome.path, TurnPath::Fallback);
    assert!(outcome.error.as_deref().unwrap().contains("HTTP 500"));
    assert_eq!(model.calls().len(), 3);
    assert_eq!(sink.answers().await, vec!["fallback answer"]);
}

#[tokio::test]
async fn first_inference_failure_uses_fallback() {
    let model = ScriptedModel::new(vec![Err("connection refused"), Ok("fallback answer")]);
    let orchestrator = Orchestrator::new(model, OrchestratorOptions::default());
    let mut session = Session::new("s1", 20);
    let sink = VecSink::new();

    let outcome = orchestrator
        .handle_message(&mut session, "hello", &sink)
        .await
        .unwrap();

    assert_eq!(outcome.path, TurnPath::Fallback);
    assert!(outcome.tool.is_none());
    let replies = sink.replies().await;
    assert_eq!(replies[0].kind, ReplyKind::Error);
    assert_eq!(sink.answers().await, vec!["fallback answer"]);
}

#[tokio::test]
async fn every_inference_failing_still_yields_one_answer() {
    let model = ScriptedModel::new(vec![Err("down"), Err("still down")]);
    let orchestrator = Orchestrator::new(model, OrchestratorOptions::default());
    let mut session = Session::new("s1", 20);
    let sink = VecSink::new();

    let outcome = orchestrator
        .handle_message(&mut session, "hello", &sink)
        .await
        .unwrap();

    assert_eq!(outcome.path, TurnPath::Fallback);
    let answers = sink.answers().await;
    assert_eq!(answers.len(), 1);
    assert!(answers[0].starts_with("Sorry"));
    assert!(answers[0].contains("still down"));
    assert_eq!(orchestrator.stats().inference_errors, 2);
}

#[tokio::test]
async fn history_is_replayed_and_capped() {
    let replies: Vec<std::result::Result<&str, &str>> = (0..4).map(|_| Ok("ok")).collect();
    let model = ScriptedModel::new(replies);
    let orchestrator = Orchestrator::new(model.clone(), OrchestratorOptions::default());
    let mut session = Session::new("s1", 4);
    let sink = VecSink::new();

    for i in 0..4 {
        orchestrator
            .handle_message(&mut session, &format!("message {}", i), &sink)
            .await
            .unwrap();
    }

    assert_eq!(session.history.len(), 4);
    let oldest = session.history.iter().next().unwrap();
    assert_eq!(oldest.text, "message 2");

    // Fourth prompt replayed the window as it stood before that turn
    let calls = model.calls();
    let (last, _) = calls.last().unwrap();
    assert_eq!(last.len(), 1 + 4 + 1);
    assert_eq!(last[1].content, "message 1");
    assert_eq!(last.last().unwrap().content, "message 3");
    assert_eq!(orchestrator.stats().turns, 4);
}

#[tokio::test]
async fn malformed_tool_json_is_treated_as_direct_text() {
    let text = "{'tool_name': 'gcnotify_list_templates'}";
    let model = ScriptedModel::new(vec![Ok(text)]);
    let orchestrator = Orchestrator::new(model, OrchestratorOptions::default());
    let mut session = Session::new("s1", 20);
    let sink = VecSink::new();

    let outcome = orchestrator
        .handle_message(&mut session, "hi", &sink)
        .await
        .unwrap();
    assert_eq!(outcome.path, TurnPath::Direct);
    assert_eq!(sink.answers().await, vec![text]);
}

#[tokio::test]
async fn gcnotify_services_example() {
    let model = ScriptedModel::new(vec![
        Ok(r#"{"tool_name": "gcnotify", "parameters": {"action": "list_services"}}"#),
        Ok("You have one service: Passport Renewals."),
    ]);
    let orchestrator = Orchestrator::new(model, OrchestratorOptions::default());
    let mut session = Session::new("s1", 20);

    let mut provider = MockProvider::new();
    provider
        .expect_list_tools()
        .returning(|| Ok(vec![tool("gcnotify")]));
    provider
        .expect_call_tool()
        .withf(|name, _| name == "gcnotify")
        .times(1)
        .returning(|_, _| Ok(CallToolResult::text("Passport Renewals")));
    session
        .registry
        .connect("notify-server", Arc::new(provider))
        .await
        .unwrap();
    let sink = VecSink::new();

    let outcome = orchestrator
        .handle_message(&mut session, "get gcnotify services", &sink)
        .await
        .unwrap();

    assert_eq!(outcome.path, TurnPath::Synthesized);
    assert_eq!(
        sink.answers().await,
        vec!["You have one service: Passport Renewals."]
    );
}
