mod config;
mod sink;
use config::ChatAgentConfig;
use sink::TerminalSink;
use parley_core::mcp::{McpClient, McpError, McpServerConfig};
use parley_core::telemetry::{init_tracing, DEFAULT_FILTER};
use parley_core::{ChatModel, LlmClient, Orchestrator, SessionStore, ToolRegistry};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

/// The terminal host serves a single conversation
const SESSION_ID: &str = "local";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env first so tracing and config both see it
    let _ = dotenvy::dotenv();
    init_tracing(DEFAULT_FILTER);

    info!(target: "chat_agent", "Starting chat agent: stdin → LLM + MCP tools → stdout");

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = ChatAgentConfig::load();

    let model: Arc<dyn ChatModel> = Arc::new(LlmClient::new(cfg.llm.clone())?);
    info!(target: "chat_agent", model = %cfg.llm.model, url = %cfg.llm.chat_url(), "LLM client ready");
    let orchestrator = Orchestrator::new(model, cfg.orchestrator.clone());

    let store = SessionStore::new(cfg.history_limit);
    let session = store.get_or_create(SESSION_ID);
    let registry = session.lock().await.registry.clone();

    for server in &cfg.servers {
        if let Err(e) = connect_server(&registry, server).await {
            warn!(target: "chat_agent", server = %server.name, code = e.code(), error = %e, "Skipping MCP server");
        }
    }

    let sink = TerminalSink;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_prompt();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = signal::ctrl_c() => {
                info!(target: "chat_agent", "Interrupted");
                break;
            }
        };
        let Some(line) = line else { break };

        match Command::parse(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Tools => {
                let catalog = registry.catalog().await;
                if catalog.is_empty() {
                    println!("(no tools connected)");
                }
                for tool in catalog {
                    println!("- {} [{}] {}", tool.name, tool.provider, tool.description);
                    println!("    schema: {}", tool.input_schema);
                }
            }
            Command::Servers => {
                let connected = registry.provider_ids().await;
                for server in &cfg.servers {
                    let state = if connected.contains(&server.name) { "connected" } else { "disconnected" };
                    println!("- {} ({})", server.name, state);
                }
            }
            Command::Connect(name) => match cfg.server(&name) {
                Some(server) => match connect_server(&registry, server).await {
                    Ok(count) => println!("Connected '{}' ({} tools)", name, count),
                    Err(e) => println!("Failed to connect '{}': {}", name, e),
                },
                None => println!("No server named '{}' in config", name),
            },
            Command::Disconnect(name) => {
                if registry.disconnect(&name).await {
                    println!("Disconnected '{}'", name);
                } else {
                    println!("'{}' is not connected", name);
                }
            }
            Command::History => {
                let session = session.lock().await;
                for entry in session.history.iter() {
                    let tool = entry
                        .tool
                        .as_ref()
                        .map(|t| format!(" [{}]", t.tool_name))
                        .unwrap_or_default();
                    println!("{:?}{}: {}", entry.role, tool, entry.text);
                }
            }
            Command::Message(text) => {
                let mut session = session.lock().await;
                if let Err(e) = orchestrator.handle_message(&mut session, &text, &sink).await {
                    error!(target: "chat_agent", error = %e, "Turn failed");
                }
            }
        }
        print_prompt();
    }

    info!(
        target: "chat_agent",
        stats = %serde_json::to_string(&orchestrator.stats()).unwrap_or_default(),
        "Shutting down..."
    );
    store.remove(SESSION_ID).await;
    Ok(())
}

/// Start one MCP server and register its tools (connect hook)
async fn connect_server(registry: &ToolRegistry, server: &McpServerConfig) -> Result<usize, McpError> {
    let client = Arc::new(McpClient::new(server.clone()));
    client.connect().await?;
    match registry.connect(server.name.clone(), client.clone()).await {
        Ok(count) => Ok(count),
        Err(e) => {
            client.disconnect().await.ok();
            Err(e)
        }
    }
}

fn print_prompt() {
    print!("> ");
    std::io::stdout().flush().ok();
}

/// One stdin line
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Empty,
    Quit,
    Tools,
    Servers,
    History,
    Connect(String),
    Disconnect(String),
    Message(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let head = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).unwrap_or_default().to_string();
        match head {
            "/quit" | "/exit" => Command::Quit,
            "/tools" => Command::Tools,
            "/servers" => Command::Servers,
            "/history" => Command::History,
            "/connect" if !arg.is_empty() => Command::Connect(arg),
            "/disconnect" if !arg.is_empty() => Command::Disconnect(arg),
            _ => Command::Message(line.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("  "), Command::Empty);
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(Command::parse("/tools"), Command::Tools);
        assert_eq!(Command::parse("/connect gcnotify "), Command::Connect("gcnotify".into()));
        assert_eq!(Command::parse("/disconnect  gcnotify"), Command::Disconnect("gcnotify".into()));
    }

    #[test]
    fn anything_else_is_a_message() {
        assert_eq!(Command::parse("hello"), Command::Message("hello".into()));
        // Missing argument falls through to the model
        assert_eq!(Command::parse("/connect"), Command::Message("/connect".into()));
    }
}
