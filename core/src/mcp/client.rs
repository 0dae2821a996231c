/// MCP Client implementation
///
/// Talks JSON-RPC 2.0 to a single MCP server, either over a child process's
/// stdin/stdout or over a streamable HTTP endpoint.
use super::types::*;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::tools::ToolProvider;

type PendingMap = Arc<StdMutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

fn lock_pending(
    pending: &PendingMap,
) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<JsonRpcResponse>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drops a stdio request's pending entry when its waiter goes away, whether it
/// got a reply, timed out, or was cancelled by an outer timeout.
struct PendingSlot {
    pending: PendingMap,
    id: u64,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        lock_pending(&self.pending).remove(&self.id);
    }
}

/// Live connection to the server
enum Channel {
    Stdio(StdioChannel),
    Http(HttpChannel),
}

struct StdioChannel {
    child: Child,
    stdin: ChildStdin,
}

impl StdioChannel {
    async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), McpError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await.map_err(|e| {
            error!(target: "mcp_client", error = %e, "Failed to write request");
            McpError::Io(e)
        })?;
        self.stdin.flush().await.map_err(McpError::Io)
    }
}

#[derive(Clone)]
struct HttpChannel {
    http: reqwest::Client,
    endpoint: String,
    headers: HashMap<String, String>,
    session_id: Arc<Mutex<Option<String>>>,
}

impl HttpChannel {
    /// POST one JSON-RPC message; `None` when the server accepted without a body
    async fn post<T: Serialize>(
        &self,
        message: &T,
        expect_id: Option<u64>,
    ) -> Result<Option<JsonRpcResponse>, McpError> {
        let mut req = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header("accept", "application/json, text/event-stream");
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(sid) = self.session_id.lock().await.clone() {
            req = req.header("mcp-session-id", sid);
        }

        let resp = req
            .json(message)
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("HTTP request failed: {e}")))?;

        if let Some(sid) = resp
            .headers()
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().await = Some(sid.to_string());
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!(
                "HTTP status {}: {}",
                status, body
            )));
        }

        let is_sse = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);
        let body = resp
            .text()
            .await
            .map_err(|e| McpError::Transport(format!("Failed to read HTTP body: {e}")))?;

        if body.trim().is_empty() || expect_id.is_none() {
            return Ok(None);
        }
        if is_sse {
            Ok(parse_sse_response(&body, expect_id))
        } else {
            Ok(Some(serde_json::from_str(&body)?))
        }
    }
}

/// Pull the reply for `expect_id` out of an SSE body
pub fn parse_sse_response(body: &str, expect_id: Option<u64>) -> Option<JsonRpcResponse> {
    let mut data = String::new();
    let mut events = Vec::new();
    for line in body.lines() {
        if line.is_empty() {
            if !data.is_empty() {
                events.push(std::mem::take(&mut data));
            }
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        }
    }
    if !data.is_empty() {
        events.push(data);
    }

    events
        .iter()
        .filter_map(|ev| serde_json::from_str::<JsonRpcResponse>(ev).ok())
        .filter(|r| r.is_reply())
        .find(|r| expect_id.is_none() || r.id.as_u64() == expect_id)
}

/// Where a request is waiting for its reply
enum InFlight {
    Stdio(oneshot::Receiver<JsonRpcResponse>, PendingSlot),
    Http(HttpChannel),
}

/// MCP client for communicating with a single MCP server
pub struct McpClient {
    config: McpServerConfig,
    channel: Mutex<Option<Channel>>,
    request_id: AtomicU64,
    /// Pending stdio requests: request_id -> response channel
    pending: PendingMap,
    server_info: Mutex<Option<ServerInfo>>,
}

impl McpClient {
    pub fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            channel: Mutex::new(None),
            request_id: AtomicU64::new(1),
            pending: Arc::new(StdMutex::new(HashMap::new())),
            server_info: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &McpServerConfig {
        &self.config
    }

    /// Open the transport and run the initialize handshake
    pub async fn connect(&self) -> Result<(), McpError> {
        self.config
            .validate_protocol_version()
            .map_err(McpError::Protocol)?;
        let transport = self.config.transport()?;

        info!(
            target: "mcp_client",
            server = %self.config.name,
            transport = ?transport,
            protocol_version = %self.config.protocol_version(),
            "Connecting to MCP server"
        );

        let channel = match transport {
            McpTransport::Stdio => Channel::Stdio(self.spawn_stdio()?),
            McpTransport::Http => Channel::Http(self.open_http()?),
        };
        *self.channel.lock().await = Some(channel);

        let init = match self.initialize().await {
            Ok(init) => init,
            Err(e) => {
                let _ = self.disconnect().await;
                return Err(e);
            }
        };
        self.notify("notifications/initialized", None).await?;

        info!(
            target: "mcp_client",
            server = %self.config.name,
            server_name = %init.server_info.name,
            server_version = %init.server_info.version,
            negotiated_version = %init.protocol_version,
            "MCP server connected and initialized"
        );
        *self.server_info.lock().await = Some(init.server_info);

        Ok(())
    }

    /// Close the transport; a stdio server process is killed
    pub async fn disconnect(&self) -> Result<(), McpError> {
        info!(target: "mcp_client", server = %self.config.name, "Disconnecting from MCP server");

        let channel = self.channel.lock().await.take();
        if let Some(Channel::Stdio(mut stdio)) = channel {
            let _ = stdio.stdin.shutdown().await;
            let _ = stdio.child.kill().await;
            let _ = stdio.child.wait().await;
        }
        // Wake anyone still waiting on a reply
        lock_pending(&self.pending).clear();

        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.channel.lock().await.is_some()
    }

    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.lock().await.clone()
    }

    fn spawn_stdio(&self) -> Result<StdioChannel, McpError> {
        let command = self.config.command.as_deref().unwrap_or_default();
        let mut cmd = Command::new(command);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref env) = self.config.env {
            for (key, val) in env {
                cmd.env(key, val);
            }
        }
        if let Some(ref cwd) = self.config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            error!(target: "mcp_client", server = %self.config.name, error = %e, "Failed to spawn MCP server process");
            McpError::Transport(format!("Failed to spawn process: {}", e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("Failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("Failed to capture stdout".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            self.spawn_stderr_logger(stderr);
        }
        self.spawn_reader(stdout);

        Ok(StdioChannel { child, stdin })
    }

    fn open_http(&self) -> Result<HttpChannel, McpError> {
        let endpoint = self.config.url.clone().unwrap_or_default();
        let http = reqwest::Client::builder()
            .timeout(self.config.request_timeout())
            .build()
            .map_err(|e| McpError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(HttpChannel {
            http,
            endpoint,
            headers: self.config.headers.clone().unwrap_or_default(),
            session_id: Arc::new(Mutex::new(None)),
        })
    }

    async fn initialize(&self) -> Result<InitializeResult, McpError> {
        let params = InitializeParams {
            protocol_version: self.config.protocol_version().to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo {
                name: "parley".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let result = self.send_request("initialize", Some(json!(params))).await?;

        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("Invalid initialize result: {}", e)))
    }

    /// List available tools, following pagination cursors
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        debug!(target: "mcp_client", server = %self.config.name, "Listing tools");

        let mut all_tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = ListToolsParams { cursor };
            let result = self.send_request("tools/list", Some(json!(params))).await?;

            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| McpError::Protocol(format!("Invalid tools/list result: {}", e)))?;

            all_tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!(
            target: "mcp_client",
            server = %self.config.name,
            count = all_tools.len(),
            "Listed tools"
        );

        Ok(all_tools)
    }

    /// Call a tool and return the raw structured result
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, McpError> {
        debug!(target: "mcp_client", server = %self.config.name, tool = %name, "Calling tool");

        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        let result = self.send_request("tools/call", Some(json!(params))).await?;

        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("Invalid tools/call result: {}", e)))
    }

    /// Send a JSON-RPC request and wait for its reply
    async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let limit = self.config.request_timeout();

        let in_flight = {
            let mut guard = self.channel.lock().await;
            match guard.as_mut() {
                None => return Err(McpError::NotConnected(self.config.name.clone())),
                Some(Channel::Http(http)) => InFlight::Http(http.clone()),
                Some(Channel::Stdio(stdio)) => {
                    let (tx, rx) = oneshot::channel();
                    lock_pending(&self.pending).insert(id, tx);
                    let slot = PendingSlot {
                        pending: Arc::clone(&self.pending),
                        id,
                    };
                    stdio.write_message(&request).await?;
                    InFlight::Stdio(rx, slot)
                }
            }
        };

        let response = match in_flight {
            InFlight::Stdio(rx, _slot) => match timeout(limit, rx).await {
                Ok(Ok(resp)) => resp,
                Ok(Err(_)) => {
                    return Err(McpError::Transport("Response channel closed".to_string()))
                }
                Err(_) => {
                    warn!(target: "mcp_client", server = %self.config.name, method = %method, "Request timeout");
                    return Err(McpError::Timeout(limit));
                }
            },
            InFlight::Http(http) => match timeout(limit, http.post(&request, Some(id))).await {
                Ok(res) => res?.ok_or_else(|| {
                    McpError::Protocol(format!("No reply to '{}' in HTTP response", method))
                })?,
                Err(_) => {
                    warn!(target: "mcp_client", server = %self.config.name, method = %method, "Request timeout");
                    return Err(McpError::Timeout(limit));
                }
            },
        };

        if let Some(error) = response.error {
            return Err(McpError::ServerError(format!(
                "{} (code: {})",
                error.message, error.code
            )));
        }

        response
            .result
            .ok_or_else(|| McpError::Protocol("Missing result in response".to_string()))
    }

    /// Fire-and-forget JSON-RPC notification
    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let note = JsonRpcNotification::new(method, params);
        let http = {
            let mut guard = self.channel.lock().await;
            match guard.as_mut() {
                None => return Err(McpError::NotConnected(self.config.name.clone())),
                Some(Channel::Stdio(stdio)) => return stdio.write_message(&note).await,
                Some(Channel::Http(http)) => http.clone(),
            }
        };
        http.post(&note, None).await.map(|_| ())
    }

    /// Route stdout replies to their pending requests
    fn spawn_reader(&self, stdout: ChildStdout) {
        let pending = Arc::clone(&self.pending);
        let server_name = self.config.name.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<JsonRpcResponse>(&line) {
                    Ok(response) if response.is_reply() => {
                        let Some(id) = response.id.as_u64() else {
                            warn!(target: "mcp_client", server = %server_name, "Reply with non-numeric id");
                            continue;
                        };
                        let waiter = lock_pending(&pending).remove(&id);
                        if let Some(tx) = waiter {
                            let _ = tx.send(response);
                        } else {
                            warn!(
                                target: "mcp_client",
                                server = %server_name,
                                id = id,
                                "Received response for unknown request"
                            );
                        }
                    }
                    Ok(_) => {
                        debug!(target: "mcp_client", server = %server_name, "Ignoring server-initiated request");
                    }
                    Err(_) => {
                        // Notifications and log lines have no id
                        debug!(target: "mcp_client", server = %server_name, line = %line, "Ignoring non-reply message");
                    }
                }
            }

            // Server is gone; fail whoever is still waiting
            lock_pending(&pending).clear();
            debug!(target: "mcp_client", server = %server_name, "Stdout reader exited");
        });
    }

    fn spawn_stderr_logger(&self, stderr: ChildStderr) {
        let server_name = self.config.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "mcp_client", server = %server_name, stderr = %line);
            }
        });
    }
}

#[async_trait]
impl ToolProvider for McpClient {
    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        McpClient::list_tools(self).await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, McpError> {
        McpClient::call_tool(self, name, arguments).await
    }

    async fn shutdown(&self) {
        if let Err(e) = self.disconnect().await {
            warn!(target: "mcp_client", server = %self.config.name, error = %e, "Disconnect failed");
        }
    }
}
