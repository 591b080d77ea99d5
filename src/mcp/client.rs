//! Stdio MCP client.
//!
//! Spawns the server as a child process and speaks line-delimited JSON-RPC
//! over its stdin/stdout. One request is in flight at a time; notifications
//! emitted by the server between responses are skipped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::{McpError, McpServerConfig};

/// Protocol version this client advertises during `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Tool metadata reported by the server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct McpToolDescription {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

pub struct StdioMcpClient {
    config: McpServerConfig,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<tokio::process::ChildStdin>>,
    reader: Mutex<Option<BufReader<tokio::process::ChildStdout>>>,
    initialized: AtomicBool,
    request_id: AtomicU64,
}

impl StdioMcpClient {
    pub fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            reader: Mutex::new(None),
            initialized: AtomicBool::new(false),
            request_id: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Spawn the server process and run the initialize handshake.
    pub async fn start(&self) -> Result<(), McpError> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args);
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::null());

        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| McpError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(McpError::NotStarted)?;
        let stdout = child.stdout.take().ok_or(McpError::NotStarted)?;

        *self.child.lock().await = Some(child);
        *self.stdin.lock().await = Some(stdin);
        *self.reader.lock().await = Some(BufReader::new(stdout));

        self.initialize().await
    }

    async fn initialize(&self) -> Result<(), McpError> {
        let init_request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": self.next_id(),
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            }
        });

        let response = self.send_request(init_request).await?;
        tracing::info!(
            "MCP server '{}' initialized: {:?}",
            self.config.name,
            response.get("result").and_then(|r| r.get("serverInfo"))
        );

        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        });
        self.send_notification(notification).await?;

        self.initialized.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn send_notification(&self, notification: Value) -> Result<(), McpError> {
        let mut stdin = self.stdin.lock().await;
        let stdin = stdin.as_mut().ok_or(McpError::NotStarted)?;

        let msg = serde_json::to_string(&notification).map_err(|e| McpError::InvalidResponse {
            reason: format!("serialization failed: {}", e),
        })?;

        stdin.write_all(format!("{}\n", msg).as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn send_request(&self, request: Value) -> Result<Value, McpError> {
        {
            let mut stdin = self.stdin.lock().await;
            let stdin = stdin.as_mut().ok_or(McpError::NotStarted)?;

            let msg = serde_json::to_string(&request).map_err(|e| McpError::InvalidResponse {
                reason: format!("serialization failed: {}", e),
            })?;

            stdin.write_all(format!("{}\n", msg).as_bytes()).await?;
            stdin.flush().await?;
        }

        let mut reader = self.reader.lock().await;
        let reader = reader.as_mut().ok_or(McpError::NotStarted)?;

        let mut line = String::new();
        // Read lines until a JSON-RPC response arrives; the server may emit
        // notifications and blank lines in between.
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                return Err(McpError::ServerClosed);
            }

            if let Some(response) = parse_response_line(&line) {
                return Ok(response);
            }
        }
    }

    /// List available tools from the server.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDescription>, McpError> {
        if !self.initialized.load(Ordering::Relaxed) {
            return Err(McpError::NotInitialized);
        }

        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": self.next_id(),
            "method": "tools/list"
        });

        let response = self.send_request(request).await?;

        let tools = response
            .get("result")
            .and_then(|r| r.get("tools"))
            .and_then(|t| t.as_array())
            .ok_or_else(|| McpError::InvalidResponse {
                reason: "tools/list result missing 'tools' array".to_string(),
            })?;

        let mut descriptions = Vec::new();
        for tool in tools {
            match serde_json::from_value::<McpToolDescription>(tool.clone()) {
                Ok(desc) => descriptions.push(desc),
                Err(e) => tracing::warn!("Skipping malformed tool entry: {}", e),
            }
        }

        Ok(descriptions)
    }

    /// Call a tool on the server and return the raw `result` value.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value, McpError> {
        if !self.initialized.load(Ordering::Relaxed) {
            return Err(McpError::NotInitialized);
        }

        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": self.next_id(),
            "method": "tools/call",
            "params": {
                "name": tool_name,
                "arguments": arguments
            }
        });

        let response = self.send_request(request).await?;

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown MCP error");
            return Err(McpError::Server {
                message: message.to_string(),
            });
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| McpError::InvalidResponse {
                reason: "response has neither 'result' nor 'error'".to_string(),
            })
    }

    /// Kill the server process. Idempotent.
    pub async fn stop(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
        self.initialized.store(false, Ordering::Relaxed);
    }
}

/// Parse one stdout line; returns the value only for JSON-RPC responses
/// (anything carrying an `id`). Notifications and noise yield `None`.
fn parse_response_line(line: &str) -> Option<Value> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    if value.get("id").is_some() {
        Some(value)
    } else {
        None
    }
}

/// Concatenate the `text` entries of an MCP tool result's `content` array.
/// Falls back to the raw JSON when the result carries no text blocks.
pub fn extract_text(result: &Value) -> String {
    if let Some(content) = result.get("content").and_then(|v| v.as_array()) {
        let mut out = String::new();
        for item in content {
            if item.get("type").and_then(|v| v.as_str()) == Some("text") {
                if let Some(text) = item.get("text").and_then(|v| v.as_str()) {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
            }
        }
        if !out.is_empty() {
            return out;
        }
    }
    result.to_string()
}
