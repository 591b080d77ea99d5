//! MCP client
//!
//! JSON-RPC 2.0 over stdio against the spawned Outlook server process.

pub mod client;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use client::{extract_text, McpToolDescription, StdioMcpClient};

#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn MCP server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("MCP server not started")]
    NotStarted,
    #[error("MCP server not initialized")]
    NotInitialized,
    #[error("MCP server closed the connection")]
    ServerClosed,
    #[error("MCP server error: {message}")]
    Server { message: String },
    #[error("invalid MCP response: {reason}")]
    InvalidResponse { reason: String },
    #[error("MCP io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the MCP server child process.
#[derive(Clone, Debug)]
pub struct McpServerConfig {
    /// Display name used in logs.
    pub name: String,
    /// Program to execute.
    pub command: String,
    /// Arguments, typically the server script path.
    pub args: Vec<String>,
    /// Extra environment for the child process.
    pub env: HashMap<String, String>,
}

impl McpServerConfig {
    /// Build a config for a server script, inferring the interpreter from
    /// the extension: `.py` runs under `python3`, `.js`/`.mjs` under `node`,
    /// anything else is executed directly.
    pub fn for_script(script: &Path, env: HashMap<String, String>) -> Self {
        let script_str = script.to_string_lossy().to_string();
        let name = script
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "outlook-mcp".to_string());

        let (command, args) = match script.extension().and_then(|e| e.to_str()) {
            Some("py") => ("python3".to_string(), vec![script_str]),
            Some("js") | Some("mjs") => ("node".to_string(), vec![script_str]),
            _ => (script_str, Vec::new()),
        };

        Self {
            name,
            command,
            args,
            env,
        }
    }

    /// Directory containing the server script, used to locate the auth
    /// helper that ships alongside it.
    pub fn server_dir(script: &Path) -> PathBuf {
        script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_script_python() {
        let config = McpServerConfig::for_script(Path::new("server/outlook-mcp.py"), HashMap::new());
        assert_eq!(config.command, "python3");
        assert_eq!(config.args, vec!["server/outlook-mcp.py".to_string()]);
        assert_eq!(config.name, "outlook-mcp");
    }

    #[test]
    fn test_for_script_node() {
        let config = McpServerConfig::for_script(Path::new("dist/index.js"), HashMap::new());
        assert_eq!(config.command, "node");
        assert_eq!(config.args, vec!["dist/index.js".to_string()]);
    }

    #[test]
    fn test_for_script_executable() {
        let config = McpServerConfig::for_script(Path::new("/usr/local/bin/outlook-mcp"), HashMap::new());
        assert_eq!(config.command, "/usr/local/bin/outlook-mcp");
        assert!(config.args.is_empty());
    }

    #[test]
    fn test_server_dir() {
        assert_eq!(
            McpServerConfig::server_dir(Path::new("server/outlook-mcp.py")),
            PathBuf::from("server")
        );
        assert_eq!(
            McpServerConfig::server_dir(Path::new("outlook-mcp.py")),
            PathBuf::from(".")
        );
    }
}
