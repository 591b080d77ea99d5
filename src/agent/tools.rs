//! Tool registry.
//!
//! Every tool this client exposes to the model comes from the MCP server;
//! the registry keeps them behind a common trait so the chat loop dispatches
//! by name without caring where a tool lives.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

use crate::mcp::{extract_text, McpError, McpToolDescription, StdioMcpClient};

/// Tool trait - all tools must implement this
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, params: Value) -> Result<String, ToolError>;
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("tool not found: {0}")]
    NotFound(String),
}

impl From<McpError> for ToolError {
    fn from(e: McpError) -> Self {
        ToolError::ExecutionFailed(e.to_string())
    }
}

/// Tool information for listings and API tool specs.
#[derive(Clone, Debug)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tool registry keyed by tool name.
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| t.clone())
    }

    pub fn list(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self
            .tools
            .iter()
            .map(|entry| ToolInfo {
                name: entry.name().to_string(),
                description: entry.description().to_string(),
                input_schema: entry.input_schema(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, params: Value) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(params).await
    }

    /// Register one `McpTool` per tool the server reports.
    pub async fn register_mcp_tools(
        &self,
        client: Arc<StdioMcpClient>,
    ) -> Result<usize, McpError> {
        let descriptions = client.list_tools().await?;
        let count = descriptions.len();
        for desc in descriptions {
            self.register(Arc::new(McpTool::new(desc, Arc::clone(&client))));
        }
        tracing::info!(
            "Registered {} tool(s) from MCP server '{}'",
            count,
            client.name()
        );
        Ok(count)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A tool backed by the MCP server.
pub struct McpTool {
    desc: McpToolDescription,
    client: Arc<StdioMcpClient>,
}

impl McpTool {
    pub fn new(desc: McpToolDescription, client: Arc<StdioMcpClient>) -> Self {
        Self { desc, client }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.desc.name
    }

    fn description(&self) -> &str {
        &self.desc.description
    }

    fn input_schema(&self) -> Value {
        if self.desc.input_schema.is_null()
            || self.desc.input_schema == Value::Object(Default::default())
        {
            serde_json::json!({
                "type": "object",
                "properties": {}
            })
        } else {
            self.desc.input_schema.clone()
        }
    }

    async fn execute(&self, params: Value) -> Result<String, ToolError> {
        tracing::debug!("MCP tool call: {} with params: {:?}", self.desc.name, params);
        let result = self.client.call_tool(&self.desc.name, params).await?;
        Ok(extract_text(&result))
    }
}
