//! Agent components
//!
//! Authentication orchestration, the Messages API client, the tool
//! registry, and the per-turn chat loop.

pub mod auth;
pub mod chat;
pub mod llm;
pub mod tools;

pub use auth::{AuthError, AuthManager};
pub use chat::{ChatError, Conversation, TurnOutcome};
pub use llm::{AnthropicClient, LlmError};
pub use tools::{McpTool, Tool, ToolError, ToolRegistry};
