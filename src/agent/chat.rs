//! Conversation state and the per-turn agent loop.
//!
//! A turn starts with one user message and keeps calling the API while the
//! model asks for tools, feeding each `tool_use` back as a `tool_result`.
//! The loop is bounded so a model that keeps requesting tools cannot run
//! away with the session.

use thiserror::Error;
use uuid::Uuid;

use crate::agent::llm::{AnthropicClient, LlmError, StopReason};
use crate::agent::tools::ToolRegistry;
use crate::types::{ApiMessage, ContentBlock};

/// Maximum tool rounds within a single turn.
const MAX_TOOL_ROUNDS: usize = 10;

/// System prompt for the Outlook assistant.
const SYSTEM_PROMPT: &str = "You are a helpful assistant with access to the user's \
Outlook account through the provided tools. Use them to read, search, and send \
email and to manage calendar events when the user asks. Be concise, and never \
invent mailbox contents - if a tool fails, say so.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("tool loop aborted after {rounds} rounds")]
    ToolLoop { rounds: usize },
}

/// Result of one completed turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Assistant text, across all rounds of the turn.
    pub text: String,
    /// Number of tool invocations performed.
    pub tool_calls: usize,
}

/// The running transcript for one console session.
pub struct Conversation {
    pub id: Uuid,
    system: String,
    messages: Vec<ApiMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            system: SYSTEM_PROMPT.to_string(),
            messages: Vec::new(),
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn messages(&self) -> &[ApiMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: ApiMessage) {
        self.messages.push(message);
    }

    /// Reset the transcript, keeping the session id.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Drop everything appended after `len` (turn rollback on error).
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one turn of the conversation. On error the transcript is rolled back
/// to its state before the turn, so a failed call cannot corrupt the
/// user/assistant alternation.
pub async fn run_turn(
    llm: &AnthropicClient,
    registry: &ToolRegistry,
    conversation: &mut Conversation,
    user_input: &str,
) -> Result<TurnOutcome, ChatError> {
    let checkpoint = conversation.len();

    match run_turn_inner(llm, registry, conversation, user_input).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            conversation.truncate(checkpoint);
            Err(e)
        }
    }
}

async fn run_turn_inner(
    llm: &AnthropicClient,
    registry: &ToolRegistry,
    conversation: &mut Conversation,
    user_input: &str,
) -> Result<TurnOutcome, ChatError> {
    conversation.push(ApiMessage::user(user_input));

    let tools = registry.list();
    let mut text = String::new();
    let mut tool_calls = 0;
    let mut rounds = 0;

    loop {
        let response = llm
            .create_message(Some(conversation.system()), conversation.messages(), &tools)
            .await?;

        let round_text = response.joined_text();
        if !round_text.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&round_text);
        }

        if response.stop_reason() != Some(StopReason::ToolUse) {
            let assistant = ApiMessage::assistant(response.content);
            // An empty assistant message could not be replayed on the next
            // turn; the API rejects empty content.
            if !assistant.content.is_empty() {
                conversation.push(assistant);
            }
            tracing::debug!(
                conversation = %conversation.id,
                rounds,
                tool_calls,
                "Turn complete"
            );
            return Ok(TurnOutcome { text, tool_calls });
        }

        rounds += 1;
        if rounds > MAX_TOOL_ROUNDS {
            return Err(ChatError::ToolLoop { rounds });
        }

        let results = execute_tool_uses(registry, &response.content).await;
        conversation.push(ApiMessage::assistant(response.content));

        // A tool_use stop with no tool blocks would make an empty user
        // message, which the API rejects; treat it as the end of the turn.
        if results.is_empty() {
            return Ok(TurnOutcome { text, tool_calls });
        }

        tool_calls += results.len();
        conversation.push(ApiMessage::tool_results(results));
    }
}

/// Execute every `tool_use` block in order, turning failures into
/// `is_error` results instead of aborting the turn.
pub async fn execute_tool_uses(
    registry: &ToolRegistry,
    content: &[ContentBlock],
) -> Vec<ContentBlock> {
    let mut results = Vec::new();

    for block in content {
        if let ContentBlock::ToolUse { id, name, input } = block {
            tracing::info!("Tool call: {}", name);
            match registry.execute(name, input.clone()).await {
                Ok(output) => results.push(ContentBlock::tool_result(id.clone(), output)),
                Err(e) => {
                    tracing::warn!("Tool '{}' failed: {}", name, e);
                    results.push(ContentBlock::tool_error(id.clone(), e.to_string()));
                }
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tools::{Tool, ToolError};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercase the input"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        async fn execute(&self, params: Value) -> Result<String, ToolError> {
            let text = params["text"].as_str().unwrap_or_default();
            Ok(text.to_uppercase())
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn input_schema(&self) -> Value {
            Value::Null
        }
        async fn execute(&self, _params: Value) -> Result<String, ToolError> {
            Err(ToolError::ExecutionFailed("nope".to_string()))
        }
    }

    #[tokio::test]
    async fn test_execute_tool_uses_keeps_order_and_ids() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(UpperTool));
        registry.register(Arc::new(FailTool));

        let content = vec![
            ContentBlock::text("working on it"),
            ContentBlock::ToolUse {
                id: "tu_1".to_string(),
                name: "upper".to_string(),
                input: serde_json::json!({ "text": "inbox" }),
            },
            ContentBlock::ToolUse {
                id: "tu_2".to_string(),
                name: "fail".to_string(),
                input: serde_json::json!({}),
            },
            ContentBlock::ToolUse {
                id: "tu_3".to_string(),
                name: "missing".to_string(),
                input: serde_json::json!({}),
            },
        ];

        let results = execute_tool_uses(&registry, &content).await;
        assert_eq!(results.len(), 3);

        match &results[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                assert_eq!(tool_use_id, "tu_1");
                assert_eq!(content, "INBOX");
                assert!(!is_error);
            }
            other => panic!("unexpected block: {:?}", other),
        }

        match &results[1] {
            ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => {
                assert_eq!(tool_use_id, "tu_2");
                assert!(is_error);
            }
            other => panic!("unexpected block: {:?}", other),
        }

        match &results[2] {
            ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => {
                assert_eq!(tool_use_id, "tu_3");
                assert!(is_error);
            }
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[test]
    fn test_conversation_clear_keeps_id() {
        let mut conv = Conversation::new();
        let id = conv.id;
        conv.push(ApiMessage::user("hello"));
        assert_eq!(conv.len(), 1);

        conv.clear();
        assert!(conv.is_empty());
        assert_eq!(conv.id, id);
    }

    #[test]
    fn test_conversation_truncate_rolls_back() {
        let mut conv = Conversation::new();
        conv.push(ApiMessage::user("first"));
        let checkpoint = conv.len();

        conv.push(ApiMessage::user("second"));
        conv.push(ApiMessage::assistant(vec![ContentBlock::text("reply")]));
        conv.truncate(checkpoint);

        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages()[0].joined_text(), "first");
    }
}
