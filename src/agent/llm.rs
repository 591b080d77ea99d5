//! Anthropic Messages API client.
//!
//! Thin wrapper over `POST /v1/messages` with the MCP server's tools
//! attached. Overloaded responses are retried once; everything else maps to
//! a typed error the chat loop can surface without guessing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::agent::tools::ToolInfo;
use crate::types::{ApiMessage, ContentBlock};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Delay before retrying an overloaded request.
const OVERLOAD_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed: check ANTHROPIC_API_KEY")]
    AuthFailed,
    #[error("rate limited by the API, try again shortly")]
    RateLimited,
    #[error("API is overloaded")]
    Overloaded,
    #[error("API request failed ({status}): {body}")]
    RequestFailed { status: u16, body: String },
    #[error("invalid API response: {reason}")]
    InvalidResponse { reason: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

// ============================================================================
// Messages API types
// ============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [ApiMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec<'a>>,
}

/// Tool definition as the Messages API expects it. Schemas come straight
/// from the MCP server.
#[derive(Debug, Serialize)]
struct ToolSpec<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl MessagesResponse {
    /// Why the model stopped. Reasons this client does not know map to
    /// [`StopReason::Other`] rather than failing deserialization.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason.as_deref().map(StopReason::from)
    }

    /// All requested tool invocations, in order.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => {
                Some((id.as_str(), name.as_str(), input))
            }
            _ => None,
        })
    }

    pub fn joined_text(&self) -> String {
        crate::types::message::joined_text(&self.content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Other,
}

impl From<&str> for StopReason {
    fn from(s: &str) -> Self {
        match s {
            "end_turn" => Self::EndTurn,
            "tool_use" => Self::ToolUse,
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

// ============================================================================
// Client
// ============================================================================

pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String, max_tokens: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_key,
            model,
            max_tokens,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a completion request, retrying once if the API is overloaded.
    pub async fn create_message(
        &self,
        system: Option<&str>,
        messages: &[ApiMessage],
        tools: &[ToolInfo],
    ) -> Result<MessagesResponse, LlmError> {
        match self.create_message_inner(system, messages, tools).await {
            Err(LlmError::Overloaded) => {
                tracing::warn!("API overloaded, retrying once...");
                tokio::time::sleep(OVERLOAD_RETRY_DELAY).await;
                self.create_message_inner(system, messages, tools).await
            }
            other => other,
        }
    }

    async fn create_message_inner(
        &self,
        system: Option<&str>,
        messages: &[ApiMessage],
        tools: &[ToolInfo],
    ) -> Result<MessagesResponse, LlmError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages,
            tools: tools
                .iter()
                .map(|t| ToolSpec {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.input_schema,
                })
                .collect(),
        };

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(map_error(status.as_u16(), &body));
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::InvalidResponse {
                reason: format!("{} (body: {})", e, truncate(&body, 200)),
            })?;

        tracing::debug!(
            "Completion: stop_reason={:?}, tokens in/out={}/{}",
            parsed.stop_reason(),
            parsed.usage.input_tokens,
            parsed.usage.output_tokens
        );

        Ok(parsed)
    }
}

fn map_error(status: u16, body: &str) -> LlmError {
    let kind = serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|e| e.error.kind)
        .unwrap_or_default();

    match status {
        401 | 403 => LlmError::AuthFailed,
        429 => LlmError::RateLimited,
        529 => LlmError::Overloaded,
        _ if kind == "overloaded_error" => LlmError::Overloaded,
        _ => {
            let message = serde_json::from_str::<ApiErrorEnvelope>(body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| truncate(body, 200));
            LlmError::RequestFailed {
                status,
                body: message,
            }
        }
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let cut = s
            .char_indices()
            .take_while(|(i, _)| *i < max_len)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &s[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn test_request_serialization() {
        let messages = vec![ApiMessage::user("hello")];
        let tools = vec![ToolInfo {
            name: "list-emails".to_string(),
            description: "List recent emails".to_string(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        }];

        let request = MessagesRequest {
            model: "claude-sonnet-4-20250514",
            max_tokens: 1024,
            system: Some("You are helpful."),
            messages: &messages,
            tools: tools
                .iter()
                .map(|t| ToolSpec {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.input_schema,
                })
                .collect(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "claude-sonnet-4-20250514");
        assert_eq!(json["system"], "You are helpful.");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["tools"][0]["name"], "list-emails");
        assert_eq!(json["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn test_request_omits_empty_tools_and_system() {
        let messages = vec![ApiMessage::user("hi")];
        let request = MessagesRequest {
            model: "m",
            max_tokens: 16,
            system: None,
            messages: &messages,
            tools: Vec::new(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_response_deserialization_with_tool_use() {
        let body = r#"{
            "id": "msg_01",
            "content": [
                { "type": "text", "text": "Let me check." },
                { "type": "tool_use", "id": "tu_1", "name": "list-emails", "input": { "count": 3 } }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 12, "output_tokens": 34 }
        }"#;

        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.stop_reason(), Some(StopReason::ToolUse));
        assert_eq!(parsed.usage.output_tokens, 34);
        assert_eq!(parsed.joined_text(), "Let me check.");

        let uses: Vec<_> = parsed.tool_uses().collect();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].1, "list-emails");
        assert_eq!(uses[0].2["count"], 3);
    }

    #[test]
    fn test_unknown_stop_reason() {
        let body = r#"{ "content": [], "stop_reason": "pause_turn" }"#;
        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.stop_reason(), Some(StopReason::Other));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(map_error(401, "{}"), LlmError::AuthFailed));
        assert!(matches!(map_error(429, "{}"), LlmError::RateLimited));
        assert!(matches!(map_error(529, "{}"), LlmError::Overloaded));

        let overloaded = r#"{ "error": { "type": "overloaded_error", "message": "busy" } }"#;
        assert!(matches!(map_error(500, overloaded), LlmError::Overloaded));

        let bad_request =
            r#"{ "error": { "type": "invalid_request_error", "message": "bad tool schema" } }"#;
        match map_error(400, bad_request) {
            LlmError::RequestFailed { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad tool schema");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_roundtrip_message_roles() {
        let msg = ApiMessage {
            role: Role::Assistant,
            content: vec![ContentBlock::text("ok")],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}
