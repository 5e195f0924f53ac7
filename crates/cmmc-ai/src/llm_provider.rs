use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Result type for LLM operations
pub type LLMResult<T> = anyhow::Result<T>;

/// Configuration for generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Temperature for sampling
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<usize>,
    /// Top-p nucleus sampling parameter
    pub top_p: Option<f32>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: None,
            max_tokens: Some(2048),
            top_p: None,
            stop: None,
        }
    }
}

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Correlation token the model assigns to a tool invocation.
///
/// A [`ToolResult`] can only be built from the [`ToolUse`] it answers, so the
/// id always travels back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolUseId(String);

impl ToolUseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolUseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub id: ToolUseId,
    pub name: String,
    /// Raw arguments; validated by the tool before use
    pub input: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultContent {
    Text(String),
    Json(JsonValue),
}

/// Output of a tool, correlated to the request that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    tool_use_id: ToolUseId,
    pub content: Vec<ToolResultContent>,
    pub status: ToolResultStatus,
}

impl ToolResult {
    pub fn success(request: &ToolUse, content: Vec<ToolResultContent>) -> Self {
        Self {
            tool_use_id: request.id.clone(),
            content,
            status: ToolResultStatus::Success,
        }
    }

    pub fn error(request: &ToolUse, message: impl Into<String>) -> Self {
        Self {
            tool_use_id: request.id.clone(),
            content: vec![ToolResultContent::Text(message.into())],
            status: ToolResultStatus::Error,
        }
    }

    pub fn tool_use_id(&self) -> &ToolUseId {
        &self.tool_use_id
    }
}

/// One block of a conversation turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentBlock {
    Text(String),
    ToolUse(ToolUse),
    ToolResult(ToolResult),
}

/// A message exchanged with the chat model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
}

impl ConversationTurn {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentBlock::Text(text.into())],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: vec![ContentBlock::Text(text.into())],
        }
    }

    /// Tool results are sent back to the model in a user turn
    pub fn tool_result(result: ToolResult) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentBlock::ToolResult(result)],
        }
    }

    /// First text block, if any
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// Tool invocations in the order the model emitted them
    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUse> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse(tool_use) => Some(tool_use),
            _ => None,
        })
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolResult(result) => Some(result),
            _ => None,
        })
    }
}

/// Tool definition offered to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool arguments
    pub input_schema: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolConfig {
    pub tools: Vec<ToolSpec>,
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Response from the chat model
#[derive(Debug, Clone, Serialize)]
pub struct ConverseResponse {
    /// The assistant turn
    pub message: ConversationTurn,
    /// Stop reason (e.g., "end_turn", "tool_use", "max_tokens")
    pub stop_reason: Option<String>,
    pub usage: Option<TokenUsage>,
    /// Model used for generation
    pub model: String,
}

/// Chat-completion interface with structured tool calling
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the conversation and return the model's response turn
    async fn converse(
        &self,
        conversation: &[ConversationTurn],
        system: &[String],
        tools: Option<&ToolConfig>,
        config: &GenerationConfig,
    ) -> LLMResult<ConverseResponse>;

    /// Get the name of this provider
    fn provider_name(&self) -> &str;

    /// Get the model identifier
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_result_carries_request_id() {
        let request = ToolUse {
            id: ToolUseId::new("tooluse_abc"),
            name: "search_knowledge_base".to_string(),
            input: json!({}),
        };

        let ok = ToolResult::success(&request, vec![ToolResultContent::Text("x".into())]);
        let failed = ToolResult::error(&request, "bad input");

        assert_eq!(ok.tool_use_id(), &request.id);
        assert_eq!(failed.tool_use_id(), &request.id);
        assert_eq!(failed.status, ToolResultStatus::Error);
    }

    #[test]
    fn test_first_text_skips_tool_blocks() {
        let turn = ConversationTurn {
            role: MessageRole::Assistant,
            content: vec![
                ContentBlock::ToolUse(ToolUse {
                    id: ToolUseId::new("t1"),
                    name: "search_knowledge_base".to_string(),
                    input: json!({}),
                }),
                ContentBlock::Text("first".to_string()),
                ContentBlock::Text("second".to_string()),
            ],
        };

        assert_eq!(turn.first_text(), Some("first"));
        assert_eq!(turn.tool_uses().count(), 1);
    }
}
