use crate::bedrock_client::{endpoint_url, BedrockAuth, BedrockHttpClient};
use crate::llm_provider::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::time::Instant;

#[cfg(test)]
const DEFAULT_MODEL: &str = "anthropic.claude-3-haiku-20240307-v1:0";

/// Configuration for the Bedrock Converse provider
#[derive(Debug, Clone)]
pub struct BedrockConfig {
    /// Request authentication
    pub auth: BedrockAuth,
    /// Runtime endpoint, e.g. "https://bedrock-runtime.us-east-1.amazonaws.com"
    pub endpoint: String,
    /// Model or inference-profile identifier
    pub model_id: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retries for failed requests
    pub max_retries: u32,
}

/// Chat model backed by the Bedrock Converse API
pub struct BedrockChatProvider {
    config: BedrockConfig,
    http: BedrockHttpClient,
}

impl BedrockChatProvider {
    pub fn new(config: BedrockConfig) -> Result<Self> {
        let http = BedrockHttpClient::new(
            config.auth.clone(),
            config.timeout_secs,
            config.max_retries,
        )?;
        tracing::debug!(auth = http.auth_kind(), model = %config.model_id, "Bedrock chat provider ready");
        Ok(Self { config, http })
    }
}

#[async_trait]
impl ChatModel for BedrockChatProvider {
    async fn converse(
        &self,
        conversation: &[ConversationTurn],
        system: &[String],
        tools: Option<&ToolConfig>,
        config: &GenerationConfig,
    ) -> LLMResult<ConverseResponse> {
        let start = Instant::now();
        let url = endpoint_url(
            &self.config.endpoint,
            &["model", self.config.model_id.as_str(), "converse"],
        )?;
        let request = build_converse_request(conversation, system, tools, config);

        let body: ConverseResponseBody = self.http.post_json("Bedrock Converse", url, &request).await?;
        let response = parse_converse_response(body, &self.config.model_id)?;

        tracing::debug!(
            model = %self.config.model_id,
            stop_reason = ?response.stop_reason,
            duration_ms = start.elapsed().as_millis() as u64,
            "Bedrock converse completed"
        );

        Ok(response)
    }

    fn provider_name(&self) -> &str {
        "bedrock"
    }

    fn model_name(&self) -> &str {
        &self.config.model_id
    }
}

fn build_converse_request(
    conversation: &[ConversationTurn],
    system: &[String],
    tools: Option<&ToolConfig>,
    config: &GenerationConfig,
) -> ConverseRequestBody {
    ConverseRequestBody {
        messages: conversation
            .iter()
            .map(|turn| WireMessage {
                role: turn.role.to_string(),
                content: turn.content.iter().map(content_block_to_wire).collect(),
            })
            .collect(),
        system: system
            .iter()
            .map(|text| WireSystemBlock { text: text.clone() })
            .collect(),
        tool_config: tools.filter(|t| !t.tools.is_empty()).map(|t| WireToolConfig {
            tools: t
                .tools
                .iter()
                .map(|spec| {
                    json!({
                        "toolSpec": {
                            "name": spec.name,
                            "description": spec.description,
                            "inputSchema": { "json": spec.input_schema }
                        }
                    })
                })
                .collect(),
        }),
        inference_config: WireInferenceConfig {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            stop_sequences: config.stop.clone(),
        },
    }
}

fn content_block_to_wire(block: &ContentBlock) -> JsonValue {
    match block {
        ContentBlock::Text(text) => json!({ "text": text }),
        ContentBlock::ToolUse(tool_use) => json!({
            "toolUse": {
                "toolUseId": tool_use.id.as_str(),
                "name": tool_use.name,
                "input": tool_use.input,
            }
        }),
        ContentBlock::ToolResult(result) => {
            let content: Vec<JsonValue> = result
                .content
                .iter()
                .map(|c| match c {
                    ToolResultContent::Text(text) => json!({ "text": text }),
                    ToolResultContent::Json(value) => json!({ "json": value }),
                })
                .collect();
            let status = match result.status {
                ToolResultStatus::Success => "success",
                ToolResultStatus::Error => "error",
            };
            json!({
                "toolResult": {
                    "toolUseId": result.tool_use_id().as_str(),
                    "content": content,
                    "status": status,
                }
            })
        }
    }
}

fn parse_converse_response(body: ConverseResponseBody, model: &str) -> Result<ConverseResponse> {
    let message = body
        .output
        .message
        .ok_or_else(|| anyhow!("Bedrock Converse response contained no message"))?;

    let role = match message.role.as_str() {
        "user" => MessageRole::User,
        _ => MessageRole::Assistant,
    };

    let content = message
        .content
        .iter()
        .filter_map(content_block_from_wire)
        .collect();

    Ok(ConverseResponse {
        message: ConversationTurn { role, content },
        stop_reason: body.stop_reason,
        usage: body.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
            total_tokens: u.total_tokens,
        }),
        model: model.to_string(),
    })
}

/// Map one response block; unsupported block types are skipped
fn content_block_from_wire(value: &JsonValue) -> Option<ContentBlock> {
    if let Some(text) = value.get("text").and_then(JsonValue::as_str) {
        return Some(ContentBlock::Text(text.to_string()));
    }

    if let Some(tool_use) = value.get("toolUse") {
        return match serde_json::from_value::<WireToolUse>(tool_use.clone()) {
            Ok(wire) => Some(ContentBlock::ToolUse(ToolUse {
                id: ToolUseId::new(wire.tool_use_id),
                name: wire.name,
                input: wire.input,
            })),
            Err(e) => {
                tracing::warn!("Skipping malformed toolUse block: {}", e);
                None
            }
        };
    }

    tracing::debug!(block = %value, "Skipping unsupported content block");
    None
}

// Bedrock Converse request/response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConverseRequestBody {
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<WireSystemBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<WireToolConfig>,
    inference_config: WireInferenceConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: Vec<JsonValue>,
}

#[derive(Debug, Serialize)]
struct WireSystemBlock {
    text: String,
}

#[derive(Debug, Serialize)]
struct WireToolConfig {
    tools: Vec<JsonValue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireInferenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseResponseBody {
    output: ConverseOutput,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    #[serde(default)]
    message: Option<WireMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireToolUse {
    tool_use_id: String,
    name: String,
    #[serde(default)]
    input: JsonValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    input_tokens: usize,
    output_tokens: usize,
    total_tokens: usize,
}
