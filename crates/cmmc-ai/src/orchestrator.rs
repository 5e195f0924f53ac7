// ABOUTME: Two-turn tool-calling orchestrator for CMMC questions
// ABOUTME: Lets the model infer tier/intent filters, runs one knowledge-base search, then asks for the grounded answer

use crate::llm_provider::{
    ChatModel, ConversationTurn, GenerationConfig, ToolConfig, ToolResult, ToolResultContent,
    ToolUse,
};
use crate::retrieval_gateway::KnowledgeSearch;
use crate::tool_schemas::{
    CmmcToolSchemas, SearchKnowledgeBaseInput, SEARCH_KNOWLEDGE_BASE, SYSTEM_INSTRUCTION,
};
use serde_json::json;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

pub const CLIENT_NOT_INITIALIZED: &str = "AWS Bedrock client not initialized.";

/// Final answer of one orchestrator run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Text produced by the model
    Success(String),
    /// Readable error message
    Failure(String),
}

impl Answer {
    pub fn text(&self) -> &str {
        match self {
            Answer::Success(text) | Answer::Failure(text) => text,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Answer::Failure(_))
    }

    fn processing_error(reason: impl fmt::Display) -> Self {
        Answer::Failure(format!("Error processing request: {}", reason))
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Tier and intent exactly as the model supplied them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferredFilters {
    pub tier: Option<String>,
    pub intent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorOutput {
    pub answer: Answer,
    pub inferred: InferredFilters,
    /// Every turn exchanged during the run, in order
    pub transcript: Vec<ConversationTurn>,
}

impl OrchestratorOutput {
    fn failure(answer: Answer, transcript: Vec<ConversationTurn>) -> Self {
        Self {
            answer,
            inferred: InferredFilters::default(),
            transcript,
        }
    }

    /// `(answer, tier, intent)`
    pub fn into_parts(self) -> (String, Option<String>, Option<String>) {
        let text = match self.answer {
            Answer::Success(text) | Answer::Failure(text) => text,
        };
        (text, self.inferred.tier, self.inferred.intent)
    }
}

/// Runs one question through model → search tool → model.
///
/// Nothing is kept between runs. Model faults are converted to an
/// [`Answer::Failure`] with both filters cleared; nothing is retried here.
pub struct ToolCallingOrchestrator<'a> {
    chat_model: Option<&'a dyn ChatModel>,
    search: &'a dyn KnowledgeSearch,
    generation: GenerationConfig,
    tool_config: ToolConfig,
    system: Vec<String>,
}

impl<'a> ToolCallingOrchestrator<'a> {
    pub fn new(chat_model: Option<&'a dyn ChatModel>, search: &'a dyn KnowledgeSearch) -> Self {
        Self {
            chat_model,
            search,
            generation: GenerationConfig::default(),
            tool_config: CmmcToolSchemas::tool_config(),
            system: vec![SYSTEM_INSTRUCTION.to_string()],
        }
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    #[instrument(skip(self, user_input))]
    pub async fn run(&self, user_input: &str) -> OrchestratorOutput {
        let start = Instant::now();
        let mut transcript = vec![ConversationTurn::user_text(user_input)];

        let Some(chat_model) = self.chat_model else {
            warn!("Chat model unavailable, skipping request");
            return OrchestratorOutput::failure(
                Answer::Failure(CLIENT_NOT_INITIALIZED.to_string()),
                transcript,
            );
        };

        info!(
            "🤖 Asking {} ({})",
            chat_model.provider_name(),
            chat_model.model_name()
        );

        let first = match chat_model
            .converse(&transcript, &self.system, Some(&self.tool_config), &self.generation)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("First model turn failed: {:#}", e);
                return OrchestratorOutput::failure(Answer::processing_error(e), transcript);
            }
        };
        debug!(stop_reason = ?first.stop_reason, "First model turn complete");

        let request = first
            .message
            .tool_uses()
            .find(|tool_use| tool_use.name == SEARCH_KNOWLEDGE_BASE)
            .cloned();
        transcript.push(first.message);

        let mut inferred = InferredFilters::default();
        match request {
            Some(request) => {
                let (result, filters) = self.dispatch(&request).await;
                inferred = filters;
                transcript.push(ConversationTurn::tool_result(result));
            }
            None => info!("Model answered without searching the knowledge base"),
        }

        let second = match chat_model
            .converse(&transcript, &self.system, Some(&self.tool_config), &self.generation)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Second model turn failed: {:#}", e);
                return OrchestratorOutput::failure(Answer::processing_error(e), transcript);
            }
        };

        let answer = second.message.first_text().map(str::to_string);
        transcript.push(second.message);

        let Some(text) = answer else {
            warn!("Final model response contained no text block");
            return OrchestratorOutput::failure(
                Answer::processing_error("model response contained no text"),
                transcript,
            );
        };

        info!(
            "✅ Answer ready in {}ms (tier: {:?}, intent: {:?})",
            start.elapsed().as_millis(),
            inferred.tier,
            inferred.intent
        );

        OrchestratorOutput {
            answer: Answer::Success(text),
            inferred,
            transcript,
        }
    }

    /// Validate the request and run the search it asks for
    async fn dispatch(&self, request: &ToolUse) -> (ToolResult, InferredFilters) {
        let input = match SearchKnowledgeBaseInput::from_json(&request.input) {
            Ok(input) => input,
            Err(e) => {
                warn!(tool_use_id = %request.id, "Rejected search_knowledge_base input: {}", e);
                let result = ToolResult::error(
                    request,
                    format!("Invalid search_knowledge_base input: {}", e),
                );
                return (result, InferredFilters::default());
            }
        };

        info!(
            "🔍 search_knowledge_base(query: {:?}, tier: {:?}, intent: {:?})",
            input.query, input.tier, input.intent
        );

        let text = self
            .search
            .search(&input.query, input.tier.as_deref(), input.intent.as_deref())
            .await;

        let result = ToolResult::success(
            request,
            vec![ToolResultContent::Json(json!({ "result": text }))],
        );

        (
            result,
            InferredFilters {
                tier: input.tier,
                intent: input.intent,
            },
        )
    }
}
