// ABOUTME: Tool schema and system instruction for the CMMC knowledge-base search tool
// ABOUTME: Typed validation of the arguments the model sends with a search_knowledge_base request

use crate::llm_provider::{ToolConfig, ToolSpec};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

/// Name the model must use to request a knowledge-base search
pub const SEARCH_KNOWLEDGE_BASE: &str = "search_knowledge_base";

/// System instruction sent with both model turns
pub const SYSTEM_INSTRUCTION: &str = "You are a CMMC expert. Analyze the user's question. \
You MUST use the 'search_knowledge_base' tool to retrieve information. \
infer the 'tier' and 'intent' metadata from their question to pass to the tool. \
Start by calling the tool, then answer based on the results.";

#[derive(Debug, Error)]
pub enum ToolInputError {
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' must be a string")]
    WrongType { field: &'static str },
}

/// Arguments of a `search_knowledge_base` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchKnowledgeBaseInput {
    pub query: String,
    pub tier: Option<String>,
    pub intent: Option<String>,
}

impl SearchKnowledgeBaseInput {
    /// Validate raw tool arguments.
    ///
    /// `query` must be a string. `tier` and `intent` are listed as required in
    /// the schema but models sometimes drop them; a missing or null value is
    /// treated as absent. A non-string value is rejected.
    pub fn from_json(input: &JsonValue) -> Result<Self, ToolInputError> {
        let object = input
            .as_object()
            .ok_or_else(|| ToolInputError::NotAnObject(json_type_name(input)))?;

        let query = match object.get("query") {
            None | Some(JsonValue::Null) => return Err(ToolInputError::MissingField("query")),
            Some(JsonValue::String(query)) => query.clone(),
            Some(_) => return Err(ToolInputError::WrongType { field: "query" }),
        };

        Ok(Self {
            query,
            tier: optional_string(object.get("tier"), "tier")?,
            intent: optional_string(object.get("intent"), "intent")?,
        })
    }
}

fn optional_string(
    value: Option<&JsonValue>,
    field: &'static str,
) -> Result<Option<String>, ToolInputError> {
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ToolInputError::WrongType { field }),
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Tool definitions offered to the model
pub struct CmmcToolSchemas;

impl CmmcToolSchemas {
    pub fn all() -> Vec<ToolSpec> {
        vec![Self::search_knowledge_base()]
    }

    pub fn tool_config() -> ToolConfig {
        ToolConfig { tools: Self::all() }
    }

    /// Schema for search_knowledge_base
    pub fn search_knowledge_base() -> ToolSpec {
        ToolSpec {
            name: SEARCH_KNOWLEDGE_BASE.to_string(),
            description: "Search the CMMC knowledge base for information. \
                You MUST infer the 'tier' (e.g., Level 1, Level 2) and 'intent' \
                (e.g., policy, technical, generic) from the user's request to filter the search."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query based on user input"
                    },
                    "tier": {
                        "type": "string",
                        "description": "Inferred CMMC level/tier (e.g., 'Level 2'). Use 'None' if unclear."
                    },
                    "intent": {
                        "type": "string",
                        "description": "Inferred intent (e.g., 'policy', 'technical'). Use 'None' if unclear."
                    }
                },
                "required": ["query", "tier", "intent"]
            }),
        }
    }
}
