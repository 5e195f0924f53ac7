use crate::llm_provider::LLMResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A passage returned by semantic search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

impl Passage {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score: None,
            location: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterAttribute {
    pub key: String,
    pub value: String,
}

/// Metadata filter in the knowledge-base filter JSON shape
/// (`{"equals": {...}}` / `{"andAll": [...]}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetrievalFilter {
    Equals(FilterAttribute),
    AndAll(Vec<RetrievalFilter>),
}

impl RetrievalFilter {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals(FilterAttribute {
            key: key.into(),
            value: value.into(),
        })
    }
}

/// Semantic-search interface over a managed knowledge base
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        knowledge_base_id: &str,
        top_k: usize,
        filter: Option<&RetrievalFilter>,
    ) -> LLMResult<Vec<Passage>>;

    fn provider_name(&self) -> &str;
}
