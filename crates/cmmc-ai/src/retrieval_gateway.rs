use crate::knowledge_base::{KnowledgeRetriever, Passage, RetrievalFilter};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_TOP_K: usize = 5;

pub const CONFIGURATION_MISSING: &str = "Knowledge Base configuration missing.";
pub const NO_RESULTS: &str = "No relevant information found in Knowledge Base.";

const TIER_KEY: &str = "tier";
const INTENT_KEY: &str = "intent";

/// Result of one knowledge-base search
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Passages(Vec<Passage>),
    NoResults,
    ConfigurationMissing,
    ServiceFailure(String),
}

impl SearchOutcome {
    /// Flatten to the text handed back to the model
    pub fn into_text(self) -> String {
        match self {
            SearchOutcome::Passages(passages) => passages
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("\n\n"),
            SearchOutcome::NoResults => NO_RESULTS.to_string(),
            SearchOutcome::ConfigurationMissing => CONFIGURATION_MISSING.to_string(),
            SearchOutcome::ServiceFailure(reason) => {
                format!("Error querying Knowledge Base: {}", reason)
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SearchOutcome::ConfigurationMissing | SearchOutcome::ServiceFailure(_)
        )
    }
}

impl fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.clone().into_text())
    }
}

/// Search seam used by the orchestrator
#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    async fn search(&self, query: &str, tier: Option<&str>, intent: Option<&str>) -> String;
}

/// A filter value is meaningful when present, non-empty and not the "none" sentinel
fn meaningful(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("none"))
}

/// Build the metadata filter for an inferred tier and intent
pub fn build_filter(tier: Option<&str>, intent: Option<&str>) -> Option<RetrievalFilter> {
    let mut filters: Vec<RetrievalFilter> = [(TIER_KEY, tier), (INTENT_KEY, intent)]
        .into_iter()
        .filter_map(|(key, value)| meaningful(value).map(|v| RetrievalFilter::equals(key, v)))
        .collect();

    match filters.len() {
        0 => None,
        1 => filters.pop(),
        _ => Some(RetrievalFilter::AndAll(filters)),
    }
}

/// Filtered semantic search over the configured knowledge base
pub struct RetrievalGateway {
    retriever: Option<Arc<dyn KnowledgeRetriever>>,
    knowledge_base_id: Option<String>,
    top_k: usize,
}

impl RetrievalGateway {
    pub fn new(
        retriever: Option<Arc<dyn KnowledgeRetriever>>,
        knowledge_base_id: Option<String>,
    ) -> Self {
        Self {
            retriever,
            knowledge_base_id,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn knowledge_base_id(&self) -> Option<&str> {
        self.knowledge_base_id.as_deref()
    }

    /// True when both the retriever and the knowledge base id are set
    pub fn is_configured(&self) -> bool {
        self.retriever.is_some() && self.knowledge_base_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    pub async fn search_outcome(
        &self,
        query: &str,
        tier: Option<&str>,
        intent: Option<&str>,
    ) -> SearchOutcome {
        let (retriever, kb_id) = match (&self.retriever, self.knowledge_base_id.as_deref()) {
            (Some(retriever), Some(kb_id)) if !kb_id.is_empty() => (retriever, kb_id),
            _ => return SearchOutcome::ConfigurationMissing,
        };

        let filter = build_filter(tier, intent);
        debug!(query, ?tier, ?intent, ?filter, "Querying knowledge base");

        match retriever
            .retrieve(query, kb_id, self.top_k, filter.as_ref())
            .await
        {
            Ok(passages) if passages.is_empty() => SearchOutcome::NoResults,
            Ok(passages) => {
                debug!("Retrieved {} passages", passages.len());
                SearchOutcome::Passages(passages)
            }
            Err(e) => {
                warn!("Knowledge base query failed: {}", e);
                SearchOutcome::ServiceFailure(e.to_string())
            }
        }
    }
}

#[async_trait]
impl KnowledgeSearch for RetrievalGateway {
    async fn search(&self, query: &str, tier: Option<&str>, intent: Option<&str>) -> String {
        self.search_outcome(query, tier, intent).await.into_text()
    }
}
