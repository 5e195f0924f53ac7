use crate::bedrock_client::{endpoint_url, BedrockAuth, BedrockHttpClient};
use crate::knowledge_base::{KnowledgeRetriever, Passage, RetrievalFilter};
use crate::llm_provider::LLMResult;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Configuration for Bedrock Knowledge Base retrieval
#[derive(Debug, Clone)]
pub struct BedrockKnowledgeBaseConfig {
    /// Request authentication
    pub auth: BedrockAuth,
    /// Agent-runtime endpoint, e.g. "https://bedrock-agent-runtime.us-east-1.amazonaws.com"
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retries for failed requests
    pub max_retries: u32,
}

/// Knowledge base search through the Bedrock `Retrieve` API
pub struct BedrockKnowledgeBase {
    config: BedrockKnowledgeBaseConfig,
    http: BedrockHttpClient,
}

impl BedrockKnowledgeBase {
    pub fn new(config: BedrockKnowledgeBaseConfig) -> Result<Self> {
        let http = BedrockHttpClient::new(
            config.auth.clone(),
            config.timeout_secs,
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl KnowledgeRetriever for BedrockKnowledgeBase {
    async fn retrieve(
        &self,
        query: &str,
        knowledge_base_id: &str,
        top_k: usize,
        filter: Option<&RetrievalFilter>,
    ) -> LLMResult<Vec<Passage>> {
        let url = endpoint_url(
            &self.config.endpoint,
            &["knowledgebases", knowledge_base_id, "retrieve"],
        )?;
        let request = build_retrieve_request(query, top_k, filter);

        let body: RetrieveResponseBody = self
            .http
            .post_json("Bedrock Knowledge Base", url, &request)
            .await?;

        Ok(body.retrieval_results.into_iter().map(Passage::from).collect())
    }

    fn provider_name(&self) -> &str {
        "bedrock-knowledge-base"
    }
}

fn build_retrieve_request(
    query: &str,
    top_k: usize,
    filter: Option<&RetrievalFilter>,
) -> RetrieveRequestBody {
    RetrieveRequestBody {
        retrieval_query: RetrievalQuery {
            text: query.to_string(),
        },
        retrieval_configuration: RetrievalConfiguration {
            vector_search_configuration: VectorSearchConfiguration {
                number_of_results: top_k,
                filter: filter.cloned(),
            },
        },
    }
}

// Bedrock Retrieve request/response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveRequestBody {
    retrieval_query: RetrievalQuery,
    retrieval_configuration: RetrievalConfiguration,
}

#[derive(Debug, Serialize)]
struct RetrievalQuery {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalConfiguration {
    vector_search_configuration: VectorSearchConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VectorSearchConfiguration {
    number_of_results: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<RetrievalFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponseBody {
    #[serde(default)]
    retrieval_results: Vec<WireRetrievalResult>,
}

#[derive(Debug, Deserialize)]
struct WireRetrievalResult {
    #[serde(default)]
    content: Option<WireRetrievalContent>,
    #[serde(default)]
    location: Option<JsonValue>,
    #[serde(default)]
    metadata: Option<JsonValue>,
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WireRetrievalContent {
    #[serde(default)]
    text: Option<String>,
}

impl From<WireRetrievalResult> for Passage {
    fn from(result: WireRetrievalResult) -> Self {
        Passage {
            text: result.content.and_then(|c| c.text).unwrap_or_default(),
            score: result.score,
            location: result.location,
            metadata: result.metadata,
        }
    }
}
