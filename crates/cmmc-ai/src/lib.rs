pub mod context;
pub mod knowledge_base;
pub mod llm_factory;
pub mod llm_provider;
pub mod orchestrator;
pub mod retrieval_gateway;
pub mod tool_schemas;

// AWS Bedrock providers
#[cfg(feature = "bedrock")]
mod bedrock_client;
#[cfg(feature = "bedrock")]
pub mod bedrock_knowledge_base;
#[cfg(feature = "bedrock")]
pub mod bedrock_provider;

pub use context::AppContext;
pub use knowledge_base::{KnowledgeRetriever, Passage, RetrievalFilter};
pub use llm_factory::ProviderFactory;
pub use llm_provider::*;
pub use orchestrator::{Answer, InferredFilters, OrchestratorOutput, ToolCallingOrchestrator};
pub use retrieval_gateway::{build_filter, KnowledgeSearch, RetrievalGateway, SearchOutcome};
pub use tool_schemas::{CmmcToolSchemas, SearchKnowledgeBaseInput, ToolInputError};

#[cfg(feature = "bedrock")]
pub use bedrock_client::{BedrockAuth, BEDROCK_API_KEY_ENV};
#[cfg(feature = "bedrock")]
pub use bedrock_knowledge_base::{BedrockKnowledgeBase, BedrockKnowledgeBaseConfig};
#[cfg(feature = "bedrock")]
pub use bedrock_provider::{BedrockChatProvider, BedrockConfig};
