use crate::llm_factory::ProviderFactory;
use crate::llm_provider::{ChatModel, GenerationConfig};
use crate::orchestrator::ToolCallingOrchestrator;
use crate::retrieval_gateway::RetrievalGateway;
use cmmc_core::{CmmcConfig, ComplianceCatalog};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a front end needs, built once at startup
pub struct AppContext {
    catalog: ComplianceCatalog,
    chat_model: Option<Arc<dyn ChatModel>>,
    gateway: RetrievalGateway,
    generation: GenerationConfig,
}

impl AppContext {
    pub fn new(
        catalog: ComplianceCatalog,
        chat_model: Option<Arc<dyn ChatModel>>,
        gateway: RetrievalGateway,
    ) -> Self {
        Self {
            catalog,
            chat_model,
            gateway,
            generation: GenerationConfig::default(),
        }
    }

    /// Build the service handles from configuration.
    ///
    /// A handle that cannot be created is left unset; the failure is logged
    /// and surfaces later as a fixed message when the handle is needed.
    pub fn from_config(config: &CmmcConfig, catalog: ComplianceCatalog) -> Self {
        let chat_model = match ProviderFactory::create_chat_model(config) {
            Ok(model) => {
                info!(
                    "Chat model ready: {} ({})",
                    model.provider_name(),
                    model.model_name()
                );
                Some(model)
            }
            Err(e) => {
                warn!("Chat model unavailable: {:#}", e);
                None
            }
        };

        let retriever = match ProviderFactory::create_knowledge_retriever(config) {
            Ok(retriever) => Some(retriever),
            Err(e) => {
                warn!("Knowledge base retriever unavailable: {:#}", e);
                None
            }
        };

        let gateway = RetrievalGateway::new(retriever, config.knowledge_base.knowledge_base_id.clone())
            .with_top_k(config.knowledge_base.top_k);
        if !gateway.is_configured() {
            warn!("Knowledge base search is not configured");
        }

        Self::new(catalog, chat_model, gateway)
            .with_generation_config(ProviderFactory::generation_config(&config.bedrock))
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn catalog(&self) -> &ComplianceCatalog {
        &self.catalog
    }

    pub fn chat_model(&self) -> Option<&dyn ChatModel> {
        self.chat_model.as_deref()
    }

    pub fn gateway(&self) -> &RetrievalGateway {
        &self.gateway
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation
    }

    pub fn orchestrator(&self) -> ToolCallingOrchestrator<'_> {
        ToolCallingOrchestrator::new(self.chat_model(), &self.gateway)
            .with_generation_config(self.generation.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_without_credentials_or_kb() {
        let mut config = CmmcConfig::default();
        config.bedrock.api_key = None;
        config.knowledge_base.knowledge_base_id = None;

        let context = AppContext::from_config(&config, ComplianceCatalog::default());

        assert!(!context.gateway().is_configured());
        assert_eq!(context.gateway().top_k(), config.knowledge_base.top_k);
        assert!(!context.catalog().has_practice_data());
    }

    #[tokio::test]
    async fn test_orchestrator_without_chat_model() {
        let context = AppContext::new(
            ComplianceCatalog::default(),
            None,
            RetrievalGateway::new(None, None),
        );

        let (answer, tier, intent) = context.orchestrator().run("What is AC.L2-3.1.1?").await.into_parts();
        assert_eq!(answer, "AWS Bedrock client not initialized.");
        assert_eq!(tier, None);
        assert_eq!(intent, None);
    }
}
