use crate::knowledge_base::KnowledgeRetriever;
use crate::llm_provider::*;
use anyhow::{anyhow, Result};
use cmmc_core::config_manager::{BedrockSettings, CmmcConfig};
use std::sync::Arc;

#[cfg(feature = "bedrock")]
use crate::bedrock_client::{BedrockAuth, BEDROCK_API_KEY_ENV};
#[cfg(feature = "bedrock")]
use crate::bedrock_knowledge_base::{BedrockKnowledgeBase, BedrockKnowledgeBaseConfig};
#[cfg(feature = "bedrock")]
use crate::bedrock_provider::{BedrockChatProvider, BedrockConfig};

/// Factory for the service handles built from configuration
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create the chat model handle
    pub fn create_chat_model(config: &CmmcConfig) -> Result<Arc<dyn ChatModel>> {
        #[cfg(feature = "bedrock")]
        {
            let settings = &config.bedrock;
            let provider = BedrockChatProvider::new(BedrockConfig {
                auth: Self::auth(settings)?,
                endpoint: settings.runtime_endpoint(),
                model_id: settings.model_id.clone(),
                timeout_secs: settings.timeout_secs,
                max_retries: settings.max_retries,
            })?;
            Ok(Arc::new(provider))
        }

        #[cfg(not(feature = "bedrock"))]
        {
            let _ = config;
            Err(anyhow!(
                "Chat model requires the 'bedrock' feature to be enabled"
            ))
        }
    }

    /// Create the knowledge-base search handle
    pub fn create_knowledge_retriever(config: &CmmcConfig) -> Result<Arc<dyn KnowledgeRetriever>> {
        #[cfg(feature = "bedrock")]
        {
            let settings = &config.bedrock;
            let retriever = BedrockKnowledgeBase::new(BedrockKnowledgeBaseConfig {
                auth: Self::auth(settings)?,
                endpoint: config.knowledge_base.agent_runtime_endpoint(&settings.region),
                timeout_secs: settings.timeout_secs,
                max_retries: settings.max_retries,
            })?;
            Ok(Arc::new(retriever))
        }

        #[cfg(not(feature = "bedrock"))]
        {
            let _ = config;
            Err(anyhow!(
                "Knowledge base retrieval requires the 'bedrock' feature to be enabled"
            ))
        }
    }

    /// Generation parameters derived from the Bedrock settings
    pub fn generation_config(settings: &BedrockSettings) -> GenerationConfig {
        GenerationConfig {
            temperature: Some(settings.temperature),
            max_tokens: Some(settings.max_tokens),
            ..GenerationConfig::default()
        }
    }

    /// IAM credentials sign with SigV4; a Bedrock API key is the fallback
    #[cfg(feature = "bedrock")]
    fn auth(settings: &BedrockSettings) -> Result<BedrockAuth> {
        if settings.has_iam_credentials() {
            let access_key_id = settings.access_key_id.clone().unwrap_or_default();
            let secret_access_key = settings.secret_access_key.clone().unwrap_or_default();
            let session_token = settings.session_token.clone().filter(|t| !t.is_empty());
            return Ok(BedrockAuth::sigv4(
                access_key_id,
                secret_access_key,
                session_token,
                settings.region.clone(),
            ));
        }

        settings
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var(BEDROCK_API_KEY_ENV).ok())
            .filter(|key| !key.is_empty())
            .map(BedrockAuth::ApiKey)
            .ok_or_else(|| {
                anyhow!(
                    "No Bedrock credentials found. Set AWS_ACCESS_KEY_ID and \
                     AWS_SECRET_ACCESS_KEY, or {} for an API key",
                    BEDROCK_API_KEY_ENV
                )
            })
    }

    /// Get a list of supported providers (based on enabled features)
    pub fn supported_providers() -> Vec<&'static str> {
        #[allow(unused_mut)]
        let mut providers = Vec::new();

        #[cfg(feature = "bedrock")]
        providers.push("bedrock");

        providers
    }
}
