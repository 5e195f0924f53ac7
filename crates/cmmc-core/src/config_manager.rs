use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for the CMMC objective parser
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CmmcConfig {
    /// Bedrock chat model settings
    #[serde(default)]
    pub bedrock: BedrockSettings,

    /// Knowledge base used by the retrieval tool
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseSettings,

    /// Location of the lookup tables
    #[serde(default)]
    pub data: DataConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bedrock runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockSettings {
    /// AWS region hosting the model and the knowledge base
    #[serde(default = "default_region")]
    pub region: String,

    /// Converse model identifier
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// IAM access key id; with the secret key, requests are SigV4-signed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,

    /// Session token for temporary credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    /// Bedrock API key, sent as a bearer token when no IAM credentials are set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override for `https://bedrock-runtime.{region}.amazonaws.com`
    #[serde(default)]
    pub runtime_endpoint: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Transport-level retries per request (0 = single attempt)
    #[serde(default)]
    pub max_retries: u32,

    /// Maximum tokens to generate per model turn
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for BedrockSettings {
    fn default() -> Self {
        Self {
            region: default_region(),
            model_id: default_model_id(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            api_key: None,
            runtime_endpoint: None,
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl BedrockSettings {
    /// Both halves of an IAM key pair are set
    pub fn has_iam_credentials(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        set(&self.access_key_id) && set(&self.secret_access_key)
    }

    pub fn runtime_endpoint(&self) -> String {
        self.runtime_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", self.region))
    }
}

/// Knowledge base configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseSettings {
    /// Knowledge base identifier; retrieval reports missing configuration when unset
    #[serde(default)]
    pub knowledge_base_id: Option<String>,

    /// Override for `https://bedrock-agent-runtime.{region}.amazonaws.com`
    #[serde(default)]
    pub agent_runtime_endpoint: Option<String>,

    /// Number of passages requested per search
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl KnowledgeBaseSettings {
    pub fn agent_runtime_endpoint(&self, region: &str) -> String {
        self.agent_runtime_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-agent-runtime.{}.amazonaws.com", region))
    }
}

impl Default for KnowledgeBaseSettings {
    fn default() -> Self {
        Self {
            knowledge_base_id: None,
            agent_runtime_endpoint: None,
            top_k: default_top_k(),
        }
    }
}

/// Lookup table locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_practices_file")]
    pub practices_file: String,

    #[serde(default = "default_objectives_file")]
    pub objectives_file: String,

    #[serde(default = "default_assessments_file")]
    pub assessments_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            practices_file: default_practices_file(),
            objectives_file: default_objectives_file(),
            assessments_file: default_assessments_file(),
        }
    }
}

impl DataConfig {
    pub fn practices_path(&self) -> PathBuf {
        self.dir.join(&self.practices_file)
    }

    pub fn objectives_path(&self) -> PathBuf {
        self.dir.join(&self.objectives_file)
    }

    pub fn assessments_path(&self) -> PathBuf {
        self.dir.join(&self.assessments_file)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_model_id() -> String {
    "anthropic.claude-3-haiku-20240307-v1:0".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_tokens() -> usize {
    2048
}
fn default_temperature() -> f32 {
    0.0
}
fn default_top_k() -> usize {
    5
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_practices_file() -> String {
    "cmmc-practices.json".to_string()
}
fn default_objectives_file() -> String {
    "cmmc-objectives.json".to_string()
}
fn default_assessments_file() -> String {
    "cmmc-assessments.json".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with layered defaults
pub struct ConfigManager {
    config: CmmcConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.cmmc.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        info!("Configuration loaded");
        match config_path {
            Some(ref path) => info!(path = %path.display(), "Config file"),
            None => info!("Config file: NONE (using defaults)"),
        }
        info!(
            region = %config.bedrock.region,
            model = %config.bedrock.model_id,
            knowledge_base = config.knowledge_base.knowledge_base_id.as_deref().unwrap_or("<unset>"),
            "Bedrock settings"
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Wrap an already-built configuration after validating it
    pub fn from_config(config: CmmcConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".cmmc.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .cmmc.env: {}", e);
                } else {
                    info!("Loaded .cmmc.env from home directory");
                }
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.cmmc.toml (current directory)
    /// 2. ~/.cmmc/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(CmmcConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".cmmc.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".cmmc").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((CmmcConfig::default(), None))
    }

    /// Read TOML config file
    pub fn read_toml_file(path: &Path) -> Result<CmmcConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(config: CmmcConfig) -> CmmcConfig {
        Self::apply_overrides_from(config, |key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(mut config: CmmcConfig, lookup: F) -> CmmcConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        // Bedrock
        if let Some(region) = lookup("AWS_REGION") {
            config.bedrock.region = region;
        }
        if let Some(model) = lookup("BEDROCK_MODEL_ID") {
            config.bedrock.model_id = model;
        }
        if let Some(key_id) = lookup("AWS_ACCESS_KEY_ID") {
            config.bedrock.access_key_id = Some(key_id);
        }
        if let Some(secret) = lookup("AWS_SECRET_ACCESS_KEY") {
            config.bedrock.secret_access_key = Some(secret);
        }
        if let Some(token) = lookup("AWS_SESSION_TOKEN") {
            config.bedrock.session_token = Some(token);
        }
        if let Some(key) = lookup("AWS_BEARER_TOKEN_BEDROCK") {
            config.bedrock.api_key = Some(key);
        }
        if let Some(endpoint) = lookup("BEDROCK_RUNTIME_ENDPOINT") {
            config.bedrock.runtime_endpoint = Some(endpoint);
        }

        // Knowledge base
        if let Some(kb_id) = lookup("BEDROCK_KB_ID") {
            config.knowledge_base.knowledge_base_id = Some(kb_id);
        }
        if let Some(endpoint) = lookup("BEDROCK_AGENT_RUNTIME_ENDPOINT") {
            config.knowledge_base.agent_runtime_endpoint = Some(endpoint);
        }
        if let Some(top_k) = lookup("CMMC_KB_TOP_K") {
            if let Ok(k) = top_k.parse() {
                config.knowledge_base.top_k = k;
            }
        }

        // Data
        if let Some(dir) = lookup("CMMC_DATA_DIR") {
            config.data.dir = PathBuf::from(dir);
        }

        // Logging
        if let Some(level) = lookup("CMMC_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = lookup("CMMC_LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }

    /// Validate configuration
    pub fn validate_config(config: &CmmcConfig) -> Result<(), ConfigError> {
        if config.bedrock.region.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Bedrock region must not be empty".to_string(),
            ));
        }

        if config.bedrock.model_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Bedrock model id must not be empty".to_string(),
            ));
        }

        if config.knowledge_base.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "Knowledge base top_k must be at least 1".to_string(),
            ));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &CmmcConfig {
        &self.config
    }

    /// Mutable access for command-line overrides applied after loading
    pub fn config_mut(&mut self) -> &mut CmmcConfig {
        &mut self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = CmmcConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = CmmcConfig::default();
        assert_eq!(config.bedrock.region, "us-east-1");
        assert_eq!(
            config.bedrock.model_id,
            "anthropic.claude-3-haiku-20240307-v1:0"
        );
        assert_eq!(config.knowledge_base.top_k, 5);
        assert!(config.knowledge_base.knowledge_base_id.is_none());
        assert_eq!(config.bedrock.max_retries, 0);
    }

    #[test]
    fn test_config_validation() {
        let config = CmmcConfig::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        let mut bad_config = config.clone();
        bad_config.logging.level = "verbose".to_string();
        assert!(ConfigManager::validate_config(&bad_config).is_err());

        let mut bad_config = config;
        bad_config.knowledge_base.top_k = 0;
        assert!(ConfigManager::validate_config(&bad_config).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AWS_REGION", "eu-west-1"),
            ("BEDROCK_KB_ID", "KB123"),
            ("BEDROCK_MODEL_ID", "anthropic.claude-3-sonnet"),
            ("CMMC_KB_TOP_K", "8"),
            ("CMMC_DATA_DIR", "/srv/cmmc"),
        ]
        .into_iter()
        .collect();

        let config = ConfigManager::apply_overrides_from(CmmcConfig::default(), |key| {
            vars.get(key).map(|v| v.to_string())
        });

        assert_eq!(config.bedrock.region, "eu-west-1");
        assert_eq!(
            config.knowledge_base.knowledge_base_id.as_deref(),
            Some("KB123")
        );
        assert_eq!(config.bedrock.model_id, "anthropic.claude-3-sonnet");
        assert_eq!(config.knowledge_base.top_k, 8);
        assert_eq!(config.data.dir, PathBuf::from("/srv/cmmc"));
        assert_eq!(
            config.bedrock.runtime_endpoint(),
            "https://bedrock-runtime.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_iam_credentials_from_env() {
        let config = ConfigManager::apply_overrides_from(CmmcConfig::default(), |key| match key {
            "AWS_ACCESS_KEY_ID" => Some("AKIDEXAMPLE".to_string()),
            "AWS_SECRET_ACCESS_KEY" => Some("wJalrXUtnFEMI/K7MDENG".to_string()),
            _ => None,
        });

        assert!(config.bedrock.has_iam_credentials());
        assert_eq!(config.bedrock.access_key_id.as_deref(), Some("AKIDEXAMPLE"));
        assert!(config.bedrock.session_token.is_none());
        assert!(!CmmcConfig::default().bedrock.has_iam_credentials());
    }

    #[test]
    fn test_unparseable_top_k_is_ignored() {
        let config = ConfigManager::apply_overrides_from(CmmcConfig::default(), |key| {
            (key == "CMMC_KB_TOP_K").then(|| "many".to_string())
        });
        assert_eq!(config.knowledge_base.top_k, 5);
    }
}
