//! TOML-based configuration for Sokrat
//!
//! All runtime settings live in a single TOML file (`sokrat.toml`). Secrets are
//! never written to the file; instead each `*_env` field names the environment
//! variable that holds the value, resolved when components are constructed.
//!
//! A missing file is not an error: every section has defaults, so a bare
//! `sokrat-server` runs with fixture search and simulated model responses.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::ExpertType;

/// Root configuration structure loaded from sokrat.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SokratConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub research: ResearchConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ============= Logging Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Optional log file; rotated daily
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("logs/sokrat.log"))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: default_log_file(),
        }
    }
}

// ============= Database Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Local database path, or `:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Environment variable for Turso URL (optional cloud config)
    pub turso_url_env: Option<String>,

    /// Environment variable for Turso auth token
    pub turso_token_env: Option<String>,
}

fn default_database_url() -> String {
    "./data/sokrat.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            turso_url_env: None,
            turso_token_env: None,
        }
    }
}

// ============= Search Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    #[default]
    Tavily,
    DuckDuckGo,
    Fixture,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub provider: SearchProviderKind,

    /// Environment variable containing the Tavily API key
    #[serde(default = "default_tavily_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_search_results")]
    pub max_results: usize,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_exclude_domains")]
    pub exclude_domains: Vec<String>,
}

fn default_tavily_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_max_search_results() -> usize {
    8
}

fn default_search_timeout() -> u64 {
    10
}

fn default_exclude_domains() -> Vec<String> {
    [
        "forum",
        "reddit.com",
        "quora.com",
        "youtube.com",
        "facebook.com",
        "twitter.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProviderKind::default(),
            api_key_env: default_tavily_key_env(),
            max_results: default_max_search_results(),
            timeout_secs: default_search_timeout(),
            exclude_domains: default_exclude_domains(),
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============= Fetch Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum number of pages fetched at once
    #[serde(default = "default_fetch_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Raw page content retained per document
    #[serde(default = "default_max_raw_chars")]
    pub max_raw_chars: usize,

    /// Extracted text kept per document before the truncation marker
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Response bytes read per page; the rest of the body is never downloaded
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_fetch_concurrency() -> usize {
    3
}

fn default_request_timeout() -> u64 {
    15
}

fn default_max_raw_chars() -> usize {
    50_000
}

fn default_max_text_chars() -> usize {
    20_000
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; SokratBot/1.0)".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_fetch_concurrency(),
            request_timeout_secs: default_request_timeout(),
            max_raw_chars: default_max_raw_chars(),
            max_text_chars: default_max_text_chars(),
            max_body_bytes: default_max_body_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Override the concurrency limit
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Override the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Override the extracted text budget
    pub fn with_max_text_chars(mut self, max: usize) -> Self {
        self.max_text_chars = max;
        self
    }

    /// Override the download cap
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}

// ============= Dispatch Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Environment variable containing the chat-completions API key
    #[serde(default = "default_dispatch_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Backends every analysis prompt is sent to, in output order
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Context characters included in the analysis prompt
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,

    #[serde(default = "default_dispatch_timeout")]
    pub timeout_secs: u64,
}

fn default_dispatch_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_api_base() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_models() -> Vec<String> {
    vec![
        "openai/gpt-4".to_string(),
        "deepseek/deepseek-chat".to_string(),
        "qwen/qwen-2.5-72b-instruct".to_string(),
    ]
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_prompt_chars() -> usize {
    10_000
}

fn default_dispatch_timeout() -> u64 {
    30
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_dispatch_key_env(),
            api_base: default_api_base(),
            models: default_models(),
            temperature: default_temperature(),
            max_prompt_chars: default_max_prompt_chars(),
            timeout_secs: default_dispatch_timeout(),
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Replace the configured backend list
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }
}

// ============= Pipeline Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Characters of each document placed into the shared context
    #[serde(default = "default_max_document_chars")]
    pub max_document_chars: usize,
}

fn default_max_document_chars() -> usize {
    5_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_document_chars: default_max_document_chars(),
        }
    }
}

// ============= Research Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorKind {
    #[default]
    Fixture,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    #[serde(default)]
    pub backend: EvaluatorKind,

    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    #[serde(default = "default_experts")]
    pub experts: Vec<String>,

    #[serde(default = "default_primary_model")]
    pub primary_model: String,

    #[serde(default = "default_primary_model")]
    pub expert_model: String,

    #[serde(default = "default_primary_model")]
    pub judge_model: String,

    #[serde(default = "default_models")]
    pub discussion_models: Vec<String>,

    #[serde(default = "default_research_temperature")]
    pub temperature: f32,
}

fn default_max_rounds() -> u32 {
    3
}

fn default_experts() -> Vec<String> {
    ExpertType::defaults()
        .iter()
        .map(|e| e.as_str().to_string())
        .collect()
}

fn default_primary_model() -> String {
    "openai/gpt-4".to_string()
}

fn default_research_temperature() -> f32 {
    0.3
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            backend: EvaluatorKind::default(),
            max_rounds: default_max_rounds(),
            experts: default_experts(),
            primary_model: default_primary_model(),
            expert_model: default_primary_model(),
            judge_model: default_primary_model(),
            discussion_models: default_models(),
            temperature: default_research_temperature(),
        }
    }
}

impl ResearchConfig {
    /// Parsed expert list. Unknown names are rejected by [`SokratConfig::validate`].
    pub fn expert_types(&self) -> Result<Vec<ExpertType>, ConfigError> {
        self.experts
            .iter()
            .map(|name| {
                name.parse::<ExpertType>()
                    .ok()
                    .filter(|e| *e != ExpertType::Error)
                    .ok_or_else(|| {
                        ConfigError::ValidationError(format!("Unknown expert '{}'", name))
                    })
            })
            .collect()
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),
}

impl From<ConfigError> for crate::types::AppError {
    fn from(err: ConfigError) -> Self {
        crate::types::AppError::Configuration(err.to_string())
    }
}

impl SokratConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)?;
            Self::from_toml(&content)?
        } else {
            tracing::warn!("Config file {:?} not found, using defaults", path);
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.concurrency must be at least 1".to_string(),
            ));
        }

        if self.dispatch.models.is_empty() {
            return Err(ConfigError::ValidationError(
                "dispatch.models must name at least one backend".to_string(),
            ));
        }

        if self.research.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "research.max_rounds must be at least 1".to_string(),
            ));
        }

        if self.research.experts.is_empty() {
            return Err(ConfigError::ValidationError(
                "research.experts must name at least one expert".to_string(),
            ));
        }
        self.research.expert_types()?;

        if let Some(ref env) = self.database.turso_url_env {
            self.validate_env_var(env)?;
        }
        if let Some(ref env) = self.database.turso_token_env {
            self.validate_env_var(env)?;
        }

        Ok(())
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    /// Resolve a secret from the environment. Empty values and the
    /// `your-...-key-here` template placeholders count as absent.
    pub fn resolve_env(&self, env_name: &str) -> Option<String> {
        resolve_secret(env_name)
    }

    /// API key for the chat-completions endpoint, if configured
    pub fn dispatch_api_key(&self) -> Option<String> {
        self.resolve_env(&self.dispatch.api_key_env)
    }

    /// API key for Tavily search, if configured
    pub fn search_api_key(&self) -> Option<String> {
        self.resolve_env(&self.search.api_key_env)
    }
}

/// Read an environment variable, treating blanks and template placeholders as unset.
pub fn resolve_secret(env_name: &str) -> Option<String> {
    std::env::var(env_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !is_placeholder_secret(v))
}

fn is_placeholder_secret(value: &str) -> bool {
    value.is_empty() || (value.starts_with("your-") && value.ends_with("-here"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> String {
        r#"
[server]
host = "0.0.0.0"
port = 9000

[logging]
level = "debug"
format = "json"

[database]
url = ":memory:"

[search]
provider = "fixture"
max_results = 5

[fetch]
concurrency = 2
max_text_chars = 1000

[dispatch]
models = ["a/one", "b/two"]
temperature = 0.2

[research]
backend = "live"
max_rounds = 2
experts = ["code", "analytics"]
"#
        .to_string()
    }

    #[test]
    fn test_parse_config() {
        let config = SokratConfig::from_toml(&create_test_config()).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.database.url, ":memory:");
        assert_eq!(config.search.provider, SearchProviderKind::Fixture);
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.fetch.concurrency, 2);
        assert_eq!(config.fetch.max_text_chars, 1000);
        assert_eq!(config.fetch.max_raw_chars, 50_000);
        assert_eq!(config.dispatch.models, vec!["a/one", "b/two"]);
        assert_eq!(config.research.backend, EvaluatorKind::Live);
        assert_eq!(
            config.research.expert_types().unwrap(),
            vec![ExpertType::Code, ExpertType::Analytics]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SokratConfig::from_toml("").unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.fetch.concurrency, 3);
        assert_eq!(config.fetch.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.dispatch.models.len(), 3);
        assert_eq!(config.dispatch.max_prompt_chars, 10_000);
        assert_eq!(config.pipeline.max_document_chars, 5_000);
        assert_eq!(config.research.max_rounds, 3);
        assert_eq!(config.research.expert_types().unwrap(), ExpertType::defaults());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut config = SokratConfig::default();
        config.fetch.concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_unknown_expert() {
        let mut config = SokratConfig::default();
        config.research.experts = vec!["code".to_string(), "design".to_string()];
        assert!(config.validate().is_err());

        config.research.experts = vec!["error".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_models_and_zero_rounds() {
        let mut config = SokratConfig::default();
        config.dispatch.models.clear();
        assert!(config.validate().is_err());

        let mut config = SokratConfig::default();
        config.research.max_rounds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = SokratConfig::load("/nonexistent/sokrat.toml").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_placeholder_secrets_are_absent() {
        assert!(is_placeholder_secret(""));
        assert!(is_placeholder_secret("your-openrouter-key-here"));
        assert!(!is_placeholder_secret("sk-or-123"));
    }

    #[test]
    fn test_builder_overrides() {
        let fetch = FetchConfig::default()
            .with_concurrency(7)
            .with_request_timeout(Duration::from_secs(2))
            .with_max_text_chars(10);
        assert_eq!(fetch.concurrency, 7);
        assert_eq!(fetch.request_timeout_secs, 2);
        assert_eq!(fetch.max_text_chars, 10);

        let dispatch = DispatchConfig::default().with_models(["x", "y"]);
        assert_eq!(dispatch.models, vec!["x", "y"]);
    }
}
