//! LLM client abstraction
//!
//! Every model backend is reached through [`LLMClient::complete`], which takes
//! the backend id per call. One client therefore serves every configured model
//! of a provider (OpenRouter routes `openai/gpt-4`, `deepseek/deepseek-chat`, ...
//! through the same endpoint).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Result;
use crate::utils::toml_config::SokratConfig;

/// Generic LLM client trait for provider abstraction
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Run one chat completion against `model`
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<Completion>;

    /// Short provider name for logs
    fn provider_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Text and usage of one completion
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    /// Absent when the provider does not report usage
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Total tokens, zero when unreported
    pub fn total_tokens(&self) -> u32 {
        self.usage.map(|u| u.total_tokens).unwrap_or(0)
    }
}

/// Provider selection for runtime construction
#[derive(Debug, Clone)]
pub enum Provider {
    /// Any endpoint speaking the OpenAI chat-completions format (OpenRouter by default)
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAICompat {
    ///     api_key: "sk-or-...".to_string(),
    ///     api_base: "https://openrouter.ai/api/v1".to_string(),
    ///     timeout: Duration::from_secs(30),
    /// };
    /// ```
    OpenAICompat {
        api_key: String,
        api_base: String,
        timeout: Duration,
    },
}

impl Provider {
    /// Build the provider from the `[dispatch]` section.
    ///
    /// Returns `None` when the API key is missing or still the template
    /// placeholder; callers then run in simulated mode without touching the network.
    pub fn from_config(config: &SokratConfig) -> Option<Self> {
        let api_key = config.dispatch_api_key()?;
        Some(Provider::OpenAICompat {
            api_key,
            api_base: config.dispatch.api_base.clone(),
            timeout: config.dispatch.timeout(),
        })
    }

    /// Create a client for this provider
    pub fn create_client(&self) -> Result<Arc<dyn LLMClient>> {
        match self {
            Provider::OpenAICompat {
                api_key,
                api_base,
                timeout,
            } => Ok(Arc::new(super::openai::OpenAICompatClient::new(
                api_key.clone(),
                api_base.clone(),
                *timeout,
            )?)),
        }
    }
}
