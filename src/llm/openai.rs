use std::time::Duration;

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;

use crate::llm::client::{ChatMessage, ChatRole, Completion, LLMClient, TokenUsage};
use crate::types::{AppError, Result};

/// Client for OpenAI-compatible chat-completions endpoints (OpenRouter, OpenAI, vLLM, ...)
pub struct OpenAICompatClient {
    client: Client<OpenAIConfig>,
    api_base: String,
}

impl OpenAICompatClient {
    pub fn new(api_key: String, api_base: String, timeout: Duration) -> Result<Self> {
        let api_base = api_base.trim_end_matches('/').to_string();
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base.clone());

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::LLM(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client: Client::with_config(config).with_http_client(http),
            api_base,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

fn to_request_message(message: &ChatMessage) -> ChatCompletionRequestMessage {
    let content = message.content.clone();
    match message.role {
        ChatRole::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessage::from(content),
        ),
        ChatRole::User => {
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(content))
        }
        ChatRole::Assistant => ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessage::from(content),
        ),
    }
}

#[async_trait]
impl LLMClient for OpenAICompatClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<Completion> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages.iter().map(to_request_message).collect::<Vec<_>>())
            .temperature(temperature)
            .build()
            .map_err(|e| AppError::LLM(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::LLM(format!("{} failed: {}", model, e)))?;

        let usage = response.usage.map(|usage| TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        });

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::LLM(format!("No response from {}", model)))?;

        let completion = Completion::new(content);
        Ok(match usage {
            Some(usage) => completion.with_usage(usage),
            None => completion,
        })
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }
}
