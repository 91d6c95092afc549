//! Parallel fan-out of one prompt to every configured model backend.
//!
//! Each backend gets exactly one call and exactly one [`ModelCallRecord`],
//! whatever the outcome. A failing backend yields the sentinel
//! `[ERROR: <backend> failed]` instead of an error, so the returned map always
//! holds one entry per configured backend, in configured order.
//!
//! Without a client (no API key), calls are simulated: a marked placeholder
//! is returned and recorded with zero tokens, keeping telemetry uniform.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use indexmap::IndexMap;
use tokio::time::timeout;

use crate::db::QueryRecorder;
use crate::llm::client::{ChatMessage, Completion, LLMClient};
use crate::types::{AppError, CallStatus, ModelCallRecord, Result};
use crate::utils::toml_config::DispatchConfig;
use crate::utils::truncate_chars;

/// System message for grounded analysis
pub const ANALYST_SYSTEM_PROMPT: &str = "Ты аналитик, работающий строго по тексту. Не выдумывай.";

const ANALYSIS_TEMPLATE: &str = "На основе следующего материала:
{context}

Выполни строгий анализ:

1. Ключевые технические параметры (только из текста):
   - Извлеки числовые значения, единицы измерения
   - Укажи технические характеристики, если есть

2. Недостающие данные:
   - Что из важного не указано в тексте?
   - Какие параметры требуют уточнения?

3. Источники неопределённости:
   - Какие утверждения требуют проверки?
   - Где возможны ошибки?

ВАЖНО:
- Используй ТОЛЬКО информацию из предоставленного текста
- Не добавляй свои знания
- Если данных нет, напиши \"нет данных в источнике\"
";

/// Sentinel text substituted for a failed backend
pub fn error_sentinel(model: &str) -> String {
    format!("[ERROR: {} failed]", model)
}

/// Marked placeholder returned when no API key is configured
pub fn placeholder_response(model: &str) -> String {
    format!(
        "[MOCK] Анализ от {}\n\nКлючевые параметры: 45% эффективность\nНедостающие данные: стоимость, срок службы\nНеопределённость: зависит от погодных условий",
        model
    )
}

pub struct ModelDispatcher {
    client: Option<Arc<dyn LLMClient>>,
    recorder: Arc<dyn QueryRecorder>,
    config: DispatchConfig,
}

impl ModelDispatcher {
    /// `client = None` runs every call in simulated mode.
    pub fn new(
        client: Option<Arc<dyn LLMClient>>,
        recorder: Arc<dyn QueryRecorder>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            client,
            recorder,
            config,
        }
    }

    pub fn models(&self) -> &[String] {
        &self.config.models
    }

    pub fn is_simulated(&self) -> bool {
        self.client.is_none()
    }

    /// Analysis prompt with the context cut to the configured budget
    pub fn build_prompt(&self, context: &str) -> String {
        ANALYSIS_TEMPLATE.replace(
            "{context}",
            truncate_chars(context, self.config.max_prompt_chars),
        )
    }

    /// Send `prompt` to every configured backend concurrently.
    pub async fn dispatch(&self, query_id: &str, prompt: &str) -> IndexMap<String, String> {
        let calls = self
            .config
            .models
            .iter()
            .map(|model| self.call_model(query_id, model, prompt));
        let results = join_all(calls).await;

        self.config.models.iter().cloned().zip(results).collect()
    }

    async fn call_model(&self, query_id: &str, model: &str, prompt: &str) -> String {
        let start = Instant::now();

        let Some(client) = self.client.as_ref() else {
            let response = placeholder_response(model);
            self.record(ModelCallRecord {
                query_id: query_id.to_string(),
                model_name: model.to_string(),
                prompt: prompt.to_string(),
                response: response.clone(),
                prompt_tokens: Some(0),
                completion_tokens: Some(0),
                total_tokens: Some(0),
                latency_ms: start.elapsed().as_millis() as u64,
                status: CallStatus::Success,
                error_message: None,
            })
            .await;
            return response;
        };

        let messages = [
            ChatMessage::system(ANALYST_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        let outcome: Result<Completion> = match timeout(
            self.config.timeout(),
            client.complete(model, &messages, self.config.temperature),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::LLM(format!(
                "timed out after {}s",
                self.config.timeout_secs
            ))),
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(completion) => {
                tracing::info!(
                    model = %model,
                    latency_ms,
                    total_tokens = completion.total_tokens(),
                    "Model responded"
                );
                self.record(ModelCallRecord {
                    query_id: query_id.to_string(),
                    model_name: model.to_string(),
                    prompt: prompt.to_string(),
                    response: completion.content.clone(),
                    prompt_tokens: completion.usage.map(|u| u.prompt_tokens),
                    completion_tokens: completion.usage.map(|u| u.completion_tokens),
                    total_tokens: completion.usage.map(|u| u.total_tokens),
                    latency_ms,
                    status: CallStatus::Success,
                    error_message: None,
                })
                .await;
                completion.content
            }
            Err(e) => {
                tracing::error!(model = %model, error = %e, "Model call failed");
                self.record(ModelCallRecord {
                    query_id: query_id.to_string(),
                    model_name: model.to_string(),
                    prompt: prompt.to_string(),
                    response: String::new(),
                    prompt_tokens: None,
                    completion_tokens: None,
                    total_tokens: None,
                    latency_ms,
                    status: CallStatus::Error,
                    error_message: Some(e.to_string()),
                })
                .await;
                error_sentinel(model)
            }
        }
    }

    async fn record(&self, record: ModelCallRecord) {
        if let Err(e) = self.recorder.record_model_call(&record).await {
            tracing::warn!(
                model = %record.model_name,
                error = %e,
                "Failed to record model call"
            );
        }
    }
}
