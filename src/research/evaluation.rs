//! Evaluation backends for the research loop
//!
//! The coordinator only talks to [`EvaluationBackend`]; which variant is wired
//! in is decided once from `[research].backend`.
//!
//! - [`FixtureEvaluator`] - deterministic demo values, no network
//! - [`LlmEvaluator`] - every role played by a model through [`LLMClient`]

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::llm::client::{ChatMessage, LLMClient};
use crate::llm::dispatcher::error_sentinel;
use crate::types::{
    clamp_score, AppError, DiscussionRound, ExpertType, ExpertiseResult, JudgeDecision,
    ModelResponse, Result,
};
use crate::utils::toml_config::{EvaluatorKind, ResearchConfig};

/// Artifacts of the round under evaluation
#[derive(Debug, Clone, Copy)]
pub struct RoundContext<'a> {
    pub task: &'a str,
    /// 1-based
    pub round_number: u32,
    pub primary: &'a ModelResponse,
    pub expertise: &'a [ExpertiseResult],
}

#[async_trait]
pub trait EvaluationBackend: Send + Sync {
    /// Baseline answer for `prompt`
    async fn primary_response(&self, task: &str, prompt: &str) -> Result<ModelResponse>;

    /// One expert's verdict on `content`
    async fn critique(&self, expert: ExpertType, task: &str, content: &str)
        -> Result<ExpertiseResult>;

    /// Cross-model deliberation over the round so far
    async fn discuss(&self, round: RoundContext<'_>) -> Result<DiscussionRound>;

    /// Stop-or-continue verdict with an improved answer
    async fn judge(
        &self,
        round: RoundContext<'_>,
        discussion: &DiscussionRound,
    ) -> Result<JudgeDecision>;

    fn name(&self) -> &str;
}

/// Pick the evaluator described by `[research]`.
///
/// `live` without a model client degrades to the fixture backend.
pub fn create_evaluator(
    config: &ResearchConfig,
    client: Option<Arc<dyn LLMClient>>,
) -> Arc<dyn EvaluationBackend> {
    match (config.backend, client) {
        (EvaluatorKind::Live, Some(client)) => Arc::new(LlmEvaluator::new(client, config.clone())),
        (EvaluatorKind::Live, None) => {
            tracing::warn!("Live research backend requested without an API key, using fixtures");
            Arc::new(FixtureEvaluator)
        }
        (EvaluatorKind::Fixture, _) => Arc::new(FixtureEvaluator),
    }
}

// ============= Fixture =============

const FIXTURE_QUICKSORT: &str = "def quicksort(arr):
    if len(arr) <= 1:
        return arr
    pivot = arr[len(arr) // 2]
    left = [x for x in arr if x < pivot]
    middle = [x for x in arr if x == pivot]
    right = [x for x in arr if x > pivot]
    return quicksort(left) + middle + quicksort(right)";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Fixed demo values for every role.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureEvaluator;

#[async_trait]
impl EvaluationBackend for FixtureEvaluator {
    async fn primary_response(&self, task: &str, _prompt: &str) -> Result<ModelResponse> {
        Ok(ModelResponse {
            model_name: "gpt-4".to_string(),
            content: format!(
                "[Тестовый ответ] Задача: {}. Используем быструю сортировку с оптимизацией памяти.",
                task
            ),
            tokens_used: 150,
            latency_ms: 1200,
        })
    }

    async fn critique(
        &self,
        expert: ExpertType,
        _task: &str,
        _content: &str,
    ) -> Result<ExpertiseResult> {
        let result = match expert {
            ExpertType::Code => ExpertiseResult::new(
                ExpertType::Code,
                strings(&[
                    "Используется рекурсия, может быть проблема с глубиной",
                    "Нет обработки пустого массива",
                    "Можно оптимизировать память",
                ]),
                strings(&[
                    "Добавить итеративную реализацию",
                    "Проверить граничные случаи",
                    "Использовать in-place сортировку",
                ]),
                7.5,
            ),
            ExpertType::Prompt => ExpertiseResult::new(
                ExpertType::Prompt,
                strings(&[
                    "Промпт не уточняет тип сортировки",
                    "Не указаны требования к памяти",
                ]),
                strings(&[
                    "Добавить: 'реализуй быструю сортировку с оптимизацией памяти'",
                    "Уточнить: 'для больших массивов (до 1M элементов)'",
                ]),
                8.0,
            ),
            ExpertType::Analytics => ExpertiseResult::new(
                ExpertType::Analytics,
                strings(&[
                    "Сложность O(n log n) не указана",
                    "Нет сравнения с другими алгоритмами",
                ]),
                strings(&["Добавить анализ сложности", "Сравнить с сортировкой слиянием"]),
                6.5,
            ),
            ExpertType::Error => {
                return Err(AppError::InvalidInput(
                    "`error` is not a runnable expert".to_string(),
                ))
            }
        };
        Ok(result)
    }

    async fn discuss(&self, round: RoundContext<'_>) -> Result<DiscussionRound> {
        let mut responses = IndexMap::new();
        responses.insert(
            "gpt-4".to_string(),
            "Предлагаю использовать in-place quick sort...".to_string(),
        );
        responses.insert(
            "claude".to_string(),
            "Согласен, но добавим обработку дубликатов...".to_string(),
        );
        responses.insert(
            "deepseek".to_string(),
            "Можно оптимизировать выбор опорного элемента...".to_string(),
        );

        Ok(DiscussionRound {
            round_number: round.round_number,
            responses,
            consensus_reached: false,
            best_response: None,
        })
    }

    async fn judge(
        &self,
        _round: RoundContext<'_>,
        _discussion: &DiscussionRound,
    ) -> Result<JudgeDecision> {
        Ok(JudgeDecision {
            should_stop: true,
            reason: "Достигнуто хорошее качество, все эксперты довольны".to_string(),
            improved_response: FIXTURE_QUICKSORT.to_string(),
            score: 8.5,
            needs_more_rounds: false,
        })
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

// ============= Live =============

const PRIMARY_SYSTEM_PROMPT: &str =
    "Ты опытный инженер. Дай полный, точный и практичный ответ на задачу.";

const DISCUSSION_SYSTEM_PROMPT: &str =
    "Ты участник технического обсуждения. Кратко предложи, как улучшить ответ.";

fn expert_system_prompt(expert: ExpertType) -> &'static str {
    match expert {
        ExpertType::Code => "Ты эксперт по коду: корректность, граничные случаи, производительность.",
        ExpertType::Prompt => "Ты эксперт по промпт-инженерии: ясность и полнота постановки задачи.",
        ExpertType::Analytics => {
            "Ты эксперт-аналитик: сложность, обоснованность, сравнение с альтернативами."
        }
        ExpertType::Error => "Ты рецензент.",
    }
}

const VERDICT_INSTRUCTIONS: &str = "Ответь только JSON-объектом вида \
{\"findings\": [\"...\"], \"suggestions\": [\"...\"], \"score\": 0-10}.";

const JUDGE_INSTRUCTIONS: &str = "Ответь только JSON-объектом вида \
{\"should_stop\": true|false, \"reason\": \"...\", \"improved_response\": \"...\", \
\"score\": 0-10, \"needs_more_rounds\": true|false}.";

#[derive(Debug, Deserialize)]
struct CritiqueVerdict {
    #[serde(default)]
    findings: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct JudgeVerdict {
    #[serde(default)]
    should_stop: bool,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    improved_response: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    needs_more_rounds: bool,
}

/// Parse the first `{...}` block of a model reply.
///
/// Models wrap JSON in prose or code fences; everything outside the outermost
/// braces is ignored.
pub fn parse_json_block<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    let start = text
        .find('{')
        .ok_or_else(|| AppError::LLM("No JSON object in model reply".to_string()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| AppError::LLM("Unterminated JSON object in model reply".to_string()))?;

    serde_json::from_str(&text[start..=end])
        .map_err(|e| AppError::LLM(format!("Malformed verdict: {}", e)))
}

fn summarize_expertise(expertise: &[ExpertiseResult]) -> String {
    expertise
        .iter()
        .map(|e| {
            format!(
                "[{} {:.1}/10]\nНаходки: {}\nПредложения: {}",
                e.expert_type,
                e.score,
                e.findings.join("; "),
                e.suggestions.join("; ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Every role answered by a model.
pub struct LlmEvaluator {
    client: Arc<dyn LLMClient>,
    config: ResearchConfig,
}

impl LlmEvaluator {
    pub fn new(client: Arc<dyn LLMClient>, config: ResearchConfig) -> Self {
        Self { client, config }
    }

    async fn ask(&self, model: &str, system: &str, user: String) -> Result<(String, u32)> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        let completion = self
            .client
            .complete(model, &messages, self.config.temperature)
            .await?;
        let tokens = completion.total_tokens();
        Ok((completion.content, tokens))
    }
}

#[async_trait]
impl EvaluationBackend for LlmEvaluator {
    async fn primary_response(&self, _task: &str, prompt: &str) -> Result<ModelResponse> {
        let start = Instant::now();
        let (content, tokens_used) = self
            .ask(&self.config.primary_model, PRIMARY_SYSTEM_PROMPT, prompt.to_string())
            .await?;

        Ok(ModelResponse {
            model_name: self.config.primary_model.clone(),
            content,
            tokens_used,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn critique(
        &self,
        expert: ExpertType,
        task: &str,
        content: &str,
    ) -> Result<ExpertiseResult> {
        let user = format!(
            "Задача:\n{}\n\nОтвет для проверки:\n{}\n\n{}",
            task, content, VERDICT_INSTRUCTIONS
        );
        let (reply, _) = self
            .ask(&self.config.expert_model, expert_system_prompt(expert), user)
            .await?;

        let verdict: CritiqueVerdict = parse_json_block(&reply)?;
        Ok(ExpertiseResult::new(
            expert,
            verdict.findings,
            verdict.suggestions,
            verdict.score,
        ))
    }

    async fn discuss(&self, round: RoundContext<'_>) -> Result<DiscussionRound> {
        let user = format!(
            "Задача:\n{}\n\nТекущий ответ:\n{}\n\nЭкспертиза:\n{}",
            round.task,
            round.primary.content,
            summarize_expertise(round.expertise)
        );

        let calls = self.config.discussion_models.iter().map(|model| {
            let user = user.clone();
            async move {
                match self.ask(model, DISCUSSION_SYSTEM_PROMPT, user).await {
                    Ok((reply, _)) => reply,
                    Err(e) => {
                        tracing::warn!(model = %model, error = %e, "Discussion call failed");
                        error_sentinel(model)
                    }
                }
            }
        });
        let replies = join_all(calls).await;

        let responses: IndexMap<String, String> = self
            .config
            .discussion_models
            .iter()
            .cloned()
            .zip(replies)
            .collect();

        Ok(DiscussionRound {
            round_number: round.round_number,
            responses,
            consensus_reached: false,
            best_response: None,
        })
    }

    async fn judge(
        &self,
        round: RoundContext<'_>,
        discussion: &DiscussionRound,
    ) -> Result<JudgeDecision> {
        let opinions = discussion
            .responses
            .iter()
            .map(|(model, reply)| format!("{}: {}", model, reply))
            .collect::<Vec<_>>()
            .join("\n");
        let user = format!(
            "Задача:\n{}\n\nТекущий ответ:\n{}\n\nЭкспертиза:\n{}\n\nОбсуждение:\n{}\n\n\
             Оцени ответ, реши, нужен ли ещё раунд, и дай улучшенную версию.\n{}",
            round.task,
            round.primary.content,
            summarize_expertise(round.expertise),
            opinions,
            JUDGE_INSTRUCTIONS
        );
        let (reply, _) = self
            .ask(&self.config.judge_model, "Ты строгий судья.", user)
            .await?;

        let verdict: JudgeVerdict = parse_json_block(&reply)?;
        let improved_response = if verdict.improved_response.trim().is_empty() {
            round.primary.content.clone()
        } else {
            verdict.improved_response
        };

        Ok(JudgeDecision {
            should_stop: verdict.should_stop,
            reason: verdict.reason,
            improved_response,
            score: clamp_score(verdict.score),
            needs_more_rounds: verdict.needs_more_rounds,
        })
    }

    fn name(&self) -> &str {
        "live"
    }
}
