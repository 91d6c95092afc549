//! Test doubles shared across integration tests.
//!
//! Every collaborator of the pipeline and the research loop has a double here,
//! so tests run without network access.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;

use sokrat::db::QueryRecorder;
use sokrat::llm::{ChatMessage, Completion, LLMClient, TokenUsage};
use sokrat::research::{EvaluationBackend, FixtureEvaluator, RoundContext};
use sokrat::tools::{FetchedPage, PageFetcher, SearchBackend};
use sokrat::types::{
    AppError, DiscussionRound, ExpertType, ExpertiseResult, JudgeDecision, ModelCallRecord,
    ModelResponse, ParsedDocument, QueryStats, QueryStatus, Result, SourceDocument,
};

// ============= LLM =============

/// Chat client answering per model, with optional failures and delay.
#[derive(Clone, Default)]
pub struct MockLLMClient {
    default_response: String,
    responses: HashMap<String, String>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    usage: Option<TokenUsage>,
    calls: Arc<Mutex<Vec<(String, Vec<ChatMessage>)>>>,
}

impl MockLLMClient {
    /// Answer every model with `response`.
    pub fn new(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            ..Default::default()
        }
    }

    pub fn with_response(mut self, model: &str, response: &str) -> Self {
        self.responses.insert(model.to_string(), response.to_string());
        self
    }

    pub fn with_failing_model(mut self, model: &str) -> Self {
        self.failing.insert(model.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_usage(mut self, prompt: u32, completion: u32) -> Self {
        self.usage = Some(TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        });
        self
    }

    /// Models called so far, in call order
    pub fn called_models(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(model, _)| model.clone())
            .collect()
    }

    /// Last user message sent to any model
    pub fn last_user_message(&self) -> Option<String> {
        self.calls.lock().unwrap().last().and_then(|(_, messages)| {
            messages.last().map(|m| m.content.clone())
        })
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<Completion> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), messages.to_vec()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(model) {
            return Err(AppError::LLM(format!("Mock failure for {}", model)));
        }

        let content = self
            .responses
            .get(model)
            .cloned()
            .unwrap_or_else(|| self.default_response.clone());
        let completion = Completion::new(content);
        Ok(match self.usage {
            Some(usage) => completion.with_usage(usage),
            None => completion,
        })
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

// ============= Search =============

/// Search backend returning a fixed list, or failing.
pub struct StaticSearch {
    results: Vec<SourceDocument>,
    fail: bool,
}

impl StaticSearch {
    pub fn new(urls: &[&str]) -> Self {
        let results = urls
            .iter()
            .enumerate()
            .map(|(i, url)| SourceDocument {
                url: url.to_string(),
                title: format!("Source {}", i + 1),
                snippet: String::new(),
                rank: i as u32 + 1,
            })
            .collect();
        Self {
            results,
            fail: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(&[])
    }

    pub fn failing() -> Self {
        Self {
            results: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl SearchBackend for StaticSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SourceDocument>> {
        if self.fail {
            return Err(AppError::Search("Mock search outage".to_string()));
        }
        Ok(self.results.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

// ============= Fetch =============

/// Page fetcher that tracks how many fetches run at once.
///
/// URLs containing `fail` error out, `pdf` are not HTML, `slow` sleep for a
/// minute. Everything else returns a page after `delay`.
pub struct CountingFetcher {
    delay: Duration,
    body: String,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: AtomicUsize,
}

impl CountingFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            body: "Волновая электростанция мощностью 2 МВт работает с КПД 45% у побережья Шотландии."
                .to_string(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
        }
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PageFetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<FetchedPage>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if url.contains("slow") {
            tokio::time::sleep(Duration::from_secs(60)).await;
        } else {
            tokio::time::sleep(self.delay).await;
        }

        if url.contains("fail") {
            return Err(AppError::Fetch(format!("HTTP 500 for {}", url)));
        }
        if url.contains("pdf") {
            return Ok(None);
        }

        Ok(Some(FetchedPage {
            url: url.to_string(),
            title: format!("Page {}", url),
            text: self.body.clone(),
            raw_content: format!("<html><body><p>{}</p></body></html>", self.body),
        }))
    }
}

// ============= Recording =============

/// In-memory [`QueryRecorder`] exposing everything written to it.
#[derive(Default)]
pub struct RecordingRecorder {
    pub queries: Mutex<IndexMap<String, (String, QueryStatus)>>,
    pub sources: Mutex<Vec<SourceDocument>>,
    pub documents: Mutex<Vec<ParsedDocument>>,
    pub calls: Mutex<Vec<ModelCallRecord>>,
}

impl RecordingRecorder {
    pub fn calls(&self) -> Vec<ModelCallRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn status(&self, query_id: &str) -> Option<QueryStatus> {
        self.queries
            .lock()
            .unwrap()
            .get(query_id)
            .map(|(_, status)| *status)
    }
}

#[async_trait]
impl QueryRecorder for RecordingRecorder {
    async fn create_query(&self, query_id: &str, query_text: &str) -> Result<()> {
        self.queries.lock().unwrap().insert(
            query_id.to_string(),
            (query_text.to_string(), QueryStatus::Processing),
        );
        Ok(())
    }

    async fn save_sources(&self, _query_id: &str, sources: &[SourceDocument]) -> Result<()> {
        self.sources.lock().unwrap().extend_from_slice(sources);
        Ok(())
    }

    async fn save_documents(&self, _query_id: &str, documents: &[ParsedDocument]) -> Result<()> {
        self.documents.lock().unwrap().extend_from_slice(documents);
        Ok(())
    }

    async fn record_model_call(&self, record: &ModelCallRecord) -> Result<()> {
        self.calls.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn set_query_status(&self, query_id: &str, status: QueryStatus) -> Result<()> {
        match self.queries.lock().unwrap().get_mut(query_id) {
            Some(entry) => {
                entry.1 = status;
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Query {}", query_id))),
        }
    }

    async fn query_stats(&self, query_id: &str) -> Result<QueryStats> {
        Err(AppError::NotFound(format!("Query {}", query_id)))
    }

    async fn delete_query(&self, query_id: &str) -> Result<()> {
        self.queries.lock().unwrap().shift_remove(query_id);
        Ok(())
    }
}

// ============= Research =============

/// Fixture evaluator with knobs for the failure and round-limit paths.
#[derive(Default)]
pub struct ScriptedEvaluator {
    /// Judge always asks for another round
    pub never_stop: bool,
    /// This expert's critique errors out
    pub failing_expert: Option<ExpertType>,
    /// Primary response fails on this 0-based call
    pub fail_primary_on_call: Option<usize>,
    /// Judge score per round, cycling; fixture score when empty
    pub scores: Vec<f64>,
    pub primary_calls: AtomicUsize,
    pub judge_calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedEvaluator {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvaluationBackend for ScriptedEvaluator {
    async fn primary_response(&self, task: &str, prompt: &str) -> Result<ModelResponse> {
        let call = self.primary_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail_primary_on_call == Some(call) {
            return Err(AppError::LLM("primary model unavailable".to_string()));
        }
        FixtureEvaluator.primary_response(task, prompt).await
    }

    async fn critique(
        &self,
        expert: ExpertType,
        task: &str,
        content: &str,
    ) -> Result<ExpertiseResult> {
        if self.failing_expert == Some(expert) {
            return Err(AppError::LLM(format!("{} expert timed out", expert)));
        }
        FixtureEvaluator.critique(expert, task, content).await
    }

    async fn discuss(&self, round: RoundContext<'_>) -> Result<DiscussionRound> {
        FixtureEvaluator.discuss(round).await
    }

    async fn judge(
        &self,
        round: RoundContext<'_>,
        discussion: &DiscussionRound,
    ) -> Result<JudgeDecision> {
        let call = self.judge_calls.fetch_add(1, Ordering::SeqCst);
        let mut decision = FixtureEvaluator.judge(round, discussion).await?;
        if self.never_stop {
            decision.should_stop = false;
            decision.needs_more_rounds = true;
            decision.improved_response = format!("improved answer #{}", call + 1);
        }
        if !self.scores.is_empty() {
            decision.score = self.scores[call % self.scores.len()];
        }
        Ok(decision)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
