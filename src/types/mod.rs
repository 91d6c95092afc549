use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

// ============= API Request/Response Types =============

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SourceInfo {
    pub url: String,
    pub title: String,
}

/// Result of one pass of the query pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub query_id: String,
    pub sources: Vec<SourceInfo>,
    /// Backend id to analysis text, in configured backend order
    #[schema(value_type = Object)]
    pub model_analyses: IndexMap<String, String>,
    pub confidence_flags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResearchRequest {
    pub task: String,
    #[serde(default)]
    pub initial_prompt: Option<String>,
    #[serde(default)]
    pub rag_context: Option<String>,
    #[serde(default)]
    pub negative_constraints: Option<String>,
    #[serde(default)]
    pub max_rounds: Option<u32>,
}

// ============= Retrieval Types =============

/// A candidate reference returned by the search stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SourceDocument {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// 1-based position in the search results
    pub rank: u32,
}

/// Cleaned content of one fetched source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    /// Back-reference to the originating [`SourceDocument`]
    pub url: String,
    pub title: String,
    pub raw_content: String,
    pub cleaned_text: String,
    pub word_count: usize,
}

// ============= Model Call Telemetry =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// One dispatch attempt to one backend. Written exactly once per attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCallRecord {
    pub query_id: String,
    pub model_name: String,
    pub prompt: String,
    pub response: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub latency_ms: u64,
    pub status: CallStatus,
    pub error_message: Option<String>,
}

// ============= Query Types =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Processing,
    Completed,
    NoSources,
    ParseFailed,
    Failed,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Processing => "processing",
            QueryStatus::Completed => "completed",
            QueryStatus::NoSources => "no_sources",
            QueryStatus::ParseFailed => "parse_failed",
            QueryStatus::Failed => "failed",
        }
    }
}

impl FromStr for QueryStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "processing" => Ok(QueryStatus::Processing),
            "completed" => Ok(QueryStatus::Completed),
            "no_sources" => Ok(QueryStatus::NoSources),
            "parse_failed" => Ok(QueryStatus::ParseFailed),
            "failed" => Ok(QueryStatus::Failed),
            other => Err(AppError::Database(format!("Unknown query status '{}'", other))),
        }
    }
}

/// Aggregated view of one recorded query.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryStats {
    pub query_id: String,
    pub query_text: String,
    pub status: QueryStatus,
    pub timestamp: DateTime<Utc>,
    pub sources_count: u64,
    pub documents_count: u64,
    pub model_calls_count: u64,
    pub total_tokens: u64,
}

// ============= Research Types =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExpertType {
    Code,
    Prompt,
    Analytics,
    /// Placeholder for a critique that failed to run
    Error,
}

impl ExpertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpertType::Code => "code",
            ExpertType::Prompt => "prompt",
            ExpertType::Analytics => "analytics",
            ExpertType::Error => "error",
        }
    }

    /// The experts a session runs when none are configured.
    pub fn defaults() -> Vec<ExpertType> {
        vec![ExpertType::Code, ExpertType::Prompt, ExpertType::Analytics]
    }
}

impl fmt::Display for ExpertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpertType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "code" => Ok(ExpertType::Code),
            "prompt" => Ok(ExpertType::Prompt),
            "analytics" => Ok(ExpertType::Analytics),
            "error" => Ok(ExpertType::Error),
            other => Err(AppError::InvalidInput(format!("Unknown expert type '{}'", other))),
        }
    }
}

/// Clamp a score into `[0, 10]`. NaN collapses to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 10.0)
    }
}

/// One critique verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExpertiseResult {
    pub expert_type: ExpertType,
    pub findings: Vec<String>,
    pub suggestions: Vec<String>,
    pub score: f64,
}

impl ExpertiseResult {
    pub fn new(
        expert_type: ExpertType,
        findings: Vec<String>,
        suggestions: Vec<String>,
        score: f64,
    ) -> Self {
        Self {
            expert_type,
            findings,
            suggestions,
            score: clamp_score(score),
        }
    }

    /// Stand-in for a critique that could not be produced.
    pub fn failed(message: impl fmt::Display) -> Self {
        Self {
            expert_type: ExpertType::Error,
            findings: vec![format!("error: {}", message)],
            suggestions: vec!["retry".to_string()],
            score: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ModelResponse {
    pub model_name: String,
    pub content: String,
    pub tokens_used: u32,
    pub latency_ms: u64,
}

/// One round of cross-model deliberation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DiscussionRound {
    /// 1-based
    pub round_number: u32,
    #[schema(value_type = Object)]
    pub responses: IndexMap<String, String>,
    pub consensus_reached: bool,
    pub best_response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeDecision {
    pub should_stop: bool,
    pub reason: String,
    pub improved_response: String,
    pub score: f64,
    pub needs_more_rounds: bool,
}

/// Checkpointed round data, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundPayload {
    Primary {
        model: String,
        content: String,
        tokens: u32,
    },
    Discussion {
        #[schema(value_type = Object)]
        responses: IndexMap<String, String>,
        consensus_reached: bool,
        best_response: Option<String>,
    },
    Final {
        synthesis: String,
        quality_score: f64,
        reason: String,
    },
    Failed {
        error: String,
    },
}

impl RoundPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            RoundPayload::Primary { .. } => "primary",
            RoundPayload::Discussion { .. } => "discussion",
            RoundPayload::Final { .. } => "final",
            RoundPayload::Failed { .. } => "failed",
        }
    }
}

/// Session parameters persisted alongside the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionConfig {
    pub initial_prompt: String,
    pub rag_context: Option<String>,
    pub negative_constraints: Option<String>,
    pub max_rounds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredSession {
    pub id: String,
    pub task: String,
    pub config: SessionConfig,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredRound {
    pub round_number: u32,
    pub payload: RoundPayload,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredExpertise {
    pub round_number: u32,
    pub result: ExpertiseResult,
    pub created_at: DateTime<Utc>,
}

/// Everything recorded for one session, ordered by round number.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SessionHistory {
    pub session: Option<StoredSession>,
    pub rounds: Vec<StoredRound>,
    pub expertise: Vec<StoredExpertise>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionSummary {
    pub id: String,
    pub task: String,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::DuplicateKey(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_)
            | AppError::LLM(_)
            | AppError::Search(_)
            | AppError::Fetch(_)
            | AppError::Configuration(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
