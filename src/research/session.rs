use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::{
    DiscussionRound, ExpertiseResult, ModelResponse, ResearchRequest, SessionConfig,
};

/// Where a session is in its round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    PrimaryResponseObtained,
    ExpertiseComplete,
    DiscussionComplete,
    Judged,
    /// Judged and sent back for another round
    Continue,
    Finished,
    Failed,
}

/// One research task and everything produced for it so far.
///
/// Owned and mutated by a single coordinator run. Once `is_finished` is set
/// nothing changes any more.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub id: String,
    pub task: String,
    pub initial_prompt: String,
    pub rag_context: Option<String>,
    pub negative_constraints: Option<String>,

    pub state: SessionState,
    pub primary_response: Option<ModelResponse>,
    pub expertise_results: Vec<ExpertiseResult>,
    pub discussion_rounds: Vec<DiscussionRound>,

    /// 0-based, never exceeds `max_rounds - 1`
    pub current_round: u32,
    pub max_rounds: u32,
    pub is_finished: bool,
    pub final_synthesis: Option<String>,

    pub quality_score: f64,
    /// Judge score of every round, in order
    pub improvement_trend: Vec<f64>,
    pub error: Option<String>,
}

impl Session {
    /// New session whose initial prompt is the task itself.
    pub fn new(task: impl Into<String>) -> Self {
        let task = task.into();
        Self {
            id: Uuid::new_v4().to_string(),
            initial_prompt: task.clone(),
            task,
            rag_context: None,
            negative_constraints: None,
            state: SessionState::Created,
            primary_response: None,
            expertise_results: Vec::new(),
            discussion_rounds: Vec::new(),
            current_round: 0,
            max_rounds: 3,
            is_finished: false,
            final_synthesis: None,
            quality_score: 0.0,
            improvement_trend: Vec::new(),
            error: None,
        }
    }

    pub fn from_request(request: ResearchRequest, default_max_rounds: u32) -> Self {
        let mut session = Self::new(request.task)
            .with_max_rounds(request.max_rounds.unwrap_or(default_max_rounds));
        if let Some(prompt) = request.initial_prompt.filter(|p| !p.trim().is_empty()) {
            session = session.with_initial_prompt(prompt);
        }
        if let Some(rag) = request.rag_context {
            session = session.with_rag_context(rag);
        }
        if let Some(constraints) = request.negative_constraints {
            session = session.with_negative_constraints(constraints);
        }
        session
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_initial_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.initial_prompt = prompt.into();
        self
    }

    pub fn with_rag_context(mut self, context: impl Into<String>) -> Self {
        self.rag_context = Some(context.into());
        self
    }

    pub fn with_negative_constraints(mut self, constraints: impl Into<String>) -> Self {
        self.negative_constraints = Some(constraints.into());
        self
    }

    /// At least one round always runs.
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Parameters persisted with the session record
    pub fn config(&self) -> SessionConfig {
        SessionConfig {
            initial_prompt: self.initial_prompt.clone(),
            rag_context: self.rag_context.clone(),
            negative_constraints: self.negative_constraints.clone(),
            max_rounds: self.max_rounds,
        }
    }

    /// Whether the round just judged must be the last one
    pub fn is_last_round(&self) -> bool {
        self.current_round + 1 >= self.max_rounds
    }

    /// Prompt for the primary response of the current round.
    ///
    /// From the second round on, the judge's improved answer and the experts'
    /// suggestions from the previous round are folded in.
    pub fn primary_prompt(&self, refinement: Option<&Refinement>) -> String {
        let mut prompt = self.initial_prompt.clone();

        if let Some(rag) = self.rag_context.as_deref().filter(|r| !r.is_empty()) {
            prompt.push_str("\n\nКонтекст:\n");
            prompt.push_str(rag);
        }
        if let Some(constraints) = self.negative_constraints.as_deref().filter(|c| !c.is_empty()) {
            prompt.push_str("\n\nОграничения (чего делать нельзя):\n");
            prompt.push_str(constraints);
        }
        if let Some(refinement) = refinement {
            prompt.push_str("\n\nПредыдущая версия ответа:\n");
            prompt.push_str(&refinement.previous_response);
            if !refinement.suggestions.is_empty() {
                prompt.push_str("\n\nЗамечания экспертов:\n");
                for suggestion in &refinement.suggestions {
                    prompt.push_str("- ");
                    prompt.push_str(suggestion);
                    prompt.push('\n');
                }
            }
            prompt.push_str("\nУлучши ответ с учётом замечаний.");
        }

        prompt
    }
}

/// Carry-over from a judged round into the next one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Refinement {
    pub previous_response: String,
    pub suggestions: Vec<String>,
}
