//! Research round loop: termination, refinement, isolation and checkpointing.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::mocks::{MockLLMClient, ScriptedEvaluator};
use sokrat::db::{HistoryStore, TursoClient};
use sokrat::research::{
    create_evaluator, FixtureEvaluator, LlmEvaluator, ResearchCoordinator, Session, SessionState,
};
use sokrat::types::{
    AppError, ExpertType, ExpertiseResult, Result, RoundPayload, SessionConfig, SessionHistory,
    SessionSummary,
};
use sokrat::utils::toml_config::{EvaluatorKind, ResearchConfig};

async fn memory_store() -> Arc<TursoClient> {
    Arc::new(TursoClient::new_memory().await.unwrap())
}

fn kinds(history: &SessionHistory) -> Vec<(u32, &'static str)> {
    history
        .rounds
        .iter()
        .map(|r| (r.round_number, r.payload.kind()))
        .collect()
}

#[tokio::test]
async fn test_fixture_session_end_to_end() {
    let store = memory_store().await;
    let coordinator = ResearchCoordinator::new(
        Arc::new(FixtureEvaluator),
        store.clone(),
        ExpertType::defaults(),
    );

    let session = coordinator
        .run(Session::new("write a sort routine").with_max_rounds(1))
        .await;

    assert!(session.is_finished);
    assert_eq!(session.state, SessionState::Finished);
    assert_eq!(session.quality_score, 8.5);
    assert_eq!(session.improvement_trend, vec![8.5]);
    assert!(session
        .final_synthesis
        .as_deref()
        .unwrap()
        .contains("def quicksort(arr):"));
    assert!(session
        .primary_response
        .as_ref()
        .unwrap()
        .content
        .contains("write a sort routine"));
    assert_eq!(session.discussion_rounds.len(), 1);
    assert_eq!(session.discussion_rounds[0].round_number, 1);
    assert!(session.error.is_none());

    let history = store.get_history(&session.id).await.unwrap();
    assert_eq!(
        kinds(&history),
        vec![(0, "primary"), (0, "discussion"), (0, "final")]
    );

    let mut experts: Vec<_> = history
        .expertise
        .iter()
        .map(|e| (e.result.expert_type.as_str(), e.result.score))
        .collect();
    experts.sort_by(|a, b| a.0.cmp(b.0));
    assert_eq!(
        experts,
        vec![("analytics", 6.5), ("code", 7.5), ("prompt", 8.0)]
    );

    match &history.rounds[2].payload {
        RoundPayload::Final {
            quality_score,
            reason,
            ..
        } => {
            assert_eq!(*quality_score, 8.5);
            assert_eq!(reason, "Достигнуто хорошее качество, все эксперты довольны");
        }
        other => panic!("expected final round, got {:?}", other),
    }
}

#[tokio::test]
async fn test_round_limit_stops_a_judge_that_never_stops() {
    let store = memory_store().await;
    let evaluator = Arc::new(ScriptedEvaluator {
        never_stop: true,
        scores: vec![6.0, 7.0, 7.5],
        ..Default::default()
    });
    let coordinator =
        ResearchCoordinator::new(evaluator.clone(), store.clone(), ExpertType::defaults());

    let session = coordinator.run(Session::new("sort").with_max_rounds(3)).await;

    assert!(session.is_finished);
    assert_eq!(session.state, SessionState::Finished);
    assert_eq!(session.current_round, 2);
    assert_eq!(session.improvement_trend, vec![6.0, 7.0, 7.5]);
    assert_eq!(session.quality_score, 7.5);
    assert_eq!(session.final_synthesis.as_deref(), Some("improved answer #3"));
    assert_eq!(session.expertise_results.len(), 9);
    assert_eq!(session.discussion_rounds.len(), 3);

    let history = store.get_history(&session.id).await.unwrap();
    let finals: Vec<_> = kinds(&history)
        .into_iter()
        .filter(|(_, kind)| *kind == "final")
        .collect();
    assert_eq!(finals, vec![(2, "final")]);
    assert_eq!(history.expertise.len(), 9);
}

#[tokio::test]
async fn test_refinement_feeds_the_next_round() {
    let store = memory_store().await;
    let evaluator = Arc::new(ScriptedEvaluator {
        never_stop: true,
        ..Default::default()
    });
    let coordinator =
        ResearchCoordinator::new(evaluator.clone(), store, vec![ExpertType::Code]);

    coordinator
        .run(
            Session::new("sort")
                .with_negative_constraints("no bubble sort")
                .with_max_rounds(2),
        )
        .await;

    let prompts = evaluator.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("improved answer"));
    assert!(prompts[0].contains("no bubble sort"));
    assert!(prompts[1].contains("improved answer #1"));
    assert!(prompts[1].contains("Добавить итеративную реализацию"));
    assert!(prompts[1].contains("no bubble sort"));
}

#[tokio::test]
async fn test_failing_expert_is_isolated() {
    let store = memory_store().await;
    let evaluator = Arc::new(ScriptedEvaluator {
        failing_expert: Some(ExpertType::Prompt),
        ..Default::default()
    });
    let coordinator = ResearchCoordinator::new(evaluator, store.clone(), ExpertType::defaults());

    let session = coordinator.run(Session::new("sort").with_max_rounds(1)).await;

    assert_eq!(session.state, SessionState::Finished);
    assert_eq!(session.expertise_results.len(), 3);
    let failed: Vec<_> = session
        .expertise_results
        .iter()
        .filter(|e| e.expert_type == ExpertType::Error)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].score, 0.0);
    assert!(failed[0].findings[0].starts_with("error: "));
    assert!(failed[0].findings[0].contains("prompt expert timed out"));
    assert_eq!(failed[0].suggestions, vec!["retry".to_string()]);

    let history = store.get_history(&session.id).await.unwrap();
    assert!(history
        .expertise
        .iter()
        .any(|e| e.result.expert_type == ExpertType::Error));
}

#[tokio::test]
async fn test_fatal_error_marks_session_failed() {
    let store = memory_store().await;
    let evaluator = Arc::new(ScriptedEvaluator {
        never_stop: true,
        fail_primary_on_call: Some(1),
        ..Default::default()
    });
    let coordinator = ResearchCoordinator::new(evaluator, store.clone(), ExpertType::defaults());

    let session = coordinator.run(Session::new("sort").with_max_rounds(3)).await;

    assert!(session.is_finished);
    assert_eq!(session.state, SessionState::Failed);
    assert!(session.error.as_deref().unwrap().contains("primary model unavailable"));
    assert_eq!(session.improvement_trend.len(), 1);
    assert!(session.final_synthesis.is_none());

    let history = store.get_history(&session.id).await.unwrap();
    assert_eq!(kinds(&history).last(), Some(&(1, "failed")));

    let listed = store.list_sessions(10).await.unwrap();
    assert_eq!(listed[0].id, session.id);
}

#[tokio::test]
async fn test_judge_score_is_clamped() {
    let store = memory_store().await;
    let evaluator = Arc::new(ScriptedEvaluator {
        scores: vec![12.0],
        ..Default::default()
    });
    let coordinator = ResearchCoordinator::new(evaluator, store, ExpertType::defaults());

    let session = coordinator.run(Session::new("sort")).await;

    assert_eq!(session.quality_score, 10.0);
    assert_eq!(session.improvement_trend, vec![10.0]);
}

/// History store whose every write fails.
struct BrokenStore;

#[async_trait]
impl HistoryStore for BrokenStore {
    async fn create_session(&self, _: &str, _: &str, _: &SessionConfig) -> Result<()> {
        Err(AppError::Database("disk full".to_string()))
    }

    async fn append_round(&self, _: &str, _: u32, _: &RoundPayload) -> Result<()> {
        Err(AppError::Database("disk full".to_string()))
    }

    async fn append_expertise(&self, _: &str, _: u32, _: &ExpertiseResult) -> Result<()> {
        Err(AppError::Database("disk full".to_string()))
    }

    async fn get_history(&self, _: &str) -> Result<SessionHistory> {
        Ok(SessionHistory::default())
    }

    async fn exists(&self, _: &str) -> Result<bool> {
        Ok(false)
    }

    async fn delete_session(&self, _: &str) -> Result<()> {
        Ok(())
    }

    async fn list_sessions(&self, _: u32) -> Result<Vec<SessionSummary>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_checkpoint_failures_do_not_abort() {
    let coordinator = ResearchCoordinator::new(
        Arc::new(FixtureEvaluator),
        Arc::new(BrokenStore),
        ExpertType::defaults(),
    );

    let session = coordinator.run(Session::new("sort")).await;

    assert_eq!(session.state, SessionState::Finished);
    assert_eq!(session.quality_score, 8.5);
    assert!(session.error.is_none());
}

// ============= LLM-driven roles =============

fn live_config() -> ResearchConfig {
    ResearchConfig {
        backend: EvaluatorKind::Live,
        primary_model: "primary".to_string(),
        expert_model: "expert".to_string(),
        judge_model: "judge".to_string(),
        discussion_models: vec!["d1".to_string(), "d2".to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_llm_evaluator_parses_verdicts() {
    let client = MockLLMClient::new("unused")
        .with_response("primary", "primary answer")
        .with_response(
            "expert",
            "Оценка:\n{\"findings\": [\"no tests\"], \"suggestions\": [\"add tests\"], \"score\": 7}",
        )
        .with_response("d1", "use introsort")
        .with_failing_model("d2")
        .with_response(
            "judge",
            "```json\n{\"should_stop\": true, \"reason\": \"good enough\", \"improved_response\": \"\", \"score\": 11}\n```",
        )
        .with_usage(10, 5);
    let store = memory_store().await;
    let coordinator = ResearchCoordinator::new(
        Arc::new(LlmEvaluator::new(Arc::new(client.clone()), live_config())),
        store.clone(),
        vec![ExpertType::Code, ExpertType::Analytics],
    );

    let session = coordinator.run(Session::new("sort").with_max_rounds(2)).await;

    assert_eq!(session.state, SessionState::Finished);
    let primary = session.primary_response.as_ref().unwrap();
    assert_eq!(primary.content, "primary answer");
    assert_eq!(primary.tokens_used, 15);

    assert_eq!(session.expertise_results.len(), 2);
    assert!(session
        .expertise_results
        .iter()
        .all(|e| e.score == 7.0 && e.findings == vec!["no tests".to_string()]));

    let discussion = &session.discussion_rounds[0];
    assert_eq!(discussion.responses["d1"], "use introsort");
    assert_eq!(discussion.responses["d2"], "[ERROR: d2 failed]");

    assert_eq!(session.quality_score, 10.0);
    assert_eq!(session.final_synthesis.as_deref(), Some("primary answer"));

    let called = client.called_models();
    assert_eq!(called.iter().filter(|m| *m == "expert").count(), 2);
    assert_eq!(called.iter().filter(|m| *m == "judge").count(), 1);
}

#[tokio::test]
async fn test_unparseable_critique_becomes_error_verdict() {
    let client = MockLLMClient::new("I refuse to answer in JSON")
        .with_response("primary", "answer")
        .with_response("judge", "{\"should_stop\": true, \"score\": 5}");
    let coordinator = ResearchCoordinator::new(
        Arc::new(LlmEvaluator::new(Arc::new(client), live_config())),
        memory_store().await,
        vec![ExpertType::Code],
    );

    let session = coordinator.run(Session::new("sort").with_max_rounds(1)).await;

    assert_eq!(session.state, SessionState::Finished);
    assert_eq!(session.expertise_results[0].expert_type, ExpertType::Error);
    assert_eq!(session.quality_score, 5.0);
}

#[tokio::test]
async fn test_unparseable_judge_fails_the_session() {
    let client = MockLLMClient::new("no verdict here");
    let coordinator = ResearchCoordinator::new(
        Arc::new(LlmEvaluator::new(Arc::new(client), live_config())),
        memory_store().await,
        vec![ExpertType::Code],
    );

    let session = coordinator.run(Session::new("sort")).await;

    assert_eq!(session.state, SessionState::Failed);
    assert!(session.error.as_deref().unwrap().contains("No JSON object"));
}

#[test]
fn test_evaluator_selection() {
    let client: Arc<dyn sokrat::LLMClient> = Arc::new(MockLLMClient::new("x"));

    assert_eq!(
        create_evaluator(&ResearchConfig::default(), Some(client.clone())).name(),
        "fixture"
    );
    assert_eq!(create_evaluator(&live_config(), Some(client)).name(), "live");
    assert_eq!(create_evaluator(&live_config(), None).name(), "fixture");
}
