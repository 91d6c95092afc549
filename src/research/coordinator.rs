use std::sync::Arc;

use futures::future::join_all;
use tracing::Instrument;

use super::evaluation::{EvaluationBackend, RoundContext};
use super::session::{Refinement, Session, SessionState};
use crate::db::HistoryStore;
use crate::types::{
    clamp_score, ExpertType, ExpertiseResult, JudgeDecision, Result, RoundPayload,
};

/// Drives a [`Session`] through primary response, expertise, discussion and
/// judging until the judge stops it or the round cap is hit.
///
/// Every artifact is checkpointed to the [`HistoryStore`] as soon as it is
/// produced. Checkpoint failures are logged and never abort a session.
pub struct ResearchCoordinator {
    evaluator: Arc<dyn EvaluationBackend>,
    store: Arc<dyn HistoryStore>,
    experts: Vec<ExpertType>,
}

impl ResearchCoordinator {
    pub fn new(
        evaluator: Arc<dyn EvaluationBackend>,
        store: Arc<dyn HistoryStore>,
        experts: Vec<ExpertType>,
    ) -> Self {
        let experts = if experts.is_empty() {
            ExpertType::defaults()
        } else {
            experts
        };
        Self {
            evaluator,
            store,
            experts,
        }
    }

    pub fn experts(&self) -> &[ExpertType] {
        &self.experts
    }

    pub fn backend_name(&self) -> &str {
        self.evaluator.name()
    }

    /// Run the session to completion.
    ///
    /// Never fails: a fatal error marks the session `Failed` with `error` set.
    pub async fn run(&self, mut session: Session) -> Session {
        let span = tracing::info_span!("session", session_id = %session.id);

        async {
            tracing::info!(
                task = %session.task,
                max_rounds = session.max_rounds,
                backend = self.evaluator.name(),
                "Research session started"
            );

            if let Err(e) = self
                .store
                .create_session(&session.id, &session.task, &session.config())
                .await
            {
                tracing::warn!(error = %e, "Failed to checkpoint session");
            }

            if let Err(e) = self.run_rounds(&mut session).await {
                tracing::error!(error = %e, round = session.current_round, "Research session failed");
                session.error = Some(e.to_string());
                session.state = SessionState::Failed;
                session.is_finished = true;
                self.checkpoint(
                    &session.id,
                    session.current_round,
                    RoundPayload::Failed {
                        error: e.to_string(),
                    },
                )
                .await;
            }

            tracing::info!(
                rounds = session.current_round + 1,
                quality_score = session.quality_score,
                state = ?session.state,
                "Research session finished"
            );
            session
        }
        .instrument(span)
        .await
    }

    async fn run_rounds(&self, session: &mut Session) -> Result<()> {
        let mut refinement: Option<Refinement> = None;

        loop {
            let round = session.current_round;
            tracing::info!(round = round + 1, max_rounds = session.max_rounds, "Round started");

            let prompt = session.primary_prompt(refinement.as_ref());
            let primary = self
                .evaluator
                .primary_response(&session.task, &prompt)
                .await?;
            self.checkpoint(
                &session.id,
                round,
                RoundPayload::Primary {
                    model: primary.model_name.clone(),
                    content: primary.content.clone(),
                    tokens: primary.tokens_used,
                },
            )
            .await;
            session.primary_response = Some(primary.clone());
            session.state = SessionState::PrimaryResponseObtained;

            let expertise = self
                .run_expertise(&session.id, &session.task, &primary.content, round)
                .await;
            session.expertise_results.extend(expertise.iter().cloned());
            session.state = SessionState::ExpertiseComplete;

            let context = RoundContext {
                task: &session.task,
                round_number: round + 1,
                primary: &primary,
                expertise: &expertise,
            };

            let discussion = self.evaluator.discuss(context).await?;
            self.checkpoint(
                &session.id,
                round,
                RoundPayload::Discussion {
                    responses: discussion.responses.clone(),
                    consensus_reached: discussion.consensus_reached,
                    best_response: discussion.best_response.clone(),
                },
            )
            .await;

            session.state = SessionState::DiscussionComplete;
            let decision = self.evaluator.judge(context, &discussion).await?;
            session.discussion_rounds.push(discussion);

            let JudgeDecision {
                should_stop,
                reason,
                improved_response,
                score,
                ..
            } = decision;
            let score = clamp_score(score);
            session.improvement_trend.push(score);
            session.quality_score = score;
            session.state = SessionState::Judged;
            tracing::info!(round = round + 1, score, should_stop, "Round judged");

            if should_stop || session.is_last_round() {
                if !should_stop {
                    tracing::info!("Round limit reached");
                }
                session.final_synthesis = Some(improved_response.clone());
                session.is_finished = true;
                session.state = SessionState::Finished;
                self.checkpoint(
                    &session.id,
                    round,
                    RoundPayload::Final {
                        synthesis: improved_response,
                        quality_score: score,
                        reason,
                    },
                )
                .await;
                return Ok(());
            }

            refinement = Some(Refinement {
                previous_response: improved_response,
                suggestions: expertise
                    .iter()
                    .flat_map(|e| e.suggestions.iter().cloned())
                    .collect(),
            });
            session.current_round += 1;
            session.state = SessionState::Continue;
        }
    }

    /// Every configured expert, concurrently. A failing expert yields an
    /// `error` verdict instead of aborting the round.
    async fn run_expertise(
        &self,
        session_id: &str,
        task: &str,
        content: &str,
        round: u32,
    ) -> Vec<ExpertiseResult> {
        let critiques = self.experts.iter().map(|&expert| async move {
            let result = match self.evaluator.critique(expert, task, content).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(expert = %expert, error = %e, "Expert critique failed");
                    ExpertiseResult::failed(e)
                }
            };
            if let Err(e) = self.store.append_expertise(session_id, round, &result).await {
                tracing::warn!(expert = %expert, error = %e, "Failed to checkpoint expertise");
            }
            result
        });

        join_all(critiques).await
    }

    async fn checkpoint(&self, session_id: &str, round: u32, payload: RoundPayload) {
        let kind = payload.kind();
        if let Err(e) = self.store.append_round(session_id, round, &payload).await {
            tracing::warn!(kind, round, error = %e, "Failed to checkpoint round");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TursoClient;
    use crate::research::evaluation::FixtureEvaluator;

    #[tokio::test]
    async fn test_fixture_session_finishes_in_one_round() {
        let store = Arc::new(TursoClient::new_memory().await.unwrap());
        let coordinator = ResearchCoordinator::new(
            Arc::new(FixtureEvaluator),
            store.clone(),
            ExpertType::defaults(),
        );

        let session = coordinator
            .run(Session::new("sort an array").with_max_rounds(3))
            .await;

        assert!(session.is_finished);
        assert_eq!(session.state, SessionState::Finished);
        assert_eq!(session.current_round, 0);
        assert_eq!(session.improvement_trend, vec![8.5]);
        assert_eq!(session.expertise_results.len(), 3);

        let history = store.get_history(&session.id).await.unwrap();
        let kinds: Vec<_> = history.rounds.iter().map(|r| r.payload.kind()).collect();
        assert_eq!(kinds, vec!["primary", "discussion", "final"]);
    }

    #[tokio::test]
    async fn test_empty_expert_list_uses_defaults() {
        let store = Arc::new(TursoClient::new_memory().await.unwrap());
        let coordinator = ResearchCoordinator::new(Arc::new(FixtureEvaluator), store, vec![]);
        assert_eq!(coordinator.experts(), ExpertType::defaults().as_slice());
    }
}
