//! Iterative multi-expert research
//!
//! A [`Session`] takes a task through repeated rounds:
//!
//! 1. a primary model answers the (refined) prompt
//! 2. code, prompt and analytics experts critique the answer concurrently
//! 3. several models discuss the critique
//! 4. a judge scores the round and either stops with an improved answer or
//!    sends it back for another round
//!
//! Every artifact is checkpointed through [`crate::db::HistoryStore`] as it is
//! produced, so a session's history survives partial failures.
//!
//! # Usage
//!
//! ```ignore
//! use sokrat::research::{FixtureEvaluator, ResearchCoordinator, Session};
//!
//! let coordinator = ResearchCoordinator::new(
//!     Arc::new(FixtureEvaluator),
//!     store,
//!     ExpertType::defaults(),
//! );
//! let session = coordinator.run(Session::new("implement quicksort")).await;
//! println!("{:.1}: {:?}", session.quality_score, session.final_synthesis);
//! ```

pub mod coordinator;
pub mod evaluation;
pub mod session;

pub use coordinator::ResearchCoordinator;
pub use evaluation::{
    create_evaluator, EvaluationBackend, FixtureEvaluator, LlmEvaluator, RoundContext,
};
pub use session::{Refinement, Session, SessionState};
