//! # Sokrat - multi-model research server
//!
//! Sokrat answers questions in two ways:
//!
//! 1. **One-shot analysis** ([`pipeline::QueryPipeline`]): search the web, fetch
//!    and clean the top pages under a concurrency ceiling, send the assembled
//!    context to several model backends in parallel and flag weak answers.
//! 2. **Iterative research** ([`research::ResearchCoordinator`]): a primary
//!    answer is critiqued by code, prompt and analytics experts, discussed by
//!    several models and judged, round after round, with every artifact
//!    checkpointed to a durable history.
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use sokrat::{AppState, SokratConfig};
//!
//! let config = SokratConfig::load("sokrat.toml")?;
//! let state = AppState::from_config(config).await?;
//!
//! let response = state.pipeline.run("КПД волновой электростанции").await;
//! for (model, analysis) in &response.model_analyses {
//!     println!("{model}: {analysis}");
//! }
//! ```
//!
//! Without API keys everything still runs: search falls back to fixture
//! sources, model calls are answered with placeholders and research sessions
//! use the fixture evaluator.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `duckduckgo` | DuckDuckGo search backend (default) |
//! | `turso` | Remote Turso database |
//!
//! ## Modules
//!
//! - [`api`] - REST API handlers and routes
//! - [`cli`] - Command-line parsing and terminal output
//! - [`db`] - Research history and query records (libsql)
//! - [`llm`] - Chat-completions client and parallel model dispatch
//! - [`pipeline`] - Fetch, clean, dispatch and flag stages
//! - [`research`] - Sessions, evaluation backends and the round loop
//! - [`tools`] - Web search backends and page fetching
//! - [`types`] - Common types and error handling
//! - [`utils`] - Configuration and logging

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Command-line interface.
pub mod cli;
/// Persistent research history and query records.
pub mod db;
/// LLM client and parallel dispatch.
pub mod llm;
/// One-shot query pipeline.
pub mod pipeline;
/// Iterative multi-expert research.
pub mod research;
/// Web search and page fetching.
pub mod tools;
/// Core types (requests, responses, errors).
pub mod types;
/// Configuration and logging utilities.
pub mod utils;

pub use db::{HistoryStore, QueryRecorder, TursoClient};
pub use llm::{LLMClient, ModelDispatcher, Provider};
pub use pipeline::QueryPipeline;
pub use research::{ResearchCoordinator, Session};
pub use types::{AppError, Result};
pub use utils::toml_config::SokratConfig;

use std::sync::Arc;

use db::DatabaseProvider;
use pipeline::BoundedFetcher;
use research::create_evaluator;
use tools::{create_search_backend, HttpPageFetcher};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Validated configuration
    pub config: Arc<SokratConfig>,
    /// Database client backing both the research history and query records
    pub store: Arc<TursoClient>,
    /// One-shot analysis pipeline
    pub pipeline: Arc<QueryPipeline>,
    /// Research round loop
    pub coordinator: Arc<ResearchCoordinator>,
}

impl AppState {
    /// Wire every component from configuration.
    ///
    /// Missing API keys degrade to fixture search, simulated dispatch and the
    /// fixture evaluator instead of failing.
    pub async fn from_config(config: SokratConfig) -> Result<Self> {
        let store = DatabaseProvider::from_config(&config.database)
            .create_client()
            .await?;

        let client = Provider::from_config(&config)
            .map(|provider| provider.create_client())
            .transpose()?;
        if client.is_none() {
            tracing::warn!(
                env = %config.dispatch.api_key_env,
                "No model API key configured, model calls are simulated"
            );
        }

        let search = create_search_backend(&config)?;
        let fetcher = BoundedFetcher::new(
            Arc::new(HttpPageFetcher::new(&config.fetch)?),
            config.fetch.clone(),
        );
        let dispatcher =
            ModelDispatcher::new(client.clone(), store.clone(), config.dispatch.clone());
        let pipeline = QueryPipeline::new(
            search,
            fetcher,
            dispatcher,
            store.clone(),
            config.pipeline.clone(),
        )?;

        let coordinator = ResearchCoordinator::new(
            create_evaluator(&config.research, client),
            store.clone(),
            config.research.expert_types()?,
        );

        tracing::info!(
            search = pipeline.search_backend(),
            research = coordinator.backend_name(),
            models = config.dispatch.models.len(),
            "Application state ready"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            pipeline: Arc::new(pipeline),
            coordinator: Arc::new(coordinator),
        })
    }
}
