//! LLM clients and model fan-out
//!
//! - [`LLMClient`] - the trait every provider implements
//! - [`Provider`] - runtime provider selection from `sokrat.toml`
//! - [`OpenAICompatClient`] - OpenAI chat-completions wire format over reqwest
//! - [`ModelDispatcher`] - one prompt to every configured backend in parallel
//!
//! # Example
//!
//! ```ignore
//! use sokrat::llm::{ModelDispatcher, Provider};
//!
//! let client = Provider::from_config(&config).map(|p| p.create_client()).transpose()?;
//! let dispatcher = ModelDispatcher::new(client, recorder, config.dispatch.clone());
//!
//! let prompt = dispatcher.build_prompt(&context);
//! for (model, analysis) in dispatcher.dispatch(&query_id, &prompt).await {
//!     println!("{model}: {analysis}");
//! }
//! ```

/// Core LLM client trait and message types.
pub mod client;
/// Parallel dispatch with per-call telemetry.
pub mod dispatcher;
/// OpenAI-compatible HTTP client.
pub mod openai;

pub use client::{ChatMessage, ChatRole, Completion, LLMClient, Provider, TokenUsage};
pub use dispatcher::ModelDispatcher;
pub use openai::OpenAICompatClient;
