//! One-shot query pipeline
//!
//! ```text
//! search ─▶ BoundedFetcher ─▶ TextCleaner ─▶ context ─▶ ModelDispatcher ─▶ flags
//!   │ empty                │ nothing parsed
//!   └─▶ flag, stop         └─▶ flag, stop
//! ```
//!
//! The query record is written at start, sources after search and cleaned
//! documents after cleaning; each model call records itself.

/// Text normalisation.
pub mod cleaner;
/// Confidence flag derivation.
pub mod confidence;
/// Concurrency-limited fetching.
pub mod fetcher;
/// The pipeline itself.
pub mod query;

pub use cleaner::TextCleaner;
pub use confidence::derive_flags;
pub use fetcher::BoundedFetcher;
pub use query::QueryPipeline;
