//! API request handlers.

/// One-shot query analysis.
pub mod analyze;
/// Liveness and service banner.
pub mod health;
/// Recorded query statistics and deletion.
pub mod queries;
/// Research sessions and their history.
pub mod research;
