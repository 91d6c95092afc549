//! Durable storage.
//!
//! - [`traits`] - the [`HistoryStore`] and [`QueryRecorder`] contracts plus
//!   [`DatabaseProvider`] for picking a backend
//! - [`turso`] - libsql implementation of both (in-memory, local file, or remote Turso)

#![allow(missing_docs)]

pub mod traits;
pub mod turso;

pub use traits::{DatabaseProvider, HistoryStore, QueryRecorder};
pub use turso::TursoClient;
