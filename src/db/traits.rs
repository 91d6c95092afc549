//! Persistence contracts
//!
//! Two repository traits sit between the engine and the storage backend:
//!
//! - [`HistoryStore`] - append-only research history keyed by session id
//! - [`QueryRecorder`] - one-shot query telemetry (sources, documents, model calls)
//!
//! [`DatabaseProvider`] selects the libsql backend (in-memory, local file,
//! or remote Turso) that implements both.
//!
//! # Example
//!
//! ```rust,ignore
//! use sokrat::db::{DatabaseProvider, HistoryStore};
//!
//! let db = DatabaseProvider::Memory.create_client().await?;
//! db.create_session("s-1", "write a sort routine", &config).await?;
//! let history = db.get_history("s-1").await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::types::{
    ExpertiseResult, ModelCallRecord, ParsedDocument, QueryStats, QueryStatus, Result,
    RoundPayload, SessionConfig, SessionHistory, SessionSummary, SourceDocument,
};
use crate::utils::toml_config::DatabaseConfig;

use super::turso::TursoClient;

/// Database provider configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DatabaseProvider {
    /// In-memory database (ephemeral, lost on restart)
    #[default]
    Memory,
    /// File-based database
    Local {
        /// Path to the database file
        path: String,
    },
    /// Remote Turso database (requires network access)
    #[cfg(feature = "turso")]
    Turso {
        /// The Turso database URL (e.g., `libsql://your-db.turso.io`)
        url: String,
        /// Authentication token for the Turso database
        auth_token: String,
    },
}

impl DatabaseProvider {
    /// Open the database described by this provider
    pub async fn create_client(&self) -> Result<Arc<TursoClient>> {
        let client = match self {
            DatabaseProvider::Memory => TursoClient::new_memory().await?,
            DatabaseProvider::Local { path } => TursoClient::new_local(path).await?,
            #[cfg(feature = "turso")]
            DatabaseProvider::Turso { url, auth_token } => {
                TursoClient::new_remote(url.clone(), auth_token.clone()).await?
            }
        };
        Ok(Arc::new(client))
    }

    /// Pick a provider from the `[database]` section.
    ///
    /// A remote database wins when both of its environment variables resolve.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        #[cfg(feature = "turso")]
        {
            let resolve = |name: &Option<String>| {
                name.as_deref()
                    .and_then(crate::utils::toml_config::resolve_secret)
            };
            if let (Some(url), Some(auth_token)) = (
                resolve(&config.turso_url_env),
                resolve(&config.turso_token_env),
            ) {
                return DatabaseProvider::Turso { url, auth_token };
            }
        }

        let url = config.url.trim();
        if url.is_empty() || url == ":memory:" {
            DatabaseProvider::Memory
        } else {
            DatabaseProvider::Local {
                path: url.to_string(),
            }
        }
    }
}

/// Append-only research history.
///
/// Records are never edited after they are written; a later round supersedes
/// an earlier one by carrying a higher round number.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Create a session. Fails with `DuplicateKey` if the id is taken.
    async fn create_session(&self, id: &str, task: &str, config: &SessionConfig) -> Result<()>;

    /// Append one round checkpoint. Fails with `NotFound` for an unknown session.
    async fn append_round(
        &self,
        session_id: &str,
        round_number: u32,
        payload: &RoundPayload,
    ) -> Result<()>;

    /// Append one critique verdict. Fails with `NotFound` for an unknown session.
    async fn append_expertise(
        &self,
        session_id: &str,
        round_number: u32,
        result: &ExpertiseResult,
    ) -> Result<()>;

    /// Full history ordered by round number. An unknown id yields an empty history.
    async fn get_history(&self, session_id: &str) -> Result<SessionHistory>;

    /// Whether a session exists
    async fn exists(&self, session_id: &str) -> Result<bool>;

    /// Delete a session and all of its rounds and expertise. Absent ids are a no-op.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Most recent sessions first
    async fn list_sessions(&self, limit: u32) -> Result<Vec<SessionSummary>>;
}

/// Recording of one-shot query runs.
#[async_trait]
pub trait QueryRecorder: Send + Sync {
    /// Register a query in `processing` state
    async fn create_query(&self, query_id: &str, query_text: &str) -> Result<()>;

    /// Store the search results of a query
    async fn save_sources(&self, query_id: &str, sources: &[SourceDocument]) -> Result<()>;

    /// Store the cleaned documents of a query
    async fn save_documents(&self, query_id: &str, documents: &[ParsedDocument]) -> Result<()>;

    /// Store one model call, successful or not
    async fn record_model_call(&self, record: &ModelCallRecord) -> Result<()>;

    /// Move a query to its terminal status
    async fn set_query_status(&self, query_id: &str, status: QueryStatus) -> Result<()>;

    /// Aggregate counts for a query. Fails with `NotFound` for an unknown id.
    async fn query_stats(&self, query_id: &str) -> Result<QueryStats>;

    /// Delete a query and everything recorded for it. Absent ids are a no-op.
    async fn delete_query(&self, query_id: &str) -> Result<()>;
}
