//! Research session handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    db::HistoryStore,
    research::Session,
    types::{AppError, ResearchRequest, Result, SessionHistory, SessionSummary},
    AppState,
};

const DEFAULT_SESSION_LIMIT: u32 = 100;

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListSessionsQuery {
    /// Maximum number of sessions, newest first (default 100)
    pub limit: Option<u32>,
}

/// Run a research session to completion and return its final state.
#[utoipa::path(
    post,
    path = "/research",
    request_body = ResearchRequest,
    responses(
        (status = 200, description = "Session finished or failed", body = Session),
        (status = 400, description = "Empty task")
    ),
    tag = "research"
)]
pub async fn run_research(
    State(state): State<AppState>,
    Json(payload): Json<ResearchRequest>,
) -> Result<Json<Session>> {
    if payload.task.trim().is_empty() {
        return Err(AppError::InvalidInput("task must not be empty".to_string()));
    }

    let session = Session::from_request(payload, state.config.research.max_rounds);
    Ok(Json(state.coordinator.run(session).await))
}

#[utoipa::path(
    get,
    path = "/sessions",
    params(ListSessionsQuery),
    responses((status = 200, description = "Recorded sessions", body = Vec<SessionSummary>)),
    tag = "research"
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<SessionSummary>>> {
    let limit = query.limit.unwrap_or(DEFAULT_SESSION_LIMIT);
    Ok(Json(state.store.list_sessions(limit).await?))
}

/// Full checkpoint history of one session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session history", body = SessionHistory),
        (status = 404, description = "Session not found")
    ),
    tag = "research"
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionHistory>> {
    if !state.store.exists(&id).await? {
        return Err(AppError::NotFound(format!("Session {}", id)));
    }
    Ok(Json(state.store.get_history(&id).await?))
}

/// Delete a session with its rounds and expertise records.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session deleted"),
        (status = 404, description = "Session not found")
    ),
    tag = "research"
)]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if !state.store.exists(&id).await? {
        return Err(AppError::NotFound(format!("Session {}", id)));
    }
    state.store.delete_session(&id).await?;

    Ok(Json(serde_json::json!({"success": true})))
}
