//! Recorded query handlers.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    db::QueryRecorder,
    types::{QueryStats, Result},
    AppState,
};

#[utoipa::path(
    get,
    path = "/queries/{id}/stats",
    params(("id" = String, Path, description = "Query ID")),
    responses(
        (status = 200, description = "Aggregated query statistics", body = QueryStats),
        (status = 404, description = "Query not found")
    ),
    tag = "analysis"
)]
pub async fn query_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QueryStats>> {
    Ok(Json(state.store.query_stats(&id).await?))
}

/// Delete a query with its sources, documents and model calls.
#[utoipa::path(
    delete,
    path = "/queries/{id}",
    params(("id" = String, Path, description = "Query ID")),
    responses(
        (status = 200, description = "Query deleted"),
        (status = 404, description = "Query not found")
    ),
    tag = "analysis"
)]
pub async fn delete_query(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    // 404 for unknown ids
    state.store.query_stats(&id).await?;
    state.store.delete_query(&id).await?;

    Ok(Json(serde_json::json!({"success": true})))
}
