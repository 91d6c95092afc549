use axum::{extract::State, Json};

use crate::{
    types::{AnalyzeRequest, AnalyzeResponse, AppError, Result},
    AppState,
};

/// Run the one-shot query pipeline.
///
/// Pipeline failures never surface as an error status: they come back as a
/// response carrying a confidence flag.
#[utoipa::path(
    post,
    path = "/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Analysis finished", body = AnalyzeResponse),
        (status = 400, description = "Empty query")
    ),
    tag = "analysis"
)]
pub async fn analyze(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>> {
    let query = payload.query.trim();
    if query.is_empty() {
        return Err(AppError::InvalidInput("query must not be empty".to_string()));
    }

    Ok(Json(state.pipeline.run(query).await))
}
