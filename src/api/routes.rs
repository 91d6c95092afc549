use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::api::handlers::{analyze, health, queries, research};
use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "Sokrat", description = "Multi-model research server"),
    paths(
        analyze::analyze,
        health::health,
        health::banner,
        research::run_research,
        research::list_sessions,
        research::get_session,
        research::delete_session,
        queries::query_stats,
        queries::delete_query,
    ),
    components(schemas(
        crate::types::AnalyzeRequest,
        crate::types::AnalyzeResponse,
        crate::types::SourceInfo,
        crate::types::ResearchRequest,
        crate::types::QueryStats,
        crate::types::QueryStatus,
        crate::types::SessionHistory,
        crate::types::SessionSummary,
        crate::types::RoundPayload,
        crate::research::Session,
        crate::research::SessionState,
        health::HealthResponse,
        health::BannerResponse,
    )),
    tags(
        (name = "analysis", description = "One-shot retrieval and model analysis"),
        (name = "research", description = "Iterative expert research sessions"),
        (name = "service", description = "Service status")
    )
)]
pub struct ApiDoc;

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn create_router() -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health::banner))
        .route("/health", get(health::health))
        .route("/analyze", post(analyze::analyze))
        .route("/research", post(research::run_research))
        .route("/sessions", get(research::list_sessions))
        .route(
            "/sessions/{id}",
            get(research::get_session).delete(research::delete_session),
        )
        .route("/queries/{id}/stats", get(queries::query_stats))
        .route("/queries/{id}", delete(queries::delete_query))
        .route("/api-docs/openapi.json", get(openapi))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
