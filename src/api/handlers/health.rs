use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Name of the active search backend
    pub search: String,
    /// Name of the active research backend
    pub research: String,
    /// Whether model calls are simulated
    pub simulated_dispatch: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BannerResponse {
    pub service: String,
    pub version: String,
    pub docs: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "service"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        search: state.pipeline.search_backend().to_string(),
        research: state.coordinator.backend_name().to_string(),
        simulated_dispatch: state.pipeline.is_simulated(),
    })
}

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service banner", body = BannerResponse)),
    tag = "service"
)]
pub async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse {
        service: "Sokrat research server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        docs: "/api-docs/openapi.json".to_string(),
    })
}
