//! HTTP API Handlers and Routes
//!
//! The REST surface of Sokrat, built on axum.
//!
//! # Endpoints
//!
//! ## Analysis
//! - `POST /analyze` - Search, fetch, clean and analyse a query with every backend
//! - `GET /queries/{id}/stats` - Aggregated counts for a recorded query
//! - `DELETE /queries/{id}` - Delete a recorded query
//!
//! ## Research
//! - `POST /research` - Run an expert research session to completion
//! - `GET /sessions?limit=` - Recorded sessions, newest first
//! - `GET /sessions/{id}` - Checkpoint history of a session
//! - `DELETE /sessions/{id}` - Delete a session
//!
//! ## Service
//! - `GET /` - Banner
//! - `GET /health` - Health check
//!
//! The OpenAPI document is served at `/api-docs/openapi.json`.

/// Request handlers for all API endpoints.
pub mod handlers;
/// Router configuration and the OpenAPI document.
pub mod routes;
