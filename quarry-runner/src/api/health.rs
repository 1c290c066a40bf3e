//! Health Check API Handler
//!
//! Simple liveness endpoint for process supervisors.

use axum::{http::StatusCode, response::IntoResponse};

/// GET /health/simple
/// Liveness check endpoint
pub async fn health_simple() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
