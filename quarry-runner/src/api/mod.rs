//! Runner HTTP API
//!
//! Liveness only. The server has its own lifecycle, independent of job
//! processing, so supervisors can probe the process even while the
//! registry is full.

mod health;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tracing::info;

/// Builds the runner's API router
pub fn create_router() -> Router {
    Router::new().route("/health/simple", get(health::health_simple))
}

/// Binds and serves the API on the given port
pub async fn serve(port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind health endpoint to {}", addr))?;

    info!("Health endpoint listening at {}", addr);

    axum::serve(listener, create_router())
        .await
        .context("Health server exited")?;

    Ok(())
}
