//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use healthtrack_monitor::{HealthReport, HealthStatus};

use crate::state::AppState;

/// GET /health: 200 while the registry is readable, 500 otherwise.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health.report();
    let status = match report.status {
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(report))
}

/// Returns the router for health checks.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
