//! Health tracker HTTP API.
//!
//! The Command Gateway routes write to the write store and announce each
//! committed mutation on the event bus; the replication consumer keeps the
//! read store in step. `/health` and `/metrics` expose the monitor.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod user;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full application router over `state`.
pub fn build_router(state: AppState) -> Router {
    let metrics = Arc::clone(&state.metrics);

    // TODO: Replace CorsLayer::permissive() with the dashboard origin once it is deployed.
    Router::new()
        .merge(routes::health::router())
        .merge(routes::metrics::router())
        .nest("/api/sleep", routes::sleep::router())
        .nest("/api/nutrition", routes::nutrition::router())
        .nest("/api/activity", routes::activity::router())
        .nest("/api/wellbeing", routes::wellbeing::router())
        .nest("/api/dashboard", routes::dashboard::router())
        .route_layer(axum::middleware::from_fn_with_state(
            metrics,
            middleware::track_metrics,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use healthtrack_test_support::InMemoryRecordRepository;
    use tower::ServiceExt;

    use super::*;
    use crate::state::testing::state_with;

    #[tokio::test]
    async fn test_requests_are_counted_by_matched_route_and_service() {
        // Arrange
        let state = state_with(Arc::new(InMemoryRecordRepository::default()));
        let metrics = Arc::clone(&state.metrics);
        let app = build_router(state);
        let request = Request::builder()
            .uri("/api/activity")
            .header("x-user-id", "4")
            .body(Body::empty())
            .unwrap();

        // Act
        let response = app.oneshot(request).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::OK);
        let text = metrics.encode().unwrap();
        let line = text
            .lines()
            .find(|l| l.starts_with("http_requests_total{") && l.contains("route=\"/api/activity\""))
            .unwrap();
        assert!(line.contains("method=\"GET\""));
        assert!(line.contains("status_code=\"200\""));
        assert!(line.contains("service=\"activity\""));
        assert!(line.ends_with(" 1"));
    }

    #[tokio::test]
    async fn test_unknown_path_returns_404() {
        let app = build_router(state_with(Arc::new(InMemoryRecordRepository::default())));
        let request = Request::builder()
            .uri("/api/steps")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
