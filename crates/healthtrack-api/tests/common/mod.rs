//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use healthtrack_bus::EventBusClient;
use healthtrack_core::clock::Clock;
use healthtrack_core::repository::{OutboxRepository, RecordRepository};
use healthtrack_monitor::{Metrics, ServiceHealth};
use healthtrack_replication::ReplicationPublisher;
use healthtrack_store::{DualStore, PgOutbox, PgRecordRepository};
use healthtrack_test_support::FixedClock;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use healthtrack_api::build_router;
use healthtrack_api::state::AppState;

/// Builds the full app over one database serving as both stores, so reads
/// observe writes without a running consumer. The bus is degraded.
pub fn build_test_app(pool: PgPool) -> Router {
    build_router(test_state(pool))
}

/// State behind [`build_test_app`].
pub fn test_state(pool: PgPool) -> AppState {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::morning());
    let metrics = Arc::new(Metrics::new().unwrap());
    let store = DualStore::from_pools(pool.clone(), pool.clone());
    let records: Arc<dyn RecordRepository> =
        Arc::new(PgRecordRepository::new(store, Arc::clone(&clock)));
    let outbox: Arc<dyn OutboxRepository> = Arc::new(PgOutbox::new(pool, Arc::clone(&clock)));
    let publisher = Arc::new(ReplicationPublisher::new(
        Arc::new(EventBusClient::local_memory()),
        outbox,
        Arc::clone(&clock),
        Some(Arc::clone(&metrics)),
    ));
    let health = ServiceHealth::new(clock, Some(Arc::clone(&metrics)));
    AppState::new(records, publisher, health, metrics)
}

async fn send(
    app: Router,
    method: &str,
    uri: &str,
    user_id: Option<i64>,
    body: Option<&serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a POST request with a JSON body as `user_id`.
pub async fn post_json(
    app: Router,
    uri: &str,
    user_id: i64,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, Some(user_id), Some(body)).await
}

/// Send a PUT request with a JSON body as `user_id`.
pub async fn put_json(
    app: Router,
    uri: &str,
    user_id: i64,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "PUT", uri, Some(user_id), Some(body)).await
}

/// Send a GET request, optionally as `user_id`.
pub async fn get_json(app: Router, uri: &str, user_id: Option<i64>) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, user_id, None).await
}

/// Send a DELETE request as `user_id`.
pub async fn delete_json(app: Router, uri: &str, user_id: i64) -> (StatusCode, serde_json::Value) {
    send(app, "DELETE", uri, Some(user_id), None).await
}
