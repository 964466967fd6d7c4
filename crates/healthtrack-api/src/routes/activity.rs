//! Routes for activity records.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use healthtrack_core::record::ActivityFields;
use healthtrack_core::{Category, RecordFields};
use serde::Deserialize;
use tracing::instrument;

use super::records::{self, DeleteResponse, RecordView};
use crate::error::ApiError;
use crate::state::AppState;
use crate::user::UserId;

/// Request body for POST / and PUT /{id}. `calories_burned` is derived and
/// not accepted from clients.
#[derive(Debug, Deserialize)]
pub struct ActivityRequest {
    pub activity_type: String,
    /// Minutes.
    pub duration: i32,
    pub intensity: i32,
    pub date: NaiveDate,
}

impl From<ActivityRequest> for RecordFields {
    fn from(request: ActivityRequest) -> Self {
        RecordFields::Activity(ActivityFields::new(
            request.activity_type,
            request.duration,
            request.intensity,
            request.date,
        ))
    }
}

#[instrument(skip(state))]
async fn list(State(state): State<AppState>, user: UserId) -> Result<Json<Vec<RecordView>>, ApiError> {
    records::list(&state, user, Category::Activity).await
}

#[instrument(skip(state, request), fields(activity_type = %request.activity_type))]
async fn create(
    State(state): State<AppState>,
    user: UserId,
    Json(request): Json<ActivityRequest>,
) -> Result<(StatusCode, Json<RecordView>), ApiError> {
    records::create(&state, user, request.into()).await
}

#[instrument(skip(state, request))]
async fn update(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<i64>,
    Json(request): Json<ActivityRequest>,
) -> Result<Json<RecordView>, ApiError> {
    records::update(&state, user, id, request.into()).await
}

#[instrument(skip(state))]
async fn delete(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    records::delete(&state, user, Category::Activity, id).await
}

/// Returns the router for activity records.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", put(update).delete(delete))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use healthtrack_test_support::InMemoryRecordRepository;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::state::testing::state_with;

    #[tokio::test]
    async fn test_create_derives_calories_burned() {
        // Arrange
        let app = router().with_state(state_with(Arc::new(InMemoryRecordRepository::default())));
        let body = json!({
            "activity_type": "Running",
            "duration": 30,
            "intensity": 4,
            "date": "2024-01-02",
            "calories_burned": 1
        });
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .header("x-user-id", "2")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();

        // Act
        let response = app.oneshot(request).await.unwrap();

        // Assert: 10 kcal/min * 4/3 * 30 min.
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["calories_burned"], 400);
    }

    #[tokio::test]
    async fn test_delete_returns_message_and_id() {
        // Arrange
        let repo = Arc::new(InMemoryRecordRepository::default());
        let app = router().with_state(state_with(repo.clone()));
        let committed = healthtrack_core::repository::RecordRepository::create(
            repo.as_ref(),
            2,
            ActivityRequest {
                activity_type: "yoga".into(),
                duration: 45,
                intensity: 2,
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            }
            .into(),
        )
        .await
        .unwrap();
        let id = committed.value.id();
        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/{id}"))
            .header("x-user-id", "2")
            .body(Body::empty())
            .unwrap();

        // Act
        let response = app.oneshot(request).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["id"], id);
        assert_eq!(json["message"], "activity record deleted");
        assert_eq!(repo.outbox().entries().len(), 2);
    }
}
