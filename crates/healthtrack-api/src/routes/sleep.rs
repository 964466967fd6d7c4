//! Routes for sleep records.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use healthtrack_core::record::SleepFields;
use healthtrack_core::{Category, RecordFields};
use serde::Deserialize;
use tracing::instrument;

use super::records::{self, DeleteResponse, RecordView};
use crate::error::ApiError;
use crate::state::AppState;
use crate::user::UserId;

/// Request body for POST / and PUT /{id}.
#[derive(Debug, Deserialize)]
pub struct SleepRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub quality: i32,
}

impl From<SleepRequest> for RecordFields {
    fn from(request: SleepRequest) -> Self {
        RecordFields::Sleep(SleepFields {
            start_time: request.start_time,
            end_time: request.end_time,
            quality: request.quality,
        })
    }
}

/// GET /
#[instrument(skip(state))]
async fn list(State(state): State<AppState>, user: UserId) -> Result<Json<Vec<RecordView>>, ApiError> {
    records::list(&state, user, Category::Sleep).await
}

/// POST /
#[instrument(skip(state, request))]
async fn create(
    State(state): State<AppState>,
    user: UserId,
    Json(request): Json<SleepRequest>,
) -> Result<(StatusCode, Json<RecordView>), ApiError> {
    records::create(&state, user, request.into()).await
}

/// PUT /{id}
#[instrument(skip(state, request))]
async fn update(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<i64>,
    Json(request): Json<SleepRequest>,
) -> Result<Json<RecordView>, ApiError> {
    records::update(&state, user, id, request.into()).await
}

/// DELETE /{id}
#[instrument(skip(state))]
async fn delete(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    records::delete(&state, user, Category::Sleep, id).await
}

/// Returns the router for sleep records.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", put(update).delete(delete))
}
