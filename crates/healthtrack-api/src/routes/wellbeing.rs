//! Routes for wellbeing check-ins.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use healthtrack_core::record::{DEFAULT_SLEEP_QUALITY, WellbeingFields};
use healthtrack_core::{Category, RecordFields};
use serde::Deserialize;
use tracing::instrument;

use super::records::{self, DeleteResponse, RecordView};
use crate::error::ApiError;
use crate::state::AppState;
use crate::user::UserId;

fn default_sleep_quality() -> i32 {
    DEFAULT_SLEEP_QUALITY
}

#[derive(Debug, Deserialize)]
pub struct WellbeingRequest {
    pub date: NaiveDate,
    pub mood: i32,
    #[serde(default = "default_sleep_quality")]
    pub sleep_quality: i32,
    pub energy_level: i32,
    pub stress_level: i32,
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<WellbeingRequest> for RecordFields {
    fn from(request: WellbeingRequest) -> Self {
        RecordFields::Wellbeing(WellbeingFields {
            date: request.date,
            mood: request.mood,
            sleep_quality: request.sleep_quality,
            energy_level: request.energy_level,
            stress_level: request.stress_level,
            notes: request.notes,
        })
    }
}

#[instrument(skip(state))]
async fn list(State(state): State<AppState>, user: UserId) -> Result<Json<Vec<RecordView>>, ApiError> {
    records::list(&state, user, Category::Wellbeing).await
}

#[instrument(skip(state, request))]
async fn create(
    State(state): State<AppState>,
    user: UserId,
    Json(request): Json<WellbeingRequest>,
) -> Result<(StatusCode, Json<RecordView>), ApiError> {
    records::create(&state, user, request.into()).await
}

#[instrument(skip(state, request))]
async fn update(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<i64>,
    Json(request): Json<WellbeingRequest>,
) -> Result<Json<RecordView>, ApiError> {
    records::update(&state, user, id, request.into()).await
}

#[instrument(skip(state))]
async fn delete(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    records::delete(&state, user, Category::Wellbeing, id).await
}

/// Returns the router for wellbeing check-ins.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", put(update).delete(delete))
}
