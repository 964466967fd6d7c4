//! Routes for nutrition records.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use healthtrack_core::record::NutritionFields;
use healthtrack_core::{Category, RecordFields};
use serde::Deserialize;
use tracing::instrument;

use super::records::{self, DeleteResponse, RecordView};
use crate::error::ApiError;
use crate::state::AppState;
use crate::user::UserId;

/// Request body for POST / and PUT /{id}. Macronutrients are in grams.
#[derive(Debug, Deserialize)]
pub struct NutritionRequest {
    pub dish_name: String,
    pub proteins: f64,
    pub fats: f64,
    pub carbs: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub dishes_data: Option<String>,
}

impl From<NutritionRequest> for RecordFields {
    fn from(request: NutritionRequest) -> Self {
        RecordFields::Nutrition(NutritionFields {
            dish_name: request.dish_name,
            proteins: request.proteins,
            fats: request.fats,
            carbs: request.carbs,
            date: request.date,
            dishes_data: request.dishes_data,
        })
    }
}

#[instrument(skip(state))]
async fn list(State(state): State<AppState>, user: UserId) -> Result<Json<Vec<RecordView>>, ApiError> {
    records::list(&state, user, Category::Nutrition).await
}

#[instrument(skip(state, request), fields(dish_name = %request.dish_name))]
async fn create(
    State(state): State<AppState>,
    user: UserId,
    Json(request): Json<NutritionRequest>,
) -> Result<(StatusCode, Json<RecordView>), ApiError> {
    records::create(&state, user, request.into()).await
}

#[instrument(skip(state, request))]
async fn update(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<i64>,
    Json(request): Json<NutritionRequest>,
) -> Result<Json<RecordView>, ApiError> {
    records::update(&state, user, id, request.into()).await
}

#[instrument(skip(state))]
async fn delete(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    records::delete(&state, user, Category::Nutrition, id).await
}

/// Returns the router for nutrition records.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", put(update).delete(delete))
}
