//! Dashboard summary over the read store.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use healthtrack_core::Category;
use serde::Serialize;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;
use crate::user::UserId;

/// Response body for GET /summary.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct SummaryResponse {
    pub sleep: i64,
    pub nutrition: i64,
    pub activity: i64,
    pub wellbeing: i64,
    pub total: i64,
}

impl SummaryResponse {
    fn set(&mut self, category: Category, count: i64) {
        match category {
            Category::Sleep => self.sleep = count,
            Category::Nutrition => self.nutrition = count,
            Category::Activity => self.activity = count,
            Category::Wellbeing => self.wellbeing = count,
        }
        self.total += count;
    }
}

/// GET /summary
#[instrument(skip(state))]
async fn summary(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<SummaryResponse>, ApiError> {
    let mut summary = SummaryResponse::default();
    for category in Category::ALL {
        summary.set(category, state.records.count(user_id, category).await?);
    }
    Ok(Json(summary))
}

/// Returns the router for the dashboard.
pub fn router() -> Router<AppState> {
    Router::new().route("/summary", get(summary))
}
