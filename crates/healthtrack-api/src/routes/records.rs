//! Request flow shared by the category routes: write to the write store,
//! then announce the committed row on the bus.

use axum::Json;
use axum::http::StatusCode;
use healthtrack_core::{Category, DomainRecord, Mutation, RecordFields};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use crate::user::UserId;

/// A record as returned to clients. Sleep rows also carry their duration.
#[derive(Debug, Serialize)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: DomainRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f64>,
}

impl From<DomainRecord> for RecordView {
    fn from(record: DomainRecord) -> Self {
        let duration_hours = match &record {
            DomainRecord::Sleep(sleep) => Some(sleep.fields.duration_hours()),
            _ => None,
        };
        Self {
            record,
            duration_hours,
        }
    }
}

/// Response body for DELETE.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub id: i64,
}

pub(crate) async fn list(
    state: &AppState,
    UserId(user_id): UserId,
    category: Category,
) -> Result<Json<Vec<RecordView>>, ApiError> {
    let records = state.records.list(user_id, category).await?;
    Ok(Json(records.into_iter().map(RecordView::from).collect()))
}

pub(crate) async fn create(
    state: &AppState,
    UserId(user_id): UserId,
    fields: RecordFields,
) -> Result<(StatusCode, Json<RecordView>), ApiError> {
    let correlation_id = Uuid::new_v4();
    info!(%correlation_id, category = %fields.category(), "handling create command");
    let committed = state.records.create(user_id, fields).await?;
    let delivered = state
        .publisher
        .record_mutated(&committed.value, Mutation::Created, committed.outbox_id)
        .await;
    info!(%correlation_id, id = committed.value.id(), delivered, "record created");
    Ok((StatusCode::CREATED, Json(committed.value.into())))
}

pub(crate) async fn update(
    state: &AppState,
    UserId(user_id): UserId,
    id: i64,
    fields: RecordFields,
) -> Result<Json<RecordView>, ApiError> {
    let correlation_id = Uuid::new_v4();
    info!(%correlation_id, category = %fields.category(), id, "handling update command");
    let committed = state.records.update(user_id, id, fields).await?;
    let delivered = state
        .publisher
        .record_mutated(&committed.value, Mutation::Updated, committed.outbox_id)
        .await;
    info!(%correlation_id, delivered, "record updated");
    Ok(Json(committed.value.into()))
}

pub(crate) async fn delete(
    state: &AppState,
    UserId(user_id): UserId,
    category: Category,
    id: i64,
) -> Result<Json<DeleteResponse>, ApiError> {
    let correlation_id = Uuid::new_v4();
    info!(%correlation_id, %category, id, "handling delete command");
    let committed = state.records.delete(user_id, category, id).await?;
    let delivered = state
        .publisher
        .record_deleted(category, committed.value, committed.outbox_id)
        .await;
    info!(%correlation_id, delivered, "record deleted");
    Ok(Json(DeleteResponse {
        message: format!("{category} record deleted"),
        id: committed.value,
    }))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use healthtrack_core::Record;
    use healthtrack_core::record::SleepFields;

    use super::*;

    #[test]
    fn test_sleep_view_carries_duration_hours() {
        // Arrange
        let record = DomainRecord::Sleep(Record {
            id: 1,
            user_id: 3,
            fields: SleepFields {
                start_time: Utc.with_ymd_and_hms(2024, 1, 1, 22, 0, 0).unwrap(),
                end_time: Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap(),
                quality: 4,
            },
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 6, 5, 0).unwrap(),
        });

        // Act
        let json = serde_json::to_value(RecordView::from(record)).unwrap();

        // Assert
        assert_eq!(json["id"], 1);
        assert_eq!(json["quality"], 4);
        assert_eq!(json["duration_hours"], 8.0);
    }
}
