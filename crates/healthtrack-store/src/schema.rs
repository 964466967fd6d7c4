//! Per-category column whitelists and the SQL built from them.
//!
//! Only the columns listed here are ever read from or written to a record
//! table, whatever keys an incoming payload carries.

use chrono::{DateTime, Utc};
use healthtrack_core::record::{
    ActivityFields, NutritionFields, SleepFields, WellbeingFields,
};
use healthtrack_core::{Category, DomainRecord, RecordFields};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};

/// Category-specific columns, in bind order.
#[must_use]
pub const fn field_columns(category: Category) -> &'static [&'static str] {
    match category {
        Category::Sleep => &["start_time", "end_time", "quality"],
        Category::Nutrition => &["dish_name", "proteins", "fats", "carbs", "date", "dishes_data"],
        Category::Activity => &["activity_type", "duration", "intensity", "calories_burned", "date"],
        Category::Wellbeing => &[
            "date",
            "mood",
            "sleep_quality",
            "energy_level",
            "stress_level",
            "notes",
        ],
    }
}

/// Full row projection: `id, user_id, <fields>, created_at`.
#[must_use]
pub fn select_columns(category: Category) -> String {
    format!("id, user_id, {}, created_at", field_columns(category).join(", "))
}

fn placeholders(from: usize, count: usize) -> String {
    (from..from + count)
        .map(|n| format!("${n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Write-store insert. Binds: `$1` `user_id`, then the field columns.
#[must_use]
pub fn insert_sql(category: Category) -> String {
    let columns = field_columns(category);
    format!(
        "INSERT INTO {table} (user_id, {cols}) VALUES ($1, {values}) RETURNING {returning}",
        table = category.table(),
        cols = columns.join(", "),
        values = placeholders(2, columns.len()),
        returning = select_columns(category),
    )
}

/// Write-store update scoped by owner. Binds: `$1` id, `$2` `user_id`, then
/// the field columns.
#[must_use]
pub fn update_sql(category: Category) -> String {
    let assignments = field_columns(category)
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{col} = ${}", i + 3))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {table} SET {assignments} WHERE id = $1 AND user_id = $2 RETURNING {returning}",
        table = category.table(),
        returning = select_columns(category),
    )
}

/// How a projection insert treats an existing id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Keep the existing row.
    Ignore,
    /// Overwrite every column except `id`.
    Update,
}

/// Read-store insert of a replicated record. Binds: `$1` id, `$2` `user_id`,
/// the field columns, then `created_at`.
#[must_use]
pub fn projection_insert_sql(category: Category, on_conflict: OnConflict) -> String {
    let columns = field_columns(category);
    let conflict = match on_conflict {
        OnConflict::Ignore => "DO NOTHING".to_owned(),
        OnConflict::Update => {
            let updates = std::iter::once("user_id")
                .chain(columns.iter().copied())
                .chain(std::iter::once("created_at"))
                .map(|col| format!("{col} = EXCLUDED.{col}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("DO UPDATE SET {updates}")
        }
    };
    format!(
        "INSERT INTO {table} (id, user_id, {cols}, created_at) VALUES ($1, $2, {values}, ${created}) ON CONFLICT (id) {conflict}",
        table = category.table(),
        cols = columns.join(", "),
        values = placeholders(3, columns.len()),
        created = columns.len() + 3,
    )
}

/// Binds the category fields in [`field_columns`] order.
pub fn bind_fields<'q>(
    query: Query<'q, Postgres, PgArguments>,
    fields: &RecordFields,
) -> Query<'q, Postgres, PgArguments> {
    match fields {
        RecordFields::Sleep(f) => query.bind(f.start_time).bind(f.end_time).bind(f.quality),
        RecordFields::Nutrition(f) => query
            .bind(f.dish_name.clone())
            .bind(f.proteins)
            .bind(f.fats)
            .bind(f.carbs)
            .bind(f.date)
            .bind(f.dishes_data.clone()),
        RecordFields::Activity(f) => query
            .bind(f.activity_type.clone())
            .bind(f.duration)
            .bind(f.intensity)
            .bind(f.calories_burned)
            .bind(f.date),
        RecordFields::Wellbeing(f) => query
            .bind(f.date)
            .bind(f.mood)
            .bind(f.sleep_quality)
            .bind(f.energy_level)
            .bind(f.stress_level)
            .bind(f.notes.clone()),
    }
}

/// Decodes a row selected with [`select_columns`].
///
/// # Errors
///
/// Returns the `sqlx` decode error for a missing or mistyped column.
pub fn record_from_row(category: Category, row: &PgRow) -> Result<DomainRecord, sqlx::Error> {
    let id: i64 = row.try_get("id")?;
    let user_id: i64 = row.try_get("user_id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let fields = match category {
        Category::Sleep => RecordFields::Sleep(SleepFields {
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            quality: row.try_get("quality")?,
        }),
        Category::Nutrition => RecordFields::Nutrition(NutritionFields {
            dish_name: row.try_get("dish_name")?,
            proteins: row.try_get("proteins")?,
            fats: row.try_get("fats")?,
            carbs: row.try_get("carbs")?,
            date: row.try_get("date")?,
            dishes_data: row.try_get("dishes_data")?,
        }),
        Category::Activity => RecordFields::Activity(ActivityFields {
            activity_type: row.try_get("activity_type")?,
            duration: row.try_get("duration")?,
            intensity: row.try_get("intensity")?,
            calories_burned: row.try_get("calories_burned")?,
            date: row.try_get("date")?,
        }),
        Category::Wellbeing => RecordFields::Wellbeing(WellbeingFields {
            date: row.try_get("date")?,
            mood: row.try_get("mood")?,
            sleep_quality: row.try_get("sleep_quality")?,
            energy_level: row.try_get("energy_level")?,
            stress_level: row.try_get("stress_level")?,
            notes: row.try_get("notes")?,
        }),
    };
    Ok(DomainRecord::from_parts(id, user_id, fields, created_at))
}
