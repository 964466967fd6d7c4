//! Domain records for each category.
//!
//! A record is the row shape shared by the write store, the envelope payload
//! and the read-store projection. Category-specific columns live in a field
//! struct that is flattened into the common `{ id, user_id, created_at }`
//! frame, so unknown payload keys are ignored on decode.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::error::DomainError;

/// A stored record: store-assigned id, owner and category-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<F> {
    /// Store-assigned identifier, unique within the category.
    pub id: i64,
    /// Owning user. Never changes after creation.
    pub user_id: i64,
    /// Category-specific columns.
    #[serde(flatten)]
    pub fields: F,
    /// Write-store creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One night of sleep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepFields {
    /// When the user fell asleep.
    pub start_time: DateTime<Utc>,
    /// When the user woke up.
    pub end_time: DateTime<Utc>,
    /// Self-reported quality, 1-10.
    pub quality: i32,
}

impl SleepFields {
    /// Sleep duration in hours.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_hours(&self) -> f64 {
        (self.end_time - self.start_time).num_seconds() as f64 / 3600.0
    }
}

/// A meal with its macronutrients in grams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionFields {
    /// Name of the dish.
    pub dish_name: String,
    /// Proteins in grams.
    pub proteins: f64,
    /// Fats in grams.
    pub fats: f64,
    /// Carbohydrates in grams.
    pub carbs: f64,
    /// Day the meal was eaten.
    pub date: NaiveDate,
    /// Opaque client-side breakdown of the dish, stored verbatim.
    #[serde(default)]
    pub dishes_data: Option<String>,
}

/// A block of physical activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityFields {
    /// Free-form activity name (e.g. `running`).
    pub activity_type: String,
    /// Duration in minutes.
    pub duration: i32,
    /// Intensity, 1-5 with 3 as the baseline.
    pub intensity: i32,
    /// Derived at write time by [`calories_burned`].
    pub calories_burned: i32,
    /// Day of the activity.
    pub date: NaiveDate,
}

impl ActivityFields {
    /// Builds activity fields, deriving `calories_burned`.
    #[must_use]
    pub fn new(activity_type: String, duration: i32, intensity: i32, date: NaiveDate) -> Self {
        let calories_burned = calories_burned(&activity_type, duration, intensity);
        Self {
            activity_type,
            duration,
            intensity,
            calories_burned,
            date,
        }
    }
}

/// A daily wellbeing check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellbeingFields {
    /// Day of the check-in.
    pub date: NaiveDate,
    /// Mood, 1-10.
    pub mood: i32,
    /// Perceived sleep quality, 1-10.
    pub sleep_quality: i32,
    /// Energy level, 1-10.
    pub energy_level: i32,
    /// Stress level, 1-10.
    pub stress_level: i32,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Default perceived sleep quality when a check-in omits it.
pub const DEFAULT_SLEEP_QUALITY: i32 = 5;

/// Calories burned for an activity: a per-minute base rate by activity type,
/// scaled by `intensity / 3` and by the duration.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn calories_burned(activity_type: &str, duration: i32, intensity: i32) -> i32 {
    let per_minute = match activity_type.trim().to_lowercase().as_str() {
        "running" => 10.0,
        "walking" => 4.0,
        "swimming" => 8.0,
        "cycling" => 7.0,
        "gym" => 6.0,
        "yoga" => 3.0,
        _ => 5.0,
    };
    (per_minute * f64::from(intensity) / 3.0 * f64::from(duration)).round() as i32
}

/// Category-specific fields of a record that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordFields {
    /// Sleep fields.
    Sleep(SleepFields),
    /// Nutrition fields.
    Nutrition(NutritionFields),
    /// Activity fields.
    Activity(ActivityFields),
    /// Wellbeing fields.
    Wellbeing(WellbeingFields),
}

impl RecordFields {
    /// Category these fields belong to.
    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            RecordFields::Sleep(_) => Category::Sleep,
            RecordFields::Nutrition(_) => Category::Nutrition,
            RecordFields::Activity(_) => Category::Activity,
            RecordFields::Wellbeing(_) => Category::Wellbeing,
        }
    }

    /// Checks value ranges before anything reaches the write store.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` describing the first offending field.
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            RecordFields::Sleep(f) => {
                check_range("quality", f.quality, 1, 10)?;
                if f.end_time <= f.start_time {
                    return Err(DomainError::Validation(
                        "end_time must be after start_time".into(),
                    ));
                }
            }
            RecordFields::Nutrition(f) => {
                if f.dish_name.trim().is_empty() {
                    return Err(DomainError::Validation("dish_name is required".into()));
                }
                for (name, value) in [("proteins", f.proteins), ("fats", f.fats), ("carbs", f.carbs)] {
                    if !value.is_finite() || value < 0.0 {
                        return Err(DomainError::Validation(format!(
                            "{name} must be a non-negative number"
                        )));
                    }
                }
            }
            RecordFields::Activity(f) => {
                if f.activity_type.trim().is_empty() {
                    return Err(DomainError::Validation("activity_type is required".into()));
                }
                if f.duration <= 0 {
                    return Err(DomainError::Validation("duration must be positive".into()));
                }
                check_range("intensity", f.intensity, 1, 5)?;
            }
            RecordFields::Wellbeing(f) => {
                check_range("mood", f.mood, 1, 10)?;
                check_range("sleep_quality", f.sleep_quality, 1, 10)?;
                check_range("energy_level", f.energy_level, 1, 10)?;
                check_range("stress_level", f.stress_level, 1, 10)?;
            }
        }
        Ok(())
    }
}

fn check_range(name: &str, value: i32, min: i32, max: i32) -> Result<(), DomainError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(DomainError::Validation(format!(
            "{name} must be between {min} and {max}, got {value}"
        )))
    }
}

/// A stored record of any category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainRecord {
    /// Sleep record.
    Sleep(Record<SleepFields>),
    /// Nutrition record.
    Nutrition(Record<NutritionFields>),
    /// Activity record.
    Activity(Record<ActivityFields>),
    /// Wellbeing record.
    Wellbeing(Record<WellbeingFields>),
}

impl DomainRecord {
    /// Assembles a record from its stored parts.
    #[must_use]
    pub fn from_parts(
        id: i64,
        user_id: i64,
        fields: RecordFields,
        created_at: DateTime<Utc>,
    ) -> Self {
        match fields {
            RecordFields::Sleep(fields) => DomainRecord::Sleep(Record {
                id,
                user_id,
                fields,
                created_at,
            }),
            RecordFields::Nutrition(fields) => DomainRecord::Nutrition(Record {
                id,
                user_id,
                fields,
                created_at,
            }),
            RecordFields::Activity(fields) => DomainRecord::Activity(Record {
                id,
                user_id,
                fields,
                created_at,
            }),
            RecordFields::Wellbeing(fields) => DomainRecord::Wellbeing(Record {
                id,
                user_id,
                fields,
                created_at,
            }),
        }
    }

    /// Decodes a JSON object into the typed record of `category`. Keys outside
    /// the category schema are ignored.
    ///
    /// # Errors
    ///
    /// Returns the serde error when a required column is missing or mistyped.
    pub fn from_json(category: Category, value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match category {
            Category::Sleep => DomainRecord::Sleep(serde_json::from_value(value)?),
            Category::Nutrition => DomainRecord::Nutrition(serde_json::from_value(value)?),
            Category::Activity => DomainRecord::Activity(serde_json::from_value(value)?),
            Category::Wellbeing => DomainRecord::Wellbeing(serde_json::from_value(value)?),
        })
    }

    /// The record's category.
    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            DomainRecord::Sleep(_) => Category::Sleep,
            DomainRecord::Nutrition(_) => Category::Nutrition,
            DomainRecord::Activity(_) => Category::Activity,
            DomainRecord::Wellbeing(_) => Category::Wellbeing,
        }
    }

    /// The record id.
    #[must_use]
    pub fn id(&self) -> i64 {
        match self {
            DomainRecord::Sleep(r) => r.id,
            DomainRecord::Nutrition(r) => r.id,
            DomainRecord::Activity(r) => r.id,
            DomainRecord::Wellbeing(r) => r.id,
        }
    }

    /// The owning user.
    #[must_use]
    pub fn user_id(&self) -> i64 {
        match self {
            DomainRecord::Sleep(r) => r.user_id,
            DomainRecord::Nutrition(r) => r.user_id,
            DomainRecord::Activity(r) => r.user_id,
            DomainRecord::Wellbeing(r) => r.user_id,
        }
    }

    /// Write-store creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            DomainRecord::Sleep(r) => r.created_at,
            DomainRecord::Nutrition(r) => r.created_at,
            DomainRecord::Activity(r) => r.created_at,
            DomainRecord::Wellbeing(r) => r.created_at,
        }
    }

    /// A copy of the category-specific fields.
    #[must_use]
    pub fn fields(&self) -> RecordFields {
        match self {
            DomainRecord::Sleep(r) => RecordFields::Sleep(r.fields.clone()),
            DomainRecord::Nutrition(r) => RecordFields::Nutrition(r.fields.clone()),
            DomainRecord::Activity(r) => RecordFields::Activity(r.fields.clone()),
            DomainRecord::Wellbeing(r) => RecordFields::Wellbeing(r.fields.clone()),
        }
    }
}
