//! Topic registry: one fixed topic, table and service per record category.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// Record category. Each category owns exactly one bus topic and one table in
/// each store. The set is fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Sleep sessions.
    Sleep,
    /// Meals and macronutrients.
    Nutrition,
    /// Physical activity.
    Activity,
    /// Mood, energy and stress.
    Wellbeing,
}

impl Category {
    /// Every category, in topic registration order.
    pub const ALL: [Category; 4] = [
        Category::Sleep,
        Category::Nutrition,
        Category::Activity,
        Category::Wellbeing,
    ];

    /// Bus topic carrying this category's envelopes.
    #[must_use]
    pub const fn topic(self) -> &'static str {
        match self {
            Category::Sleep => "sleep-records",
            Category::Nutrition => "nutrition-records",
            Category::Activity => "activity-records",
            Category::Wellbeing => "wellbeing-records",
        }
    }

    /// Table holding this category in both stores.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Category::Sleep => "sleep_records",
            Category::Nutrition => "nutrition_records",
            Category::Activity => "activity_records",
            Category::Wellbeing => "wellbeing_records",
        }
    }

    /// Name of the logical service monitored for this category.
    #[must_use]
    pub const fn service(self) -> &'static str {
        match self {
            Category::Sleep => "sleep",
            Category::Nutrition => "nutrition",
            Category::Activity => "activity",
            Category::Wellbeing => "wellbeing",
        }
    }

    /// Resolves a topic name back to its category.
    ///
    /// # Errors
    ///
    /// Returns `EnvelopeError::UnknownTopic` for names outside the registry.
    pub fn from_topic(topic: &str) -> Result<Self, EnvelopeError> {
        Self::ALL
            .into_iter()
            .find(|c| c.topic() == topic)
            .ok_or_else(|| EnvelopeError::UnknownTopic(topic.to_owned()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service())
    }
}

impl FromStr for Category {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.service() == s)
            .ok_or_else(|| EnvelopeError::UnknownTopic(s.to_owned()))
    }
}
