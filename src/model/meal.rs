use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema, Display, EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MealKind {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealKind {
    pub const ALL: [MealKind; 3] = [MealKind::Breakfast, MealKind::Lunch, MealKind::Dinner];
}

/// At most one per (identity, date, meal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MealScan {
    pub id: u64,
    pub identity_id: u64,
    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub meal: MealKind,
    #[schema(example = "2026-03-02T12:30:00Z", format = "date-time", value_type = String)]
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMealScan {
    pub identity_id: u64,
    pub date: NaiveDate,
    pub meal: MealKind,
    pub scanned_at: DateTime<Utc>,
}
