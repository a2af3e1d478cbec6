use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

/// Flat persisted form of one time block: one row per block per day.
///
/// `date` is the authoritative week-disambiguator; `day` is a convenience
/// label and may be stale or empty in old data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduleRow {
    pub id: i64,
    pub user_id: i64,
    pub day: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub label: String,
    pub all_day: bool,
    pub created_at: DateTime<Utc>,
}
