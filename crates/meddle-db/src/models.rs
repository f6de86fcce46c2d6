use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Column values for inserting a course or rewriting it on a user edit.
/// The id and timestamps are owned by the database layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMedication {
    pub user_id: Uuid,
    pub name: String,
    pub dosage: i64,
    pub time_interval: i64,
    pub duration: i64,
    pub prescribed_by: Option<String>,
    pub purpose: Option<String>,
    pub icon: Option<String>,
    pub start_date: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub next_dosage_time: DateTime<Utc>,
    pub stop_date: DateTime<Utc>,
    /// The course ended before its first dose. An edit can set this but
    /// never clears it.
    pub done: bool,
}
