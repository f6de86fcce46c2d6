use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Medication;

// -- JWT Claims --

/// Bearer token claims. `sub` is the owning user of every medication and
/// device token the request touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

// -- Medications --

/// Body of `POST /medications` and `PUT /medications/{id}`.
///
/// `start_date` and `start_time` are RFC 3339 strings and are validated
/// before any scheduling state is touched.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MedicationRequest {
    pub name: String,
    pub dosage: i64,
    pub time_interval: i64,
    pub duration: i64,
    pub start_date: String,
    pub start_time: String,
    #[serde(default)]
    pub prescribed_by: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MedicationResponse {
    pub id: i64,
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
    pub done: bool,
}

impl From<Medication> for MedicationResponse {
    fn from(m: Medication) -> Self {
        Self {
            id: m.id,
            name: m.name,
            dosage: m.dosage,
            time_interval: m.time_interval,
            duration: m.duration,
            prescribed_by: m.prescribed_by,
            purpose: m.purpose,
            icon: m.icon,
            start_date: m.start_date,
            start_time: m.start_time,
            next_dosage_time: m.next_dosage_time,
            stop_date: m.stop_date,
            done: m.done,
        }
    }
}

/// Query string of `GET /medications/search`. Every filter is optional;
/// the set ones must all match.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MedicationSearch {
    pub name: Option<String>,
    pub prescribed_by: Option<String>,
    pub purpose: Option<String>,
    pub dosage: Option<i64>,
    pub duration: Option<i64>,
}

// -- Devices --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterDeviceRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterDeviceResponse {
    pub token: String,
    pub user_id: Uuid,
}

// -- Errors --

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
