use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A medication course owned by a user.
///
/// `next_dosage_time` only moves forward while `done` is false, and never
/// passes `stop_date`. Once `done` is set it stays set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub id: i64,
    pub user_id: Uuid,
    pub name: String,
    pub dosage: i64,
    /// Hours between two doses.
    pub time_interval: i64,
    /// Days the course runs.
    pub duration: i64,
    pub prescribed_by: Option<String>,
    pub purpose: Option<String>,
    pub icon: Option<String>,
    pub start_date: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub next_dosage_time: DateTime<Utc>,
    pub stop_date: DateTime<Utc>,
    pub done: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only snapshot of a dose that was reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationHistory {
    pub id: i64,
    pub medication_id: i64,
    pub name: String,
    pub due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Snapshot taken before a history row is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMedicationHistory {
    pub medication_id: i64,
    pub name: String,
    pub due_at: DateTime<Utc>,
}

impl From<&Medication> for NewMedicationHistory {
    fn from(medication: &Medication) -> Self {
        Self {
            medication_id: medication.id,
            name: medication.name.clone(),
            due_at: medication.next_dosage_time,
        }
    }
}

/// Platform-neutral notification content. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
    pub click_action: String,
}

impl NotificationPayload {
    /// Reminder for a medication whose dose is coming due.
    pub fn dose_reminder(medication: &Medication) -> Self {
        let link = medication_link(medication.id);
        let mut data = HashMap::new();
        data.insert("link".to_string(), link.clone());

        Self {
            title: medication.name.clone(),
            body: format!("'{}' is due", medication.name),
            data,
            click_action: link,
        }
    }
}

/// Client route that opens a medication's detail screen.
pub fn medication_link(medication_id: i64) -> String {
    format!("/user/medication/id?={}", medication_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Medication {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        Medication {
            id: 42,
            user_id: Uuid::nil(),
            name: "Amoxicillin".into(),
            dosage: 2,
            time_interval: 8,
            duration: 5,
            prescribed_by: None,
            purpose: None,
            icon: None,
            start_date: at,
            start_time: at,
            next_dosage_time: at,
            stop_date: at + chrono::Duration::days(5),
            done: false,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn dose_reminder_links_to_medication() {
        let payload = NotificationPayload::dose_reminder(&sample());

        assert_eq!(payload.title, "Amoxicillin");
        assert_eq!(payload.body, "'Amoxicillin' is due");
        assert_eq!(payload.click_action, "/user/medication/id?=42");
        assert_eq!(payload.data.get("link"), Some(&payload.click_action));
    }

    #[test]
    fn history_snapshot_uses_due_instant() {
        let medication = sample();
        let snapshot = NewMedicationHistory::from(&medication);

        assert_eq!(snapshot.medication_id, 42);
        assert_eq!(snapshot.due_at, medication.next_dosage_time);
    }
}
