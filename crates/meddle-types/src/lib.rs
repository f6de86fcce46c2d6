//! Shared domain and wire types for the meddle medication-reminder backend.

pub mod api;
pub mod models;

pub use models::{
    Medication, MedicationHistory, NewMedicationHistory, NotificationPayload, medication_link,
};
