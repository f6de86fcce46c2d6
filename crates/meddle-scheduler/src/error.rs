use meddle_push::DispatchError;
use thiserror::Error;

/// Rejected course input. Raised before any scheduling state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("wrong date format: {0}")]
    StartDate(String),

    #[error("wrong time format: {0}")]
    StartTime(String),

    #[error("time interval must be a positive number of hours, got {0}")]
    TimeInterval(i64),

    #[error("duration must not be negative, got {0}")]
    Duration(i64),

    #[error("dosage must not be negative, got {0}")]
    Dosage(i64),

    #[error("medication name must not be empty")]
    EmptyName,
}

/// Errors surfaced by the scheduling core.
///
/// Only `Validation` reaches a caller synchronously; the loops log every
/// other variant and carry on with the next unit of work.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Transient read/write failure in the medication store.
    #[error("store error: {0}")]
    Store(String),

    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("invalid scheduler config: {0}")]
    Config(String),
}

impl SchedulerError {
    pub fn store(err: anyhow::Error) -> Self {
        Self::Store(format!("{:#}", err))
    }

    pub fn medication_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Medication",
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
