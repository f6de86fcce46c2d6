//! Collaborators the scheduling loops consume, and their SQLite adapter.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use meddle_db::Database;
use meddle_types::{Medication, NewMedicationHistory};

use crate::clock::Clock;
use crate::error::{Result, SchedulerError};

/// Medication records, read and written by both loops.
///
/// Single-row writes are assumed atomic; nothing here locks across rows.
#[async_trait]
pub trait MedicationStore: Send + Sync {
    /// Running courses whose next dose is at or before `now`.
    async fn fetch_due(&self, now: DateTime<Utc>) -> Result<Vec<Medication>>;

    /// Running courses whose next dose falls in `[from, until)`.
    async fn fetch_due_soon(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Medication>>;

    /// Persist a new next dose. Last write wins.
    async fn advance(&self, medication_id: i64, next: DateTime<Utc>) -> Result<()>;

    /// Retire a course. Never reverted.
    async fn mark_done(&self, medication_id: i64) -> Result<()>;
}

/// Append-only dose history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, entry: &NewMedicationHistory) -> Result<i64>;
}

/// Maps a user to the push tokens of their devices.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn tokens_for_user(&self, user_id: Uuid) -> Result<Vec<String>>;
}

/// All three collaborators backed by one SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(db.as_ref()))
            .await
            .map_err(|e| SchedulerError::Store(format!("spawn_blocking join error: {}", e)))?
            .map_err(SchedulerError::store)
    }
}

#[async_trait]
impl MedicationStore for SqliteStore {
    async fn fetch_due(&self, now: DateTime<Utc>) -> Result<Vec<Medication>> {
        self.blocking(move |db| db.due_medications(now)).await
    }

    async fn fetch_due_soon(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Medication>> {
        self.blocking(move |db| db.due_soon_medications(from, until)).await
    }

    async fn advance(&self, medication_id: i64, next: DateTime<Utc>) -> Result<()> {
        let now = self.clock.now();
        let changed = self
            .blocking(move |db| db.set_next_dosage_time(medication_id, next, now))
            .await?;
        if !changed {
            return Err(SchedulerError::medication_not_found(medication_id));
        }
        Ok(())
    }

    async fn mark_done(&self, medication_id: i64) -> Result<()> {
        let now = self.clock.now();
        let changed = self
            .blocking(move |db| db.mark_medication_done(medication_id, now))
            .await?;
        if !changed {
            return Err(SchedulerError::medication_not_found(medication_id));
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn append(&self, entry: &NewMedicationHistory) -> Result<i64> {
        let entry = entry.clone();
        let now = self.clock.now();
        self.blocking(move |db| db.insert_history(&entry, now)).await
    }
}

#[async_trait]
impl DeviceDirectory for SqliteStore {
    async fn tokens_for_user(&self, user_id: Uuid) -> Result<Vec<String>> {
        self.blocking(move |db| db.device_tokens_for_user(user_id)).await
    }
}
