//! History Recorder: writes one append-only snapshot per reconciled dose.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, warn};

use meddle_types::NewMedicationHistory;

use crate::store::HistoryStore;

/// Result of one history batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryReport {
    pub recorded: usize,
    pub failed: usize,
}

/// A batch being written in the background.
///
/// Dropping the job detaches it; the writes still run.
pub struct HistoryJob {
    handle: JoinHandle<HistoryReport>,
    expected: usize,
}

impl HistoryJob {
    /// Entries in the batch.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Wait for the batch. A task that died counts every entry as failed.
    pub async fn wait(self) -> HistoryReport {
        match self.handle.await {
            Ok(report) => report,
            Err(e) => {
                error!("History job aborted: {}", e);
                HistoryReport {
                    recorded: 0,
                    failed: self.expected,
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Write the batch on a background task.
    pub fn spawn(&self, batch: Vec<NewMedicationHistory>) -> HistoryJob {
        let expected = batch.len();
        let recorder = self.clone();
        let handle = tokio::spawn(async move { recorder.record_all(&batch).await });
        HistoryJob { handle, expected }
    }

    /// Write every entry, logging each failure. Failures are not retried.
    pub async fn record_all(&self, batch: &[NewMedicationHistory]) -> HistoryReport {
        let mut report = HistoryReport::default();

        for entry in batch {
            match self.store.append(entry).await {
                Ok(_) => report.recorded += 1,
                Err(e) => {
                    warn!(
                        medication_id = entry.medication_id,
                        due_at = %entry.due_at,
                        "Failed to record medication history: {}",
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}
