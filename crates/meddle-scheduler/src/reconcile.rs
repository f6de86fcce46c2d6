//! Reconciliation Loop: advances each due medication to its next dose, or
//! retires the course once the next dose would reach its stop date.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use meddle_types::{Medication, NewMedicationHistory};

use crate::clock::Clock;
use crate::dosage::DosageClock;
use crate::error::Result;
use crate::history::{HistoryJob, HistoryRecorder};
use crate::store::MedicationStore;
use crate::timer::RecurringTimer;

/// What a tick does to one due medication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Advance(DateTime<Utc>),
    Complete,
}

/// Decide the next state of a due medication. Pure.
pub fn reconcile(medication: &Medication, dosage: &DosageClock) -> Reconciliation {
    let anchor = medication.next_dosage_time;
    let candidate = anchor + TimeDelta::hours(medication.time_interval);
    let next = dosage.next(candidate, anchor);

    if next < medication.stop_date {
        Reconciliation::Advance(next)
    } else {
        Reconciliation::Complete
    }
}

/// Outcome of one reconciliation tick.
#[derive(Default)]
pub struct TickReport {
    pub due: usize,
    pub advanced: usize,
    pub completed: usize,
    pub failed: usize,
    /// History for every medication seen this tick. `None` when nothing was due.
    pub history: Option<HistoryJob>,
}

pub struct Reconciler {
    store: Arc<dyn MedicationStore>,
    history: HistoryRecorder,
    dosage: DosageClock,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn MedicationStore>,
        history: HistoryRecorder,
        dosage: DosageClock,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            history,
            dosage,
            clock,
        }
    }

    /// One tick at the clock's current time.
    pub async fn tick(&self) -> Result<TickReport> {
        self.tick_at(self.clock.now()).await
    }

    /// One tick at `now`. Only the initial fetch can fail the tick; a failed
    /// write is logged and counted, and the rest of the batch still runs.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let due = self.store.fetch_due(now).await?;
        if due.is_empty() {
            return Ok(TickReport::default());
        }

        let snapshots: Vec<NewMedicationHistory> =
            due.iter().map(NewMedicationHistory::from).collect();
        let mut report = TickReport {
            due: due.len(),
            history: Some(self.history.spawn(snapshots)),
            ..Default::default()
        };

        for medication in &due {
            let result = match reconcile(medication, &self.dosage) {
                Reconciliation::Advance(next) => {
                    self.store.advance(medication.id, next).await.map(|_| {
                        debug!(medication_id = medication.id, next = %next, "Advanced next dose");
                        report.advanced += 1;
                    })
                }
                Reconciliation::Complete => {
                    self.store.mark_done(medication.id).await.map(|_| {
                        info!(medication_id = medication.id, "Medication course complete");
                        report.completed += 1;
                    })
                }
            };

            if let Err(e) = result {
                warn!(medication_id = medication.id, "Reconcile update failed: {}", e);
                report.failed += 1;
            }
        }

        Ok(report)
    }
}

/// Background task that reconciles due medications on every tick of `timer`.
/// Runs for the life of the process.
pub async fn run_reconcile_loop(reconciler: Reconciler, timer: RecurringTimer) {
    let mut ticker = timer.start().await;

    loop {
        let now = ticker.tick().await;

        match reconciler.tick_at(now).await {
            Ok(report) => {
                if report.due > 0 {
                    info!(
                        "Reconcile: {} due, {} advanced, {} completed, {} failed",
                        report.due, report.advanced, report.completed, report.failed
                    );
                }
                if let Some(job) = report.history {
                    tokio::spawn(async move {
                        let history = job.wait().await;
                        if history.failed > 0 {
                            warn!(
                                "History: {} recorded, {} failed",
                                history.recorded, history.failed
                            );
                        }
                    });
                }
            }
            Err(e) => {
                warn!("Reconcile error: {}", e);
            }
        }
    }
}
