//! Dose scheduling core: the Dosage Clock, the two recurring loops and the
//! collaborators they run against.

pub mod clock;
pub mod config;
pub mod course;
pub mod dosage;
pub mod due_soon;
pub mod error;
pub mod history;
pub mod reconcile;
pub mod store;
pub mod timer;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use meddle_push::Dispatcher;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use course::{plan_course_edit, plan_new_course};
pub use dosage::DosageClock;
pub use due_soon::{DispatchGroup, DispatchOutcome, DueSoonNotifier};
pub use error::{Result, SchedulerError, ValidationError};
pub use history::{HistoryJob, HistoryRecorder, HistoryReport};
pub use reconcile::{Reconciler, Reconciliation, TickReport};
pub use store::{DeviceDirectory, HistoryStore, MedicationStore, SqliteStore};
pub use timer::RecurringTimer;

/// Handles of the two background loops.
pub struct Scheduler {
    pub reconcile: JoinHandle<()>,
    pub due_soon: JoinHandle<()>,
}

impl Scheduler {
    /// Validate `config` and start both loops on the current runtime.
    ///
    /// The loops share nothing but the store; each keeps its own cadence.
    pub fn spawn<S>(
        config: &SchedulerConfig,
        store: S,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
    ) -> Result<Self>
    where
        S: MedicationStore + HistoryStore + DeviceDirectory + Clone + 'static,
    {
        config.validate()?;
        let dosage = config.dosage_clock()?;

        let reconciler = Reconciler::new(
            Arc::new(store.clone()),
            HistoryRecorder::new(Arc::new(store.clone())),
            dosage,
            clock.clone(),
        );
        let reconcile_timer = RecurringTimer::new(config.reconcile_interval, clock.clone());

        let notifier = DueSoonNotifier::new(
            Arc::new(store.clone()),
            Arc::new(store),
            dispatcher,
            clock.clone(),
            config.due_soon_interval,
            config.max_concurrent_dispatches,
        )
        .aligned(config.align_due_soon);
        let due_soon_timer = RecurringTimer::new(config.due_soon_interval, clock)
            .aligned(config.align_due_soon);

        info!(
            reconcile_secs = config.reconcile_interval.as_secs(),
            due_soon_secs = config.due_soon_interval.as_secs(),
            rollover_hour = config.rollover_hour,
            "Scheduler started"
        );

        Ok(Self {
            reconcile: tokio::spawn(reconcile::run_reconcile_loop(reconciler, reconcile_timer)),
            due_soon: tokio::spawn(due_soon::run_due_soon_loop(notifier, due_soon_timer)),
        })
    }

    pub fn abort(&self) {
        self.reconcile.abort();
        self.due_soon.abort();
    }
}
