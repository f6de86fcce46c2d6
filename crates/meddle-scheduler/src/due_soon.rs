//! Due-Soon Loop: finds doses coming due and pushes a reminder to each
//! owner's devices.
//!
//! Every due medication is an independent unit of work in a bounded task
//! group. A tick spawns its units and returns; their outcomes are reaped on
//! later ticks and only logged.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use meddle_push::Dispatcher;
use meddle_types::{Medication, NotificationPayload};

use crate::clock::Clock;
use crate::error::{Result, SchedulerError};
use crate::store::{DeviceDirectory, MedicationStore};
use crate::timer::{RecurringTimer, nearest_boundary};

/// How one unit of work ended.
#[derive(Debug)]
pub enum DispatchOutcome {
    Sent { medication_id: i64, tokens: usize },
    NoDevices { medication_id: i64 },
    Failed { medication_id: i64, error: SchedulerError },
}

impl DispatchOutcome {
    pub fn medication_id(&self) -> i64 {
        match self {
            Self::Sent { medication_id, .. }
            | Self::NoDevices { medication_id }
            | Self::Failed { medication_id, .. } => *medication_id,
        }
    }
}

/// Task group that runs at most `limit` units at once.
///
/// Units are spawned immediately and wait for a permit inside their task, so
/// spawning never blocks the caller.
pub struct DispatchGroup {
    tasks: JoinSet<DispatchOutcome>,
    permits: Arc<Semaphore>,
}

impl DispatchGroup {
    pub fn new(limit: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            permits: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    pub fn spawn<F>(&mut self, unit: F)
    where
        F: Future<Output = DispatchOutcome> + Send + 'static,
    {
        let permits = self.permits.clone();
        self.tasks.spawn(async move {
            // The semaphore is never closed.
            let _permit = permits.acquire_owned().await;
            unit.await
        });
    }

    /// Units spawned and not yet reaped.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Collect the units that already finished, without waiting.
    pub fn reap(&mut self) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        while let Some(joined) = self.tasks.try_join_next() {
            if let Some(outcome) = unwrap_joined(joined) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Wait for every outstanding unit.
    pub async fn join_all(&mut self) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            if let Some(outcome) = unwrap_joined(joined) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}

fn unwrap_joined(
    joined: std::result::Result<DispatchOutcome, tokio::task::JoinError>,
) -> Option<DispatchOutcome> {
    match joined {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!("Dispatch task aborted: {}", e);
            None
        }
    }
}

pub struct DueSoonNotifier {
    store: Arc<dyn MedicationStore>,
    directory: Arc<dyn DeviceDirectory>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    window: Duration,
    aligned: bool,
    covered_until: Option<DateTime<Utc>>,
    group: DispatchGroup,
}

impl DueSoonNotifier {
    pub fn new(
        store: Arc<dyn MedicationStore>,
        directory: Arc<dyn DeviceDirectory>,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        window: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            directory,
            dispatcher,
            clock,
            window,
            aligned: false,
            covered_until: None,
            group: DispatchGroup::new(max_concurrent),
        }
    }

    /// Snap each window to the period boundary nearest the tick, so ticks
    /// that fire slightly early or late still cover their own period.
    pub fn aligned(mut self, aligned: bool) -> Self {
        self.aligned = aligned;
        self
    }

    /// The window a tick at `now` covers: `[start, start + window)`.
    /// Never starts before the end of the previous tick's window.
    pub fn window_at(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = if self.aligned {
            nearest_boundary(now, self.window)
        } else {
            now
        };
        let start = match self.covered_until {
            Some(covered) if covered > start => covered,
            _ => start,
        };
        let length = TimeDelta::from_std(self.window).unwrap_or(TimeDelta::hours(1));
        (start, start + length)
    }

    pub fn group_mut(&mut self) -> &mut DispatchGroup {
        &mut self.group
    }

    /// One tick at the clock's current time. Returns how many units were spawned.
    pub async fn tick(&mut self) -> Result<usize> {
        self.tick_at(self.clock.now()).await
    }

    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Result<usize> {
        for outcome in self.group.reap() {
            log_outcome(&outcome);
        }

        let (from, until) = self.window_at(now);
        let due = self.store.fetch_due_soon(from, until).await?;
        self.covered_until = Some(until);

        for medication in &due {
            let directory = self.directory.clone();
            let dispatcher = self.dispatcher.clone();
            let medication = medication.clone();
            self.group
                .spawn(async move { notify(directory.as_ref(), &dispatcher, &medication).await });
        }

        Ok(due.len())
    }
}

/// Look up the owner's devices and send one reminder to all of them.
/// A failed lookup is logged and treated as "no devices".
pub async fn notify(
    directory: &dyn DeviceDirectory,
    dispatcher: &Dispatcher,
    medication: &Medication,
) -> DispatchOutcome {
    let medication_id = medication.id;

    let tokens = match directory.tokens_for_user(medication.user_id).await {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!(
                medication_id,
                user_id = %medication.user_id,
                "Device token lookup failed, skipping reminder: {}",
                e
            );
            return DispatchOutcome::NoDevices { medication_id };
        }
    };

    if tokens.is_empty() {
        warn!(medication_id, user_id = %medication.user_id, "No device tokens; skipping reminder");
        return DispatchOutcome::NoDevices { medication_id };
    }

    let payload = NotificationPayload::dose_reminder(medication);
    match dispatcher.send(tokens, &payload).await {
        Ok(message) => {
            info!(medication_id, tokens = message.tokens.len(), "Dose reminder sent");
            DispatchOutcome::Sent {
                medication_id,
                tokens: message.tokens.len(),
            }
        }
        Err(e) => {
            error!(medication_id, "Sending dose reminder failed: {}", e);
            DispatchOutcome::Failed {
                medication_id,
                error: e.into(),
            }
        }
    }
}

fn log_outcome(outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Sent { medication_id, tokens } => {
            debug!(medication_id, tokens, "Reaped dispatch: sent")
        }
        DispatchOutcome::NoDevices { medication_id } => {
            debug!(medication_id, "Reaped dispatch: no devices")
        }
        DispatchOutcome::Failed { medication_id, error } => {
            debug!(medication_id, "Reaped dispatch: failed ({})", error)
        }
    }
}

/// Background task that sends due-soon reminders on every tick of `timer`.
/// Runs for the life of the process.
pub async fn run_due_soon_loop(mut notifier: DueSoonNotifier, timer: RecurringTimer) {
    let mut ticker = timer.start().await;

    loop {
        let now = ticker.tick().await;

        match notifier.tick_at(now).await {
            Ok(count) => {
                if count > 0 {
                    info!("Due-soon: {} reminders queued", count);
                }
            }
            Err(e) => {
                warn!("Due-soon error: {}", e);
            }
        }
    }
}
