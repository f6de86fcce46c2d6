//! Recurring timer with optional wall-clock alignment.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

use crate::clock::Clock;

/// A fixed-period timer. When aligned, the first tick waits for the next
/// multiple of the period since the Unix epoch (UTC), so an hourly timer
/// ticks at `:00:00`.
pub struct RecurringTimer {
    period: Duration,
    aligned: bool,
    clock: Arc<dyn Clock>,
}

impl RecurringTimer {
    pub fn new(period: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            period,
            aligned: false,
            clock,
        }
    }

    pub fn aligned(mut self, aligned: bool) -> Self {
        self.aligned = aligned;
        self
    }

    /// Wait out the alignment delay (if any) and return the running ticker.
    /// The first `tick` completes immediately.
    pub async fn start(self) -> Ticker {
        if self.aligned {
            let delay = delay_to_boundary(self.clock.now(), self.period);
            debug!(delay_ms = delay.as_millis() as u64, "Aligning timer to period boundary");
            tokio::time::sleep(delay).await;
        }

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Ticker {
            interval,
            clock: self.clock,
        }
    }
}

pub struct Ticker {
    interval: Interval,
    clock: Arc<dyn Clock>,
}

impl Ticker {
    /// Wait for the next tick and return the clock's time at that tick.
    pub async fn tick(&mut self) -> DateTime<Utc> {
        self.interval.tick().await;
        self.clock.now()
    }
}

/// Time left until the next multiple of `period`. Zero when `now` already
/// sits on a boundary or `period` is shorter than a millisecond.
pub fn delay_to_boundary(now: DateTime<Utc>, period: Duration) -> Duration {
    let period_ms = period.as_millis() as i64;
    if period_ms <= 0 {
        return Duration::ZERO;
    }

    let into = now.timestamp_millis().rem_euclid(period_ms);
    if into == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((period_ms - into) as u64)
    }
}

/// Start of the period that contains `now`.
pub fn floor_to_boundary(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let period_ms = period.as_millis() as i64;
    if period_ms <= 0 {
        return now;
    }

    let into = now.timestamp_millis().rem_euclid(period_ms);
    now - TimeDelta::milliseconds(into)
        - TimeDelta::nanoseconds((now.timestamp_subsec_nanos() % 1_000_000) as i64)
}

/// The boundary closest to `now`, so a tick that fires a little early or
/// late still lands on the boundary it was scheduled for.
pub fn nearest_boundary(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let half = TimeDelta::from_std(period / 2).unwrap_or(TimeDelta::zero());
    floor_to_boundary(now + half, period)
}
