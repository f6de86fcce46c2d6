//! Dosage Clock: where the next dose of a course lands.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc};

pub const DEFAULT_ROLLOVER_HOUR: u32 = 9;

/// Computes the next dose instant from a candidate and its anchor.
///
/// A candidate on or before the anchor's calendar day is kept, truncated to
/// the minute. A candidate that spills into a later day is pulled back to the
/// day after the anchor, at the rollover hour. All arithmetic is UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosageClock {
    rollover: NaiveTime,
}

impl DosageClock {
    /// `None` unless `rollover_hour` is in `0..24`.
    pub fn new(rollover_hour: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(rollover_hour, 0, 0).map(|rollover| Self { rollover })
    }

    pub fn rollover_hour(&self) -> u32 {
        self.rollover.hour()
    }

    pub fn next(&self, candidate: DateTime<Utc>, anchor: DateTime<Utc>) -> DateTime<Utc> {
        if candidate.date_naive() <= anchor.date_naive() {
            return truncate_to_minute(candidate);
        }

        let day_after = anchor.date_naive().succ_opt().unwrap_or(NaiveDate::MAX);
        day_after.and_time(self.rollover).and_utc()
    }
}

impl Default for DosageClock {
    fn default() -> Self {
        Self {
            rollover: NaiveTime::from_hms_opt(DEFAULT_ROLLOVER_HOUR, 0, 0).unwrap_or_default(),
        }
    }
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t - TimeDelta::seconds(t.second() as i64) - TimeDelta::nanoseconds(t.nanosecond() as i64)
}
