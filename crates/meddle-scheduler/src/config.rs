use std::time::Duration;

use crate::dosage::{DEFAULT_ROLLOVER_HOUR, DosageClock};
use crate::error::{Result, SchedulerError};

/// Cadences and constants for the two scheduling loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How often due medications are reconciled.
    pub reconcile_interval: Duration,
    /// How often due-soon notifications go out. Also the length of the
    /// look-ahead window.
    pub due_soon_interval: Duration,
    /// Start the due-soon loop on a multiple of its interval.
    pub align_due_soon: bool,
    /// UTC hour a dose is moved to when it would spill into a later day.
    pub rollover_hour: u32,
    /// Upper bound on due-soon units running at once.
    pub max_concurrent_dispatches: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(60),
            due_soon_interval: Duration::from_secs(3600),
            align_due_soon: true,
            rollover_hour: DEFAULT_ROLLOVER_HOUR,
            max_concurrent_dispatches: 32,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reconcile_interval.is_zero() {
            return Err(SchedulerError::Config("reconcile interval must be non-zero".into()));
        }
        if self.due_soon_interval < Duration::from_secs(1) {
            return Err(SchedulerError::Config(
                "due-soon interval must be at least one second".into(),
            ));
        }
        if self.max_concurrent_dispatches == 0 {
            return Err(SchedulerError::Config(
                "max concurrent dispatches must be at least 1".into(),
            ));
        }
        self.dosage_clock()?;
        Ok(())
    }

    pub fn dosage_clock(&self) -> Result<DosageClock> {
        DosageClock::new(self.rollover_hour).ok_or_else(|| {
            SchedulerError::Config(format!("rollover hour {} is not in 0..24", self.rollover_hour))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_cadences() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reconcile_interval, Duration::from_secs(60));
        assert_eq!(config.due_soon_interval, Duration::from_secs(3600));
        assert_eq!(config.dosage_clock().unwrap().rollover_hour(), 9);
    }

    #[test]
    fn rejects_bad_values() {
        let bad_hour = SchedulerConfig {
            rollover_hour: 25,
            ..Default::default()
        };
        assert!(matches!(bad_hour.validate(), Err(SchedulerError::Config(_))));

        let zero_interval = SchedulerConfig {
            reconcile_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(zero_interval.validate().is_err());

        let no_permits = SchedulerConfig {
            max_concurrent_dispatches: 0,
            ..Default::default()
        };
        assert!(no_permits.validate().is_err());
    }
}
