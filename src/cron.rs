//! Cron schedule parsing and next-run computation.

use chrono::{DateTime, Local, TimeZone};
use croner::Cron;

use crate::error::ScheduleError;

/// A validated five or six field cron expression. Six fields means the
/// first one is seconds.
#[derive(Debug, Clone)]
pub struct Schedule {
    expr: String,
    cron: Cron,
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let invalid = |reason: String| ScheduleError::Invalid {
            expr: expr.to_string(),
            reason,
        };

        let fields = expr.split_whitespace().count();
        if !(5..=6).contains(&fields) {
            return Err(invalid(format!("expected 5 or 6 fields, found {fields}")));
        }

        let cron = Cron::new(expr)
            .with_seconds_optional()
            .parse()
            .map_err(|err| invalid(err.to_string()))?;

        Ok(Schedule {
            expr: expr.to_string(),
            cron,
        })
    }

    /// First fire time strictly after `after`.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Result<DateTime<Tz>, ScheduleError> {
        self.cron
            .find_next_occurrence(after, false)
            .map_err(|_| ScheduleError::NoUpcomingRun(self.expr.clone()))
    }

    pub fn next_run(&self) -> Result<DateTime<Local>, ScheduleError> {
        self.next_after(&Local::now())
    }
}
