use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use cron::Schedule as CronSchedule;

use super::SchedulerError;
use crate::config::HealthCheckConfig;

/// A health check bound to a parsed cron schedule.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub revision: String,
    pub cron_expr: String,
    schedule: CronSchedule,
}

impl HealthCheck {
    pub fn new(revision: impl Into<String>, cron_expr: &str) -> Result<Self, SchedulerError> {
        let schedule =
            CronSchedule::from_str(cron_expr).map_err(|e| SchedulerError::InvalidCron {
                expr: cron_expr.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            revision: revision.into(),
            cron_expr: cron_expr.to_string(),
            schedule,
        })
    }

    pub fn from_config(config: &HealthCheckConfig) -> Result<Self, SchedulerError> {
        Self::new(config.revision.clone(), &config.cron)
    }

    /// First firing strictly after `after`.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(after).next()
    }

    /// Next firing once `last` has fired and the clock reads `now`.
    ///
    /// Firings between `last` and `now` are skipped, not replayed.
    pub fn next_due<Tz: TimeZone>(
        &self,
        last: &DateTime<Tz>,
        now: &DateTime<Tz>,
    ) -> Option<DateTime<Tz>> {
        self.next_after(if last > now { last } else { now })
    }
}

/// Every firing in the `hours` following `from`, in time order.
/// This is strictly a dry-run preview, not the execution loop.
pub fn preview<Tz: TimeZone>(
    checks: &[HealthCheck],
    from: &DateTime<Tz>,
    hours: u64,
) -> Vec<(DateTime<Tz>, String)> {
    let end = from.clone() + chrono::Duration::hours(hours as i64);
    let mut upcoming = Vec::new();

    for check in checks {
        for next_time in check.schedule.after(from) {
            if next_time > end {
                break;
            }
            upcoming.push((next_time, check.revision.clone()));
        }
    }

    upcoming.sort_by(|a, b| a.0.cmp(&b.0));
    upcoming
}
