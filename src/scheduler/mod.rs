//! Scheduled health checks, independent of the event feed.
//!
//! Each configured check sleeps until its next wall-clock firing, launches a
//! run with the same revision as test target and baseline, and never reports
//! anywhere except the ledger. Firings missed while the process was down are
//! not caught up.

pub mod cron;

pub use self::cron::{preview, HealthCheck};

use chrono::{DateTime, Local, TimeZone};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::WatcherConfig;
use crate::launcher::{Launcher, RunRequest, RunTicket};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },
}

#[derive(Clone)]
pub struct Scheduler {
    launcher: Launcher,
    checks: Vec<HealthCheck>,
    run_name_prefix: String,
}

impl Scheduler {
    pub fn new(
        launcher: Launcher,
        checks: Vec<HealthCheck>,
        run_name_prefix: impl Into<String>,
    ) -> Self {
        Self {
            launcher,
            checks,
            run_name_prefix: run_name_prefix.into(),
        }
    }

    /// Build the scheduler from configuration, rejecting bad cron expressions.
    pub fn from_config(launcher: Launcher, config: &WatcherConfig) -> Result<Self, SchedulerError> {
        let checks = health_checks(config)?;
        Ok(Self::new(launcher, checks, config.sandbox.run_name_prefix.clone()))
    }

    /// The run for a health check of `revision` fired at `at`.
    pub fn request_for<Tz: TimeZone>(&self, revision: &str, at: &DateTime<Tz>) -> RunRequest
    where
        Tz::Offset: std::fmt::Display,
    {
        RunRequest {
            revision_under_test: revision.to_string(),
            baseline_revision: revision.to_string(),
            run_name: format!(
                "{}-health-{}-{}",
                self.run_name_prefix,
                sanitize(revision),
                at.timestamp()
            ),
            title: format!("health check {} {}", revision, at.format("%Y-%m-%d %H:%M")),
            url: None,
        }
    }

    /// Launch a health check now. The ticket can be awaited but nothing
    /// needs to: health checks have no completion hook.
    pub fn fire(&self, revision: &str) -> Option<RunTicket> {
        let request = self.request_for(revision, &Local::now());
        info!(%revision, run = %request.run_name, "starting health check");
        match self.launcher.launch(request) {
            Ok(ticket) => Some(ticket),
            Err(e) => {
                error!(%revision, error = %e, "could not launch health check");
                None
            }
        }
    }

    /// Run every check on its schedule until the task is dropped.
    pub async fn run(self) {
        if self.checks.is_empty() {
            warn!("no health checks configured");
            return;
        }
        let mut tasks = tokio::task::JoinSet::new();
        for check in self.checks.clone() {
            let scheduler = self.clone();
            tasks.spawn(async move { scheduler.run_check(check).await });
        }
        while tasks.join_next().await.is_some() {}
    }

    async fn run_check(&self, check: HealthCheck) {
        info!(revision = %check.revision, cron = %check.cron_expr, "health check scheduled");
        let mut last = Local::now();
        loop {
            let Some(next) = check.next_due(&last, &Local::now()) else {
                warn!(revision = %check.revision, "cron schedule has no further firings");
                return;
            };
            let wait = (next - Local::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            // Dropping the ticket: nobody is told about the outcome.
            let _ = self.fire(&check.revision);
            last = next;
        }
    }
}

/// Parse the configured health checks.
pub fn health_checks(config: &WatcherConfig) -> Result<Vec<HealthCheck>, SchedulerError> {
    config.health_checks.iter().map(HealthCheck::from_config).collect()
}

// Container names allow [a-zA-Z0-9_.-].
fn sanitize(revision: &str) -> String {
    revision
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealthCheckConfig;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("5.12"), "5.12");
        assert_eq!(sanitize("refs/heads/dev"), "refs-heads-dev");
    }

    #[test]
    fn test_bad_cron_in_config() {
        let config = WatcherConfig {
            health_checks: vec![HealthCheckConfig {
                revision: "dev".to_string(),
                cron: "0 0 25 * * *".to_string(),
            }],
            ..WatcherConfig::default()
        };
        let err = health_checks(&config).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    }

    #[tokio::test]
    async fn test_run_fires_on_schedule() {
        use crate::launcher::{RunRequest, Sandbox};
        use crate::ledger::{Ledger, RunStatus};
        use std::sync::Arc;
        use std::time::Duration;

        struct Succeed;

        impl Sandbox for Succeed {
            fn command(&self, _request: &RunRequest) -> tokio::process::Command {
                let mut cmd = tokio::process::Command::new("sh");
                cmd.args(["-c", "exit 0"]);
                cmd
            }
        }

        let dir = tempfile::TempDir::new().unwrap();
        let ledger = Ledger::load(dir.path().join("runs.json")).await.unwrap();
        let launcher = Launcher::new(ledger.clone(), Arc::new(Succeed), dir.path().join("logs"));
        let scheduler = Scheduler::new(
            launcher,
            vec![HealthCheck::new("dev", "* * * * * *").unwrap()],
            "gerrit-watcher",
        );

        let task = tokio::spawn(scheduler.run());
        let fired = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let runs = ledger.snapshot();
                if runs.iter().any(|r| r.status == RunStatus::Passed) {
                    return runs;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("health check did not fire");
        task.abort();

        for run in &fired {
            assert!(run.run_id.starts_with("gerrit-watcher-health-dev-"));
            assert_eq!(run.revision_under_test, "dev");
            assert_eq!(run.baseline_revision, "dev");
            assert!(run.url.is_none());
        }
        // One firing per second at most: run ids never collide.
        let mut ids: Vec<_> = fired.iter().map(|r| r.run_id.clone()).collect();
        ids.dedup();
        assert_eq!(ids.len(), fired.len());
    }

    #[test]
    fn test_default_checks_parse() {
        let checks = health_checks(&WatcherConfig::default()).unwrap();
        assert_eq!(checks.len(), 2);
    }
}
