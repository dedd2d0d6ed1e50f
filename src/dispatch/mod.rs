//! Event dispatcher -- turn patch-set events into test runs.
//!
//! The dispatcher holds one subscription to the event feed at a time. When
//! the stream ends it subscribes again immediately; only a failure to open
//! the subscription at all waits `reconnect_delay` before the next attempt.

pub mod event;
pub mod feed;

pub use event::{Account, Change, PatchSet, PatchsetCreated, StreamEvent};
pub use feed::{EventSource, FeedError, SshEventSource};

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::launcher::{LaunchError, Launcher, RunRequest};
use crate::reporter::{OutcomeReporter, PatchSetRef};
use crate::version;

pub struct Dispatcher {
    project: String,
    run_name_prefix: String,
    launcher: Launcher,
    reporter: OutcomeReporter,
    reconnect_delay: Duration,
}

impl Dispatcher {
    pub fn new(
        project: impl Into<String>,
        run_name_prefix: impl Into<String>,
        launcher: Launcher,
        reporter: OutcomeReporter,
    ) -> Self {
        Self {
            project: project.into(),
            run_name_prefix: run_name_prefix.into(),
            launcher,
            reporter,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Consume `source` forever, resubscribing whenever the stream ends.
    pub async fn run<S: EventSource + ?Sized>(&self, source: &S) {
        info!(project = %self.project, "event dispatcher started");
        loop {
            let mut events = match source.subscribe().await {
                Ok(events) => events,
                Err(e) => {
                    error!(
                        error = %e,
                        retry_in_secs = self.reconnect_delay.as_secs(),
                        "could not subscribe to event stream"
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                    continue;
                }
            };

            while let Some(event) = events.recv().await {
                self.handle(event);
            }
            info!("event stream ended, resubscribing");
        }
    }

    /// The run an event asks for, or `None` if the event is filtered out.
    pub fn request_for(&self, event: &PatchsetCreated) -> Option<RunRequest> {
        let change = &event.change;
        let patch_set = &event.patch_set;

        if change.project != self.project {
            return None;
        }
        if !version::is_eligible(&change.branch) {
            debug!(
                change = change.number,
                branch = %change.branch,
                "ignoring patch set on unsupported branch"
            );
            return None;
        }

        Some(RunRequest {
            revision_under_test: patch_set.git_ref.clone(),
            baseline_revision: change.branch.clone(),
            run_name: format!(
                "{}-{}-{}",
                self.run_name_prefix, change.number, patch_set.number
            ),
            title: format!(
                "{} #{} ({}) - {}",
                change.number, patch_set.number, change.branch, change.subject
            ),
            url: change.url.clone(),
        })
    }

    /// Start a run for `event` if it is eligible, and arrange for its outcome
    /// to be reported. Returns the reporting task.
    pub fn handle(&self, event: PatchsetCreated) -> Option<JoinHandle<()>> {
        let request = self.request_for(&event)?;
        let target = PatchSetRef {
            change: event.change.number,
            patchset: event.patch_set.number,
        };

        let ticket = match self.launcher.launch(request) {
            Ok(ticket) => ticket,
            Err(LaunchError::DuplicateRun(run_id)) => {
                warn!(run = %run_id, "patch set already tested, ignoring repeated event");
                return None;
            }
            Err(e) => {
                error!(change = target.change, patchset = target.patchset, error = %e, "could not launch run");
                return None;
            }
        };

        let reporter = self.reporter.clone();
        Some(tokio::spawn(async move {
            if let Some(outcome) = ticket.completion().await {
                reporter.report(target, &outcome).await;
            }
        }))
    }
}
