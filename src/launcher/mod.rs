//! Execution launcher -- start one sandboxed test run and supervise it.
//!
//! A run is recorded in the ledger before its process exists, so a run that
//! never starts is still visible (as `failed`). The combined stdout/stderr of
//! the process goes straight into `<logs_dir>/<run id>.log`, which can be
//! read while the run is in flight. Each run gets a dedicated monitor task
//! that observes the exit code once and finalizes the record once.

pub mod sandbox;

pub use sandbox::{DockerSandbox, Sandbox};

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::ledger::{log_file_name, Ledger, LedgerError, RunRecord, RunStatus};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("run {0} already exists; not starting it again")]
    DuplicateRun(String),

    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<LedgerError> for LaunchError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::DuplicateRun(run_id) => LaunchError::DuplicateRun(run_id),
            other => LaunchError::Ledger(other),
        }
    }
}

/// A run the dispatcher or scheduler wants executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub revision_under_test: String,
    pub baseline_revision: String,
    /// Unique run (and container) name; becomes the run id.
    pub run_name: String,
    pub title: String,
    pub url: Option<String>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    /// `None` when no process could be started.
    pub exit_code: Option<i32>,
    pub log_path: PathBuf,
}

/// Handle to a launched run.
#[derive(Debug)]
pub struct RunTicket {
    pub run_id: String,
    pub log_path: PathBuf,
    completion: oneshot::Receiver<RunOutcome>,
}

impl RunTicket {
    /// Wait for the run to finish.
    ///
    /// Resolves to `None` only if the run could not be finalized in the
    /// ledger.
    pub async fn completion(self) -> Option<RunOutcome> {
        self.completion.await.ok()
    }
}

#[derive(Clone)]
pub struct Launcher {
    ledger: Ledger,
    sandbox: Arc<dyn Sandbox>,
    logs_dir: PathBuf,
}

impl Launcher {
    pub fn new(ledger: Ledger, sandbox: Arc<dyn Sandbox>, logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            ledger,
            sandbox,
            logs_dir: logs_dir.into(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Record and start a run. Returns immediately; the run finishes in the
    /// background and reports through the returned ticket.
    ///
    /// Only a ledger rejection (for example a duplicate run name) is an
    /// error. A run whose process cannot be started is recorded as failed.
    pub fn launch(&self, request: RunRequest) -> Result<RunTicket, LaunchError> {
        let run_id = request.run_name.clone();
        self.ledger.append(RunRecord::running(
            run_id.clone(),
            request.revision_under_test.clone(),
            request.baseline_revision.clone(),
            request.title.clone(),
            request.url.clone(),
        ))?;

        let log_path = self.logs_dir.join(log_file_name(&run_id));
        let (tx, rx) = oneshot::channel();

        match self.spawn(&request, &log_path) {
            Ok(child) => {
                info!(run = %run_id, pid = ?child.id(), title = %request.title, "run started");
                tokio::spawn(supervise(
                    child,
                    run_id.clone(),
                    log_path.clone(),
                    self.ledger.clone(),
                    tx,
                ));
            }
            Err(e) => {
                error!(run = %run_id, error = %e, "failed to start run");
                append_to_log(&log_path, &format!("gerrit-watcher: failed to start run: {}\n", e));
                finish(&self.ledger, &run_id, RunStatus::Failed, None, &log_path, tx);
            }
        }

        Ok(RunTicket {
            run_id,
            log_path,
            completion: rx,
        })
    }

    fn spawn(&self, request: &RunRequest, log_path: &Path) -> std::io::Result<Child> {
        std::fs::create_dir_all(&self.logs_dir)?;
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        let log_file_err = log_file.try_clone()?;

        let mut cmd = self.sandbox.command(request);
        info!(run = %request.run_name, command = ?cmd.as_std(), "launching sandbox");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_file_err));
        cmd.spawn()
    }
}

/// Wait for the process to exit and finalize its record.
async fn supervise(
    mut child: Child,
    run_id: String,
    log_path: PathBuf,
    ledger: Ledger,
    tx: oneshot::Sender<RunOutcome>,
) {
    let exit_code = match child.wait().await {
        // Killed by a signal: no exit code, counted as a failure.
        Ok(status) => status.code().unwrap_or(-1),
        Err(e) => {
            error!(run = %run_id, error = %e, "failed to wait on run process");
            -1
        }
    };
    let status = RunStatus::from_exit_code(exit_code);
    info!(run = %run_id, exit_code, %status, "run finished");
    finish(&ledger, &run_id, status, Some(exit_code), &log_path, tx);
}

fn finish(
    ledger: &Ledger,
    run_id: &str,
    status: RunStatus,
    exit_code: Option<i32>,
    log_path: &Path,
    tx: oneshot::Sender<RunOutcome>,
) {
    if let Err(e) = ledger.update_status(run_id, status, exit_code) {
        warn!(run = %run_id, error = %e, "run outcome not recorded");
        return;
    }
    // Nobody may be waiting (health checks); that is fine.
    let _ = tx.send(RunOutcome {
        run_id: run_id.to_string(),
        status,
        exit_code,
        log_path: log_path.to_path_buf(),
    });
}

fn append_to_log(log_path: &Path, line: &str) {
    let result = log_path
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|_| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
        })
        .and_then(|mut f| f.write_all(line.as_bytes()));
    if let Err(e) = result {
        warn!(log = %log_path.display(), error = %e, "could not write to run log");
    }
}
