//! Outcome reporter -- tell the review system how a patch set's run went.
//!
//! Reporting is isolated from the run lifecycle: by the time a report is
//! composed the ledger already holds the final status, and nothing here can
//! change it. A failure to read the log only drops the excerpt; a failure to
//! post is logged and not retried.

pub mod ssh;

pub use ssh::SshReviewClient;

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::ReportConfig;
use crate::ledger::RunStatus;
use crate::launcher::RunOutcome;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("failed to run review command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("review command exited with {code}: {stderr}")]
    Rejected { code: i32, stderr: String },
}

/// Posts comments on patch sets.
#[async_trait]
pub trait ReviewClient: Send + Sync {
    /// `commit` is `"<change>,<patchset>"`.
    async fn post_comment(
        &self,
        commit: &str,
        message: &str,
        score: Option<i32>,
    ) -> Result<(), ReviewError>;
}

/// Logs comments instead of posting them.
pub struct LogOnlyReviewClient;

#[async_trait]
impl ReviewClient for LogOnlyReviewClient {
    async fn post_comment(
        &self,
        commit: &str,
        message: &str,
        score: Option<i32>,
    ) -> Result<(), ReviewError> {
        info!(%commit, ?score, %message, "review comments disabled; not posting");
        Ok(())
    }
}

/// The patch set a run was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSetRef {
    pub change: u64,
    pub patchset: u64,
}

impl PatchSetRef {
    /// Commit identifier understood by `gerrit review`.
    pub fn commit(&self) -> String {
        format!("{},{}", self.change, self.patchset)
    }
}

#[derive(Clone)]
pub struct OutcomeReporter {
    client: Arc<dyn ReviewClient>,
    config: ReportConfig,
}

impl OutcomeReporter {
    pub fn new(client: Arc<dyn ReviewClient>, config: ReportConfig) -> Self {
        Self { client, config }
    }

    /// Compose and post the comment for a finished run. Never fails.
    pub async fn report(&self, target: PatchSetRef, outcome: &RunOutcome) {
        let commit = target.commit();
        let (message, score) = self.compose(outcome).await;

        match self.client.post_comment(&commit, &message, score).await {
            Ok(()) => info!(run = %outcome.run_id, %commit, status = %outcome.status, "posted run outcome"),
            Err(e) => error!(run = %outcome.run_id, %commit, error = %e, "failed to post run outcome"),
        }
    }

    /// Message body and score for `outcome`.
    pub async fn compose(&self, outcome: &RunOutcome) -> (String, Option<i32>) {
        let passed = outcome.status == RunStatus::Passed;
        let mut message = match (passed, outcome.exit_code) {
            (true, _) => format!("gerrit-watcher: {} PASSED", outcome.run_id),
            (false, Some(code)) => {
                format!("gerrit-watcher: {} FAILED (exit code {})", outcome.run_id, code)
            }
            (false, None) => format!("gerrit-watcher: {} FAILED (could not start)", outcome.run_id),
        };

        if let Some(base) = &self.config.public_url {
            let file = outcome
                .log_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            message.push_str(&format!("\nFull log: {}/logs/{}", base.trim_end_matches('/'), file));
        }

        if passed {
            return (message, None);
        }

        match read_tail(&outcome.log_path, self.config.tail_lines).await {
            Ok(lines) if !lines.is_empty() => {
                message.push_str(&format!("\n\nLast {} lines of output:\n\n", lines.len()));
                message.push_str(&quote(&lines));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    run = %outcome.run_id,
                    log = %outcome.log_path.display(),
                    error = %e,
                    "could not read run log; reporting without excerpt"
                );
            }
        }

        (message, Some(self.config.failure_score))
    }
}

/// Bytes read per backwards step when looking for the tail of a log.
const TAIL_CHUNK: u64 = 8 * 1024;

/// The last `n` lines of the file at `path`.
///
/// Reads backwards from the end in chunks until `n` full lines are in hand,
/// so only the tail of a large build log is ever loaded.
pub async fn read_tail(path: &Path, n: usize) -> std::io::Result<Vec<String>> {
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut file = tokio::fs::File::open(path).await?;
    let mut start = file.metadata().await?.len();
    let mut buf: Vec<u8> = Vec::new();

    // n + 1 newlines guarantee the last n lines are complete.
    while start > 0 && buf.iter().filter(|&&b| b == b'\n').count() <= n {
        let step = TAIL_CHUNK.min(start);
        start -= step;
        file.seek(SeekFrom::Start(start)).await?;
        let mut chunk = vec![0u8; step as usize];
        file.read_exact(&mut chunk).await?;
        chunk.extend_from_slice(&buf);
        buf = chunk;
    }

    let text = String::from_utf8_lossy(&buf);
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(n);
    Ok(lines[skip..].iter().map(|l| l.to_string()).collect())
}

// Gerrit renders lines starting with whitespace as preformatted text.
fn quote(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| format!("    {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}
