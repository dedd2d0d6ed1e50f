//! Run records as they are kept in memory and persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a test run.
///
/// `Running` moves to exactly one terminal state. The only transition that
/// does not come from an observed exit is `Running -> Aborted`, applied when
/// the ledger is loaded after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Passed,
    Failed,
    Aborted,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    /// Map a process exit code to the terminal status it implies.
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One test execution, past or in flight.
///
/// Field names on disk follow the ledger format the watcher has always
/// written (`qtWaylandRev`, `qt5Rev`, `containerName`), so existing ledgers
/// keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    #[serde(rename = "containerName")]
    pub run_id: String,
    #[serde(rename = "qtWaylandRev")]
    pub revision_under_test: String,
    #[serde(rename = "qt5Rev")]
    pub baseline_revision: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub status: RunStatus,
    /// Log file name inside the logs directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl RunRecord {
    /// A freshly started run.
    pub fn running(
        run_id: impl Into<String>,
        revision_under_test: impl Into<String>,
        baseline_revision: impl Into<String>,
        title: impl Into<String>,
        url: Option<String>,
    ) -> Self {
        let run_id = run_id.into();
        Self {
            log_path: Some(log_file_name(&run_id)),
            run_id,
            revision_under_test: revision_under_test.into(),
            baseline_revision: baseline_revision.into(),
            title: title.into(),
            url,
            status: RunStatus::Running,
            started_at: Some(Utc::now()),
            finished_at: None,
            exit_code: None,
        }
    }

    /// Log file name, falling back to the naming convention for records
    /// written before the field existed.
    pub fn log_file(&self) -> String {
        self.log_path
            .clone()
            .unwrap_or_else(|| log_file_name(&self.run_id))
    }
}

/// `<run id>.log`
pub fn log_file_name(run_id: &str) -> String {
    format!("{}.log", run_id)
}
