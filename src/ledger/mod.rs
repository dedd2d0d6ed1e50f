//! Run ledger -- the durable history of every test run.
//!
//! The ledger is an ordered list of [`RunRecord`]s (insertion order is start
//! order) owned by a single [`Ledger`] handle. Every mutation is applied under
//! one lock and then handed, in order, to a background writer task that
//! rewrites the JSON document. Callers never wait for disk I/O; a failed
//! write is logged and the in-memory ledger stays authoritative.

mod record;
pub mod store;

pub use record::{log_file_name, RunRecord, RunStatus};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("run {0} is already in the ledger")]
    DuplicateRun(String),

    #[error("run {0} is not in the ledger")]
    UnknownRun(String),

    #[error("run {run_id} already finished as {status}")]
    AlreadyFinished { run_id: String, status: RunStatus },
}

impl LedgerError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        LedgerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

enum WriterMsg {
    Persist(Vec<RunRecord>),
    Flush(oneshot::Sender<()>),
}

/// Shared handle to the process-wide run ledger.
#[derive(Clone)]
pub struct Ledger {
    records: Arc<Mutex<Vec<RunRecord>>>,
    writer: mpsc::UnboundedSender<WriterMsg>,
    path: Arc<PathBuf>,
}

impl Ledger {
    /// Load the ledger at `path` and start its writer task.
    ///
    /// An existing file is first copied to a timestamped backup. Records
    /// still marked `running` are reclassified `aborted`: nothing supervises
    /// them after a restart. The normalized ledger is written back at once.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();

        if let Some(backup) = store::backup(&path, Utc::now()).await? {
            info!(backup = %backup.display(), "backed up run ledger");
        }

        let mut records = store::read(&path).await?;
        let mut aborted = 0usize;
        for record in records.iter_mut().filter(|r| r.status == RunStatus::Running) {
            record.status = RunStatus::Aborted;
            aborted += 1;
        }
        info!(
            path = %path.display(),
            runs = records.len(),
            aborted,
            "loaded run ledger"
        );

        let ledger = Self::start(path, records);
        ledger.persist_current();
        Ok(ledger)
    }

    fn start(path: PathBuf, records: Vec<RunRecord>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let path = Arc::new(path);
        tokio::spawn(run_writer(path.clone(), rx));
        Self {
            records: Arc::new(Mutex::new(records)),
            writer: tx,
            path,
        }
    }

    /// Add a new record. Its id must not already be in the ledger.
    pub fn append(&self, record: RunRecord) -> Result<(), LedgerError> {
        let mut records = self.lock();
        if records.iter().any(|r| r.run_id == record.run_id) {
            return Err(LedgerError::DuplicateRun(record.run_id));
        }
        debug!(run = %record.run_id, "appending run record");
        records.push(record);
        self.queue_persist(&records);
        Ok(())
    }

    /// Move a running record to its terminal `status`.
    ///
    /// Fails if the run is unknown or already finished, so a run is
    /// finalized at most once.
    pub fn update_status(
        &self,
        run_id: &str,
        status: RunStatus,
        exit_code: Option<i32>,
    ) -> Result<(), LedgerError> {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| LedgerError::UnknownRun(run_id.to_string()))?;

        if record.status.is_terminal() {
            return Err(LedgerError::AlreadyFinished {
                run_id: run_id.to_string(),
                status: record.status,
            });
        }

        record.status = status;
        record.exit_code = exit_code;
        record.finished_at = Some(Utc::now());
        self.queue_persist(&records);
        Ok(())
    }

    pub fn get(&self, run_id: &str) -> Option<RunRecord> {
        self.lock().iter().find(|r| r.run_id == run_id).cloned()
    }

    /// Copy of all records in start order.
    pub fn snapshot(&self) -> Vec<RunRecord> {
        self.lock().clone()
    }

    /// Copy of all records, most recently started first.
    pub fn newest_first(&self) -> Vec<RunRecord> {
        let mut records = self.snapshot();
        records.reverse();
        records
    }

    /// Wait until every mutation made so far has been written (or has failed).
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.writer.send(WriterMsg::Flush(tx)).is_err() {
            warn!("ledger writer is gone, nothing to flush");
            return;
        }
        let _ = rx.await;
    }

    fn persist_current(&self) {
        let records = self.lock();
        self.queue_persist(&records);
    }

    // Called with the lock held so the writer sees snapshots in mutation order.
    fn queue_persist(&self, records: &[RunRecord]) {
        if self.writer.send(WriterMsg::Persist(records.to_vec())).is_err() {
            error!(path = %self.path.display(), "ledger writer is gone, change not persisted");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RunRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Background task writing ledger snapshots in the order they were queued.
/// Snapshots that pile up while a write is in progress collapse into the
/// latest one.
async fn run_writer(path: Arc<PathBuf>, mut rx: mpsc::UnboundedReceiver<WriterMsg>) {
    while let Some(msg) = rx.recv().await {
        let mut latest = None;
        let mut acks = Vec::new();
        match msg {
            WriterMsg::Persist(records) => latest = Some(records),
            WriterMsg::Flush(ack) => acks.push(ack),
        }
        while let Ok(msg) = rx.try_recv() {
            match msg {
                WriterMsg::Persist(records) => latest = Some(records),
                WriterMsg::Flush(ack) => acks.push(ack),
            }
        }

        if let Some(records) = latest {
            match store::write_atomic(&path, &records).await {
                Ok(()) => debug!(path = %path.display(), runs = records.len(), "persisted run ledger"),
                Err(e) => error!(
                    path = %path.display(),
                    error = %e,
                    "failed to persist run ledger; history on disk is stale until the next successful write"
                ),
            }
        }

        for ack in acks {
            let _ = ack.send(());
        }
    }
}
