use std::path::PathBuf;
use std::sync::Arc;

use crate::ledger::Ledger;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub logs_dir: Arc<PathBuf>,
    /// Project named in the page header.
    pub project: Arc<str>,
}

impl AppState {
    pub fn new(ledger: Ledger, logs_dir: impl Into<PathBuf>, project: &str) -> Self {
        Self {
            ledger,
            logs_dir: Arc::new(logs_dir.into()),
            project: Arc::from(project),
        }
    }
}
