//! On-disk form of the ledger: one JSON array, rewritten atomically.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{LedgerError, RunRecord};

/// Read the persisted ledger. A missing file is an empty ledger.
pub async fn read(path: &Path) -> Result<Vec<RunRecord>, LedgerError> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LedgerError::io(path, e)),
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|source| LedgerError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// `<dir>/<file name>.<timestamp>.bak`
pub fn backup_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ledger".to_string());
    path.with_file_name(format!("{}.{}.bak", name, at.format("%Y%m%dT%H%M%SZ")))
}

/// Copy the current ledger file aside. Returns `None` when there is nothing
/// to back up.
///
/// An existing backup is never overwritten: a second backup within the same
/// second gets a `-1`, `-2`, ... suffix before `.bak`.
pub async fn backup(path: &Path, at: DateTime<Utc>) -> Result<Option<PathBuf>, LedgerError> {
    if !fs::try_exists(path).await.map_err(|e| LedgerError::io(path, e))? {
        return Ok(None);
    }
    let base = backup_path(path, at);
    let mut target = base.clone();
    let mut n = 0u32;
    while fs::try_exists(&target)
        .await
        .map_err(|e| LedgerError::io(&target, e))?
    {
        n += 1;
        let stem = base.to_string_lossy();
        let stem = stem.strip_suffix(".bak").unwrap_or(&stem);
        target = PathBuf::from(format!("{}-{}.bak", stem, n));
    }
    fs::copy(path, &target)
        .await
        .map_err(|e| LedgerError::io(&target, e))?;
    Ok(Some(target))
}

/// Replace the ledger file with `records` via temp file, fsync and rename.
pub async fn write_atomic(path: &Path, records: &[RunRecord]) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| LedgerError::io(parent, e))?;
    }

    let json = serde_json::to_vec_pretty(records)?;
    let temp_path = temp_path(path);

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| LedgerError::io(&temp_path, e))?;
    file.write_all(&json)
        .await
        .map_err(|e| LedgerError::io(&temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| LedgerError::io(&temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| LedgerError::io(path, e))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ledger".to_string());
    path.with_file_name(format!("{}.tmp", name))
}
