//! Event sources feeding the dispatcher.

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::event::{PatchsetCreated, StreamEvent};
use crate::config::GerritConfig;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to start event stream: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("event stream process has no stdout")]
    NoStdout,
}

/// A subscription-based feed of newly created patch sets.
///
/// Each call opens a fresh subscription. The receiver closing is the
/// "stream ended" signal.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(&self) -> Result<mpsc::Receiver<PatchsetCreated>, FeedError>;
}

/// `gerrit stream-events` over SSH, one JSON object per line.
pub struct SshEventSource {
    config: GerritConfig,
}

impl SshEventSource {
    pub fn new(config: GerritConfig) -> Self {
        Self { config }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = self.config.ssh_args();
        args.extend(["gerrit", "stream-events"].map(String::from));
        args
    }
}

#[async_trait]
impl EventSource for SshEventSource {
    async fn subscribe(&self) -> Result<mpsc::Receiver<PatchsetCreated>, FeedError> {
        let mut child = Command::new(&self.config.ssh_command)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child.stdout.take().ok_or(FeedError::NoStdout)?;
        info!(host = %self.config.host, "subscribed to gerrit event stream");

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(event) = parse_line(&line) {
                            if tx.send(event).await.is_err() {
                                debug!("dispatcher dropped the subscription");
                                break;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "error reading event stream");
                        break;
                    }
                }
            }
            // Dropping `child` kills it if it is still running.
            match child.try_wait() {
                Ok(Some(status)) => info!(%status, "event stream process exited"),
                _ => debug!("closing event stream process"),
            }
        });

        Ok(rx)
    }
}

/// Decode one stream-events line. Non-patch-set events and garbage yield
/// `None`.
pub fn parse_line(line: &str) -> Option<PatchsetCreated> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamEvent>(line) {
        Ok(StreamEvent::PatchsetCreated(event)) => Some(event),
        Ok(StreamEvent::Other) => None,
        Err(e) => {
            warn!(error = %e, "ignoring undecodable stream event");
            None
        }
    }
}
