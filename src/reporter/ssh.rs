//! `gerrit review` over SSH.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{ReviewClient, ReviewError};
use crate::config::GerritConfig;

pub struct SshReviewClient {
    config: GerritConfig,
}

impl SshReviewClient {
    pub fn new(config: GerritConfig) -> Self {
        Self { config }
    }

    /// Arguments for the ssh client. The remote side re-parses its command
    /// line, so the message travels shell-quoted.
    pub fn args(&self, commit: &str, message: &str, score: Option<i32>) -> Vec<String> {
        let mut args = self.config.ssh_args();
        args.extend(["gerrit", "review", "--message"].map(String::from));
        args.push(shell_quote(message));
        if let Some(score) = score {
            args.push("--code-review".to_string());
            args.push(score.to_string());
        }
        args.push(commit.to_string());
        args
    }
}

#[async_trait]
impl ReviewClient for SshReviewClient {
    async fn post_comment(
        &self,
        commit: &str,
        message: &str,
        score: Option<i32>,
    ) -> Result<(), ReviewError> {
        debug!(%commit, ?score, "posting review comment");
        let output = Command::new(&self.config.ssh_command)
            .args(self.args(commit, message, score))
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ReviewError::Rejected {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}
