//! Sandboxes turn a run request into the command that executes it.

use tokio::process::Command;

use super::RunRequest;
use crate::config::SandboxConfig;

/// Builds the isolated process for one run.
///
/// The launcher owns spawning, output wiring and exit observation; a sandbox
/// only decides what gets executed.
pub trait Sandbox: Send + Sync {
    fn command(&self, request: &RunRequest) -> Command;
}

/// Runs the test image in a named docker container.
pub struct DockerSandbox {
    config: SandboxConfig,
}

impl DockerSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to the docker client.
    pub fn args(&self, request: &RunRequest) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        if self.config.remove_container {
            args.push("--rm".to_string());
        }
        args.push("--name".to_string());
        args.push(request.run_name.clone());
        args.push("-e".to_string());
        args.push(format!(
            "{}={}",
            self.config.revision_env, request.revision_under_test
        ));
        args.push("-e".to_string());
        args.push(format!(
            "{}={}",
            self.config.baseline_env, request.baseline_revision
        ));
        args.push(self.config.image.clone());
        args
    }
}

impl Sandbox for DockerSandbox {
    fn command(&self, request: &RunRequest) -> Command {
        let mut cmd = Command::new(&self.config.docker_command);
        cmd.args(self.args(request));
        cmd
    }
}
