//! Bounded-timeout command execution for scorers

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

/// Result of running a scorer command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code from the command
    pub exit_code: i32,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// How long the command took
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Check if the command succeeded
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Subprocess-execution utility handed to scorers
///
/// Every invocation is bounded by the configured timeout, runs in the
/// trial's workspace, and receives the trial's environment values on the
/// child process only.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    /// Create a runner with the given per-invocation timeout
    pub fn new(timeout: Duration) -> Self {
        debug!(timeout_ms = timeout.as_millis() as u64, "CommandRunner::new: called");
        Self { timeout }
    }

    /// Run a shell command in the workspace
    pub async fn run(
        &self,
        command: &str,
        cwd: &Path,
        env: &BTreeMap<String, String>,
    ) -> eyre::Result<CommandOutput> {
        debug!(%command, ?cwd, "CommandRunner::run: called");
        let start = std::time::Instant::now();

        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(cwd)
                .envs(env.iter())
                .output(),
        )
        .await
        .map_err(|_| eyre::eyre!("Command timed out after {}ms: {}", self.timeout.as_millis(), command))??;

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(exit_code = output.status.code().unwrap_or(-1), duration_ms, "CommandRunner::run: finished");

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
        })
    }
}
