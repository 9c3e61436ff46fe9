//! Process-backed agent adapter

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::error::AgentError;
use super::types::{AgentInvocation, AgentOutcome, extract_usage, is_terminal, parse_event};
use super::AgentRunner;

/// Agent adapter that spawns an external command per trial
///
/// The command runs in the workspace with the trial's environment values
/// set on the child process, receives the prompt on stdin, and emits
/// newline-delimited JSON events on stdout.
pub struct ProcessAgent {
    command: String,
    args: Vec<String>,
}

impl ProcessAgent {
    /// Create a new process agent
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        let command = command.into();
        debug!(%command, ?args, "ProcessAgent::new: called");
        Self { command, args }
    }
}

#[async_trait]
impl AgentRunner for ProcessAgent {
    async fn invoke(&self, invocation: AgentInvocation) -> Result<AgentOutcome, AgentError> {
        debug!(
            working_dir = ?invocation.working_dir,
            timeout_ms = invocation.timeout.as_millis() as u64,
            "ProcessAgent::invoke: called"
        );

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .current_dir(&invocation.working_dir)
            .envs(invocation.env.iter())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::SpawnFailed(e.to_string()))?;
        debug!("ProcessAgent::invoke: child spawned");

        // Feed the prompt from a separate task so a child that emits before
        // reading cannot deadlock the drain on a full pipe.
        if let Some(mut stdin) = child.stdin.take() {
            let prompt = invocation.prompt_text.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    warn!("Failed to write prompt to agent stdin: {}", e);
                }
                let _ = stdin.shutdown().await;
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Io("agent stdout not captured".to_string()))?;

        let drained = tokio::time::timeout(invocation.timeout, drain(&mut child, stdout)).await;
        match drained {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!("ProcessAgent::invoke: timeout elapsed, killing child");
                let _ = child.kill().await;
                Err(AgentError::Timeout {
                    timeout_ms: invocation.timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// Drain the full event sequence, then reap the child
///
/// Every line lands in the transcript; the terminal event's usage counters
/// are extracted when present. The sequence is never truncated early.
async fn drain(child: &mut Child, stdout: ChildStdout) -> Result<AgentOutcome, AgentError> {
    let mut transcript = String::new();
    let mut usage = None;
    let mut lines = BufReader::new(stdout).lines();

    while let Some(line) = lines.next_line().await.map_err(|e| AgentError::Io(e.to_string()))? {
        if !transcript.is_empty() {
            transcript.push('\n');
        }
        transcript.push_str(&line);

        if let Some(event) = parse_event(&line)
            && is_terminal(&event)
        {
            debug!("ProcessAgent::drain: terminal event observed");
            if let Some(u) = extract_usage(&event) {
                usage = Some(u);
            }
        }
    }

    let status = child.wait().await.map_err(|e| AgentError::Io(e.to_string()))?;
    if !status.success() {
        debug!("ProcessAgent::drain: child exited with failure");
        return Err(AgentError::Exited {
            code: status.code().unwrap_or(-1),
        });
    }

    info!(
        transcript_bytes = transcript.len(),
        has_usage = usage.is_some(),
        "Agent drained"
    );
    Ok(AgentOutcome { transcript, usage })
}
