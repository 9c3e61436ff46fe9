//! Agent adapter error types

/// Error types for agent invocations
///
/// Trial-scoped: the trial executor records these on the failed trial's
/// result, never aborting sibling trials.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Failed to spawn agent: {0}")]
    SpawnFailed(String),

    #[error("Agent I/O error: {0}")]
    Io(String),

    #[error("Agent timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Agent exited with code {code}")]
    Exited { code: i32 },
}

impl AgentError {
    /// Whether this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentError::Timeout { .. })
    }
}
