//! Scripted agent for engine tests

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::error::AgentError;
use super::types::{AgentInvocation, AgentOutcome, extract_usage, is_terminal};
use super::AgentRunner;

/// Agent that replays a scripted event sequence
///
/// Optionally sleeps before responding (to exercise scheduler overlap) and
/// optionally writes a file into the workspace (to produce a change set).
pub struct MockAgent {
    events: Vec<Value>,
    delay: Duration,
    edit: Option<(String, String)>,
    fail_with: Option<String>,
}

impl MockAgent {
    /// Create a mock that replays the given events
    pub fn new(events: Vec<Value>) -> Self {
        Self {
            events,
            delay: Duration::ZERO,
            edit: None,
            fail_with: None,
        }
    }

    /// Sleep this long before responding, simulating agent latency
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Write this file into the workspace before responding
    pub fn with_edit(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.edit = Some((path.into(), content.into()));
        self
    }

    /// Fail every invocation with the given message
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            delay: Duration::ZERO,
            edit: None,
            fail_with: Some(message.into()),
        }
    }
}

#[async_trait]
impl AgentRunner for MockAgent {
    async fn invoke(&self, invocation: AgentInvocation) -> Result<AgentOutcome, AgentError> {
        debug!(working_dir = ?invocation.working_dir, "MockAgent::invoke: called");

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(message) = &self.fail_with {
            return Err(AgentError::SpawnFailed(message.clone()));
        }

        if let Some((path, content)) = &self.edit {
            tokio::fs::write(invocation.working_dir.join(path), content)
                .await
                .map_err(|e| AgentError::Io(e.to_string()))?;
        }

        let mut transcript = String::new();
        let mut usage = None;
        for event in &self.events {
            if !transcript.is_empty() {
                transcript.push('\n');
            }
            transcript.push_str(&event.to_string());
            if is_terminal(event)
                && let Some(u) = extract_usage(event)
            {
                usage = Some(u);
            }
        }

        Ok(AgentOutcome { transcript, usage })
    }
}
