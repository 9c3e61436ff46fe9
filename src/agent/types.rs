//! Agent invocation and event types

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::domain::ResourceUsage;

/// Everything needed for one agent invocation
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    /// Workspace the agent operates in
    pub working_dir: PathBuf,

    /// Prompt text for this trial
    pub prompt_text: String,

    /// Timeout applied to the full event drain
    pub timeout: Duration,

    /// Environment values passed on the child process only
    ///
    /// Never written to the parent's environment table: concurrent trials
    /// would race on it.
    pub env: BTreeMap<String, String>,
}

/// Result of a fully drained agent invocation
#[derive(Debug, Clone, Default)]
pub struct AgentOutcome {
    /// Raw drained event lines, newline-joined
    pub transcript: String,

    /// Usage counters from the terminal event, if reported
    pub usage: Option<ResourceUsage>,
}

/// Parse one transcript line as a JSON event
///
/// Non-JSON lines are not an error; they stay in the transcript and are
/// simply not inspected.
pub fn parse_event(line: &str) -> Option<Value> {
    serde_json::from_str(line.trim()).ok()
}

/// Whether an event is the terminal event of the sequence
pub fn is_terminal(event: &Value) -> bool {
    event.get("type").and_then(Value::as_str) == Some("result")
}

/// Extract usage counters from a terminal event, if present
pub fn extract_usage(event: &Value) -> Option<ResourceUsage> {
    let usage = event.get("usage")?;
    match serde_json::from_value(usage.clone()) {
        Ok(usage) => Some(usage),
        Err(e) => {
            debug!("extract_usage: unparseable usage payload: {}", e);
            None
        }
    }
}
