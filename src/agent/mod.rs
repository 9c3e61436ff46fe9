//! Agent collaborator adapter
//!
//! The agent is an external process that edits a workspace and emits a
//! sequence of progress events, ending in a terminal event that may carry
//! usage counters. The engine treats it as an opaque event source: events
//! are drained fully into a transcript, the terminal event is detected,
//! and usage is extracted if present. Nothing else is interpreted.

mod error;
mod mock;
mod process;
mod types;

use async_trait::async_trait;

pub use error::AgentError;
pub use mock::MockAgent;
pub use process::ProcessAgent;
pub use types::{AgentInvocation, AgentOutcome, extract_usage, is_terminal, parse_event};

/// An agent collaborator invocable once per trial
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run the agent in a workspace and fully drain its event sequence
    ///
    /// Draining is a suspension point: it must not block sibling trials.
    /// A timeout elapsing mid-drain fails only this invocation.
    async fn invoke(&self, invocation: AgentInvocation) -> Result<AgentOutcome, AgentError>;
}
