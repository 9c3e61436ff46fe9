//! Scorer collaborator adapters
//!
//! A scorer measures one trial and returns a score in [0.0, 1.0]. Scorers
//! are invoked through `run_scorer`, which contains any failure to that
//! one scorer's result: a throwing scorer or failing command becomes a
//! zero score with the error as its reason, never aborting the trial or
//! sibling scorers.

mod command;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::ScoreResult;

pub use command::{CommandOutput, CommandRunner};

/// Everything a scorer may inspect for one trial
#[derive(Debug, Clone)]
pub struct ScorerContext<'a> {
    /// Workspace path the trial ran in
    pub workspace: &'a Path,

    /// Diff of the workspace against its baseline
    pub change_set: &'a str,

    /// Raw drained agent transcript
    pub transcript: &'a str,

    /// Prompt variant identifier
    pub prompt_id: &'a str,

    /// Environment values the trial ran with
    pub env: &'a BTreeMap<String, String>,

    /// Bounded-timeout subprocess utility
    pub runner: &'a CommandRunner,
}

/// A named scorer, safely invocable concurrently across trials
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Scorer name, used as the key in trial scores and aggregates
    fn name(&self) -> &str;

    /// Measure one trial
    async fn evaluate(&self, context: &ScorerContext<'_>) -> eyre::Result<ScoreResult>;
}

/// Invoke a scorer, converting any failure into a zero score
pub async fn run_scorer(scorer: &dyn Scorer, context: &ScorerContext<'_>) -> ScoreResult {
    debug!(scorer = scorer.name(), prompt_id = context.prompt_id, "run_scorer: called");

    match scorer.evaluate(context).await {
        Ok(mut score) => {
            // Scores are bounded to [0.0, 1.0]
            score.score = score.score.clamp(0.0, 1.0);
            score
        }
        Err(e) => {
            warn!(scorer = scorer.name(), "Scorer failed: {}", e);
            ScoreResult::fail(format!("Scorer '{}' failed: {}", scorer.name(), e))
        }
    }
}

/// Deterministic scorer backed by a shell command
///
/// Exit code 0 scores 1.0; anything else scores 0.0 with the command's
/// stderr as the reason.
#[derive(Debug, Clone)]
pub struct CommandScorer {
    name: String,
    command: String,
}

impl CommandScorer {
    /// Create a command scorer
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

#[async_trait]
impl Scorer for CommandScorer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, context: &ScorerContext<'_>) -> eyre::Result<ScoreResult> {
        let output = context.runner.run(&self.command, context.workspace, context.env).await?;

        let metadata = serde_json::json!({
            "exit_code": output.exit_code,
            "duration_ms": output.duration_ms,
        });

        if output.passed() {
            Ok(ScoreResult::pass(format!("'{}' exited 0", self.command)).with_metadata(metadata))
        } else {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout
            } else {
                output.stderr
            };
            Ok(ScoreResult::fail(format!(
                "'{}' exited {}: {}",
                self.command,
                output.exit_code,
                detail.trim()
            ))
            .with_metadata(metadata))
        }
    }
}

/// Scorer backed by a caller-supplied function
///
/// Lets library users and tests plug in logic without defining new types.
pub struct FnScorer {
    name: String,
    #[allow(clippy::type_complexity)]
    f: Box<dyn for<'a> Fn(&ScorerContext<'a>) -> eyre::Result<ScoreResult> + Send + Sync>,
}

impl FnScorer {
    /// Wrap a function as a scorer
    pub fn new(
        name: impl Into<String>,
        f: impl for<'a> Fn(&ScorerContext<'a>) -> eyre::Result<ScoreResult> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

#[async_trait]
impl Scorer for FnScorer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, context: &ScorerContext<'_>) -> eyre::Result<ScoreResult> {
        (self.f)(context)
    }
}
