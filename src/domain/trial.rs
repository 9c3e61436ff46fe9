//! Trial domain types
//!
//! A trial is one execution of one prompt variant for one iteration index.
//! `TrialSpec` is produced by the matrix generator, `TrialResult` by the
//! trial executor. Both are plain serializable data so a finished run is a
//! self-contained snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named prompt variant, supplied by the caller at configuration time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptVariant {
    /// Identifier, unique within a run
    pub id: String,

    /// Prompt text handed to the agent
    pub text: String,
}

impl PromptVariant {
    /// Create a new prompt variant
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Per-trial context handed to environment providers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialContext {
    /// Stable trial identifier (arena index assigned at generation time)
    pub trial_id: usize,

    /// Prompt variant identifier
    pub prompt_id: String,

    /// Iteration index within the variant (0-based)
    pub iteration: u32,
}

/// Specification for one trial, created once by the matrix generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialSpec {
    /// Stable trial identifier, contiguous from 0 in generation order
    pub trial_id: usize,

    /// Prompt variant identifier
    pub prompt_id: String,

    /// Prompt text handed to the agent
    pub prompt_text: String,

    /// Context for environment providers
    pub env_context: TrialContext,
}

/// Measurement produced by one scorer for one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Score in [0.0, 1.0]
    pub score: f64,

    /// Human-readable explanation
    pub reason: String,

    /// Optional scorer-specific details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ScoreResult {
    /// A passing score
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            score: 1.0,
            reason: reason.into(),
            metadata: None,
        }
    }

    /// A failing score
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            reason: reason.into(),
            metadata: None,
        }
    }

    /// Builder method to attach metadata
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// A score counts as passing iff it reached the full 1.0
    pub fn passed(&self) -> bool {
        self.score >= 1.0
    }
}

/// Token and cost accounting reported by the agent's terminal event
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceUsage {
    /// Input tokens consumed
    pub input_tokens: u64,

    /// Output tokens produced
    pub output_tokens: u64,

    /// Tokens served from cache
    pub cache_read_tokens: u64,

    /// Cost in USD, if the agent reports one
    pub cost_usd: f64,
}

impl ResourceUsage {
    /// Accumulate another usage record into this one
    pub fn add(&mut self, other: &ResourceUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cost_usd += other.cost_usd;
    }
}

/// Outcome of one trial, produced exactly once per spec
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    /// Stable trial identifier
    pub trial_id: usize,

    /// Prompt variant identifier
    pub prompt_id: String,

    /// True iff every score passed and no error occurred
    pub success: bool,

    /// Wall-clock duration of the full trial lifecycle
    pub duration_ms: u64,

    /// Scorer measurements by scorer name
    pub scores: BTreeMap<String, ScoreResult>,

    /// Diff of the workspace against its baseline
    pub change_set: String,

    /// Raw drained agent transcript
    pub transcript: String,

    /// Usage counters from the agent's terminal event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_usage: Option<ResourceUsage>,

    /// Workspace path, recorded only when the cleanup policy retained it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retained_workspace: Option<String>,

    /// Environment values the trial ran with
    pub environment_values: BTreeMap<String, String>,

    /// Error message for a failed trial lifecycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrialResult {
    /// Create an empty result shell for a spec
    pub fn new(trial_id: usize, prompt_id: impl Into<String>) -> Self {
        Self {
            trial_id,
            prompt_id: prompt_id.into(),
            success: false,
            duration_ms: 0,
            scores: BTreeMap::new(),
            change_set: String::new(),
            transcript: String::new(),
            resource_usage: None,
            retained_workspace: None,
            environment_values: BTreeMap::new(),
            error: None,
        }
    }

    /// Create a failed result from an error message
    pub fn from_error(trial_id: usize, prompt_id: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::new(trial_id, prompt_id);
        result.error = Some(error.into());
        result
    }

    /// Recompute `success` from the current error and scores
    ///
    /// Success requires no lifecycle error and every score at 1.0. A trial
    /// with no scorers configured succeeds vacuously.
    pub fn evaluate_success(&mut self) {
        self.success = self.error.is_none() && self.scores.values().all(ScoreResult::passed);
    }
}
