//! Evaluation report types
//!
//! `EvalReport` is the run's only durable artifact: a fully serializable
//! snapshot with the canonical-order trial list and per-scorer aggregates.
//! It holds no live handles to workspaces.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::trial::{ResourceUsage, TrialResult};

/// Key of the synthetic aggregate computed from trial-level success
pub const OVERALL_KEY: &str = "_overall";

/// Aggregate statistics for one scorer across a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateScore {
    /// Mean of the raw scores
    pub mean: f64,

    /// Minimum raw score
    pub min: f64,

    /// Maximum raw score
    pub max: f64,

    /// Population standard deviation of the raw scores
    pub std_dev: f64,

    /// Fraction of reporting trials with a passing (1.0) score
    pub pass_rate: f64,
}

impl AggregateScore {
    /// An aggregate whose components are all the same value
    ///
    /// Used for the `_overall` entry, which reflects trial-level success
    /// rather than any individual scorer.
    pub fn uniform(value: f64) -> Self {
        Self {
            mean: value,
            min: value,
            max: value,
            std_dev: value,
            pass_rate: value,
        }
    }
}

/// Final report for one evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    /// Run name from the configuration
    pub name: String,

    /// RFC 3339 timestamp of report assembly
    pub timestamp: String,

    /// True iff every trial succeeded
    pub overall_success: bool,

    /// Wall-clock duration of the whole run
    pub total_duration_ms: u64,

    /// All trial results, sorted by trial id (canonical generation order)
    pub trials: Vec<TrialResult>,

    /// Per-scorer aggregates plus the synthetic `_overall` entry
    pub aggregates: BTreeMap<String, AggregateScore>,

    /// Summed usage over trials that reported it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_resource_usage: Option<ResourceUsage>,

    /// Run-level error, unset for runs that produced a full trial set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvalReport {
    /// Number of trials that succeeded
    pub fn succeeded(&self) -> usize {
        self.trials.iter().filter(|t| t.success).count()
    }

    /// Number of trials that failed
    pub fn failed(&self) -> usize {
        self.trials.len() - self.succeeded()
    }
}
