//! Result aggregation
//!
//! Consumes the completed trial set, restores canonical ordering, and
//! computes per-scorer and overall statistics. Pure and deterministic:
//! the same trial set always yields the same report, regardless of the
//! order results were collected in.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use crate::domain::{AggregateScore, EvalReport, OVERALL_KEY, ResourceUsage, TrialResult};

/// Assemble the final report from a run's trial results
pub fn aggregate(name: &str, mut trials: Vec<TrialResult>, total_duration: Duration) -> EvalReport {
    debug!(%name, count = trials.len(), "aggregate: called");

    // Canonical order, independent of collection order
    trials.sort_by_key(|t| t.trial_id);

    let total = trials.len();
    let succeeded = trials.iter().filter(|t| t.success).count();
    let overall_success = trials.iter().all(|t| t.success);

    // Gather raw scores per scorer name, in trial order
    let mut raw_scores: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for trial in &trials {
        for (scorer, score) in &trial.scores {
            raw_scores.entry(scorer.clone()).or_default().push(score.score);
        }
    }

    let mut aggregates: BTreeMap<String, AggregateScore> = raw_scores
        .into_iter()
        .map(|(scorer, scores)| {
            let agg = aggregate_scores(&scores);
            debug!(%scorer, mean = agg.mean, pass_rate = agg.pass_rate, "aggregate: scorer aggregated");
            (scorer, agg)
        })
        .collect();

    // The synthetic overall entry reflects trial-level success, not any
    // individual scorer
    let success_rate = if total == 0 { 1.0 } else { succeeded as f64 / total as f64 };
    aggregates.insert(OVERALL_KEY.to_string(), AggregateScore::uniform(success_rate));

    let total_resource_usage = sum_usage(&trials);

    EvalReport {
        name: name.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        overall_success,
        total_duration_ms: total_duration.as_millis() as u64,
        trials,
        aggregates,
        total_resource_usage,
        error: None,
    }
}

/// Statistics over one scorer's raw scores
fn aggregate_scores(scores: &[f64]) -> AggregateScore {
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    let passing = scores.iter().filter(|s| **s >= 1.0).count() as f64;

    AggregateScore {
        mean,
        min,
        max,
        std_dev: variance.sqrt(),
        pass_rate: passing / n,
    }
}

/// Sum usage over trials that reported it
///
/// Absence and zero are equivalent: trials without usage data contribute
/// nothing. Returns None when no trial reported usage at all.
fn sum_usage(trials: &[TrialResult]) -> Option<ResourceUsage> {
    let mut total: Option<ResourceUsage> = None;
    for usage in trials.iter().filter_map(|t| t.resource_usage.as_ref()) {
        total.get_or_insert_with(ResourceUsage::default).add(usage);
    }
    total
}
