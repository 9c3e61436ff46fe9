//! Execution scheduler
//!
//! Runs trial specs to completion under one of three strategies. This is
//! the only component aware of the concurrency strategy; trial executors
//! are strategy-agnostic. Every spec produces exactly one result, one
//! trial's failure never blocks siblings, and the returned list is always
//! re-sorted into canonical generation order.

use std::sync::Arc;

use eyre::Result;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::{ConfigError, ExecutionConfig};
use crate::domain::{TrialResult, TrialSpec};
use crate::engine::TrialExecutor;

/// Concurrency strategy for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One trial at a time, in generation order
    Sequential,
    /// All trials started at once, no admission limit
    Parallel,
    /// At most this many trial lifecycles in flight
    ParallelLimit(usize),
}

impl ExecutionMode {
    /// Resolve the mode from configuration
    ///
    /// A `parallel-limit` mode without a positive concurrency value is a
    /// fatal configuration error, raised here before any trial starts.
    pub fn from_config(config: &ExecutionConfig) -> Result<Self, ConfigError> {
        debug!(mode = %config.mode, concurrency = ?config.concurrency, "ExecutionMode::from_config: called");
        match config.mode.as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "parallel" => Ok(ExecutionMode::Parallel),
            "parallel-limit" => match config.concurrency {
                Some(limit) if limit >= 1 => Ok(ExecutionMode::ParallelLimit(limit)),
                _ => Err(ConfigError::MissingConcurrencyLimit),
            },
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Run all trial specs under the given strategy
///
/// Returns exactly one result per spec, sorted by trial id regardless of
/// completion order.
pub async fn run_trials(
    specs: Vec<TrialSpec>,
    mode: ExecutionMode,
    executor: Arc<dyn TrialExecutor>,
) -> Result<Vec<TrialResult>> {
    info!(count = specs.len(), ?mode, "Scheduler starting");

    let mut results = match mode {
        ExecutionMode::Sequential => run_sequential(specs, executor).await,
        ExecutionMode::Parallel => run_parallel(specs, executor).await,
        ExecutionMode::ParallelLimit(limit) => run_bounded(specs, executor, limit).await?,
    };

    // Restore canonical generation order
    results.sort_by_key(|r| r.trial_id);

    info!(count = results.len(), "Scheduler finished");
    Ok(results)
}

/// Spawn a trial as its own task so a panic stays contained to it
fn spawn_trial(spec: TrialSpec, executor: Arc<dyn TrialExecutor>) -> (usize, String, JoinHandle<TrialResult>) {
    let trial_id = spec.trial_id;
    let prompt_id = spec.prompt_id.clone();
    let handle = tokio::spawn(async move { executor.execute(spec).await });
    (trial_id, prompt_id, handle)
}

/// Reap a trial task, folding a panic into a failed result
async fn reap(trial_id: usize, prompt_id: String, handle: JoinHandle<TrialResult>) -> TrialResult {
    match handle.await {
        Ok(result) => result,
        Err(e) => {
            error!(trial_id, "Trial task panicked: {}", e);
            TrialResult::from_error(trial_id, prompt_id, format!("Trial task panicked: {}", e))
        }
    }
}

/// One trial at a time; the next starts only after the previous lifecycle
/// completed fully
async fn run_sequential(specs: Vec<TrialSpec>, executor: Arc<dyn TrialExecutor>) -> Vec<TrialResult> {
    debug!(count = specs.len(), "run_sequential: called");
    let mut results = Vec::with_capacity(specs.len());

    for spec in specs {
        let (trial_id, prompt_id, handle) = spawn_trial(spec, executor.clone());
        results.push(reap(trial_id, prompt_id, handle).await);
    }

    results
}

/// All trials start immediately; overlap comes from each lifecycle's own
/// suspension points
async fn run_parallel(specs: Vec<TrialSpec>, executor: Arc<dyn TrialExecutor>) -> Vec<TrialResult> {
    debug!(count = specs.len(), "run_parallel: called");

    let handles: Vec<_> = specs
        .into_iter()
        .map(|spec| spawn_trial(spec, executor.clone()))
        .collect();

    futures::future::join_all(
        handles
            .into_iter()
            .map(|(trial_id, prompt_id, handle)| reap(trial_id, prompt_id, handle)),
    )
    .await
}

/// At most `limit` lifecycles in flight; queued specs are admitted in
/// generation order as slots free up
async fn run_bounded(
    specs: Vec<TrialSpec>,
    executor: Arc<dyn TrialExecutor>,
    limit: usize,
) -> Result<Vec<TrialResult>> {
    debug!(count = specs.len(), limit, "run_bounded: called");
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut handles = Vec::with_capacity(specs.len());

    for spec in specs {
        // Admission gate: hold a permit for the whole lifecycle. Acquiring
        // here (not inside the task) admits specs in generation order.
        let permit = semaphore.clone().acquire_owned().await?;
        let trial_id = spec.trial_id;
        let prompt_id = spec.prompt_id.clone();
        let executor = executor.clone();
        let handle = tokio::spawn(async move {
            let result = executor.execute(spec).await;
            drop(permit);
            result
        });
        handles.push((trial_id, prompt_id, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (trial_id, prompt_id, handle) in handles {
        results.push(reap(trial_id, prompt_id, handle).await);
    }
    Ok(results)
}
