//! Integration tests for EvalMatrix
//!
//! These verify the run-level guarantees: trial identity, concurrency
//! bounds, failure containment, and aggregate statistics.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::tempdir;

use evalmatrix::agent::{AgentError, AgentInvocation, AgentOutcome, AgentRunner, MockAgent};
use evalmatrix::config::EvalConfig;
use evalmatrix::domain::{PromptVariant, ScoreResult, TrialResult};
use evalmatrix::env::{EnvProvider, FnEnv};
use evalmatrix::runner::EvalRunner;
use evalmatrix::scorer::{CommandScorer, FnScorer};

fn setup_source(dir: &Path) {
    std::fs::write(dir.join("main.rs"), "fn main() {}\n").unwrap();
}

fn config(source: &Path, base: &Path, variants: usize, iterations: u32, mode: &str) -> EvalConfig {
    let mut config = EvalConfig {
        name: "integration".to_string(),
        prompts: (0..variants)
            .map(|i| PromptVariant::new(format!("variant-{}", i), format!("prompt {}", i)))
            .collect(),
        iterations,
        ..Default::default()
    };
    config.execution.mode = mode.to_string();
    config.workspace.source_dir = source.to_path_buf();
    config.workspace.base_dir = base.to_path_buf();
    config
}

/// Provider that exposes the trial id to agents and scorers
fn trial_id_env() -> Arc<dyn EnvProvider> {
    Arc::new(FnEnv::new(|ctx: &evalmatrix::domain::TrialContext| {
        Ok(BTreeMap::from([("TRIAL_ID".to_string(), ctx.trial_id.to_string())]))
    }))
}

// =============================================================================
// Trial identity
// =============================================================================

fn assert_exact_id_range(trials: &[TrialResult], expected: usize) {
    assert_eq!(trials.len(), expected);
    let ids: Vec<usize> = trials.iter().map(|t| t.trial_id).collect();
    assert_eq!(ids, (0..expected).collect::<Vec<_>>(), "ids must be the exact contiguous range");
}

#[tokio::test]
async fn test_trial_ids_exact_range_sequential() {
    let source = tempdir().unwrap();
    let base = tempdir().unwrap();
    setup_source(source.path());

    let report = EvalRunner::from_config(config(source.path(), base.path(), 2, 3, "sequential"))
        .with_agent(Arc::new(MockAgent::new(vec![json!({"type": "result"})])))
        .run()
        .await
        .unwrap();

    assert_exact_id_range(&report.trials, 6);
}

#[tokio::test]
async fn test_trial_ids_exact_range_parallel() {
    let source = tempdir().unwrap();
    let base = tempdir().unwrap();
    setup_source(source.path());

    let report = EvalRunner::from_config(config(source.path(), base.path(), 3, 2, "parallel"))
        .with_agent(Arc::new(
            MockAgent::new(vec![json!({"type": "result"})]).with_delay(Duration::from_millis(20)),
        ))
        .run()
        .await
        .unwrap();

    assert_exact_id_range(&report.trials, 6);
}

#[tokio::test]
async fn test_trial_ids_exact_range_bounded() {
    let source = tempdir().unwrap();
    let base = tempdir().unwrap();
    setup_source(source.path());

    let mut cfg = config(source.path(), base.path(), 3, 3, "parallel-limit");
    cfg.execution.concurrency = Some(2);

    let report = EvalRunner::from_config(cfg)
        .with_agent(Arc::new(
            MockAgent::new(vec![json!({"type": "result"})]).with_delay(Duration::from_millis(10)),
        ))
        .run()
        .await
        .unwrap();

    assert_exact_id_range(&report.trials, 9);
}

#[tokio::test]
async fn test_variant_major_ordering_in_report() {
    let source = tempdir().unwrap();
    let base = tempdir().unwrap();
    setup_source(source.path());

    let report = EvalRunner::from_config(config(source.path(), base.path(), 2, 2, "parallel"))
        .with_agent(Arc::new(MockAgent::new(vec![json!({"type": "result"})])))
        .run()
        .await
        .unwrap();

    let prompt_ids: Vec<&str> = report.trials.iter().map(|t| t.prompt_id.as_str()).collect();
    assert_eq!(prompt_ids, vec!["variant-0", "variant-0", "variant-1", "variant-1"]);
}

// =============================================================================
// Concurrency bounds
// =============================================================================

/// Agent that records concurrent-entry counts
struct CountingAgent {
    current: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl CountingAgent {
    fn new(delay: Duration) -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay,
        }
    }
}

#[async_trait]
impl AgentRunner for CountingAgent {
    async fn invoke(&self, _invocation: AgentInvocation) -> Result<AgentOutcome, AgentError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(AgentOutcome::default())
    }
}

#[tokio::test]
async fn test_bounded_concurrency_never_exceeds_limit() {
    let source = tempdir().unwrap();
    let base = tempdir().unwrap();
    setup_source(source.path());

    let mut cfg = config(source.path(), base.path(), 4, 3, "parallel-limit");
    cfg.execution.concurrency = Some(3);

    let agent = Arc::new(CountingAgent::new(Duration::from_millis(30)));
    let report = EvalRunner::from_config(cfg)
        .with_agent(agent.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.trials.len(), 12);
    let peak = agent.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {} exceeded limit 3", peak);
}

#[tokio::test]
async fn test_bounded_limit_one_matches_sequential() {
    let source = tempdir().unwrap();
    let base = tempdir().unwrap();
    setup_source(source.path());

    let scorer = || {
        Arc::new(FnScorer::new("by-trial", |ctx| {
            // Fails for odd trial ids, via the injected env value
            let trial_id: usize = ctx.env.get("TRIAL_ID").unwrap().parse().unwrap();
            if trial_id % 2 == 0 {
                Ok(ScoreResult::pass("even"))
            } else {
                Ok(ScoreResult::fail("odd"))
            }
        }))
    };

    let mut seq_runner = EvalRunner::from_config(config(source.path(), base.path(), 2, 2, "sequential"))
        .with_agent(Arc::new(MockAgent::new(vec![json!({"type": "result"})])))
        .with_env_provider(trial_id_env());
    seq_runner.add_scorer(scorer(), Duration::from_secs(5));
    let sequential = seq_runner.run().await.unwrap();

    let mut cfg = config(source.path(), base.path(), 2, 2, "parallel-limit");
    cfg.execution.concurrency = Some(1);
    let mut bounded_runner = EvalRunner::from_config(cfg)
        .with_agent(Arc::new(MockAgent::new(vec![json!({"type": "result"})])))
        .with_env_provider(trial_id_env());
    bounded_runner.add_scorer(scorer(), Duration::from_secs(5));
    let bounded = bounded_runner.run().await.unwrap();

    // Identical modulo timing fields
    let strip = |trials: &[TrialResult]| -> Vec<(usize, String, bool, Vec<(String, String)>)> {
        trials
            .iter()
            .map(|t| {
                (
                    t.trial_id,
                    t.prompt_id.clone(),
                    t.success,
                    t.scores
                        .iter()
                        .map(|(name, score)| (name.clone(), format!("{:.1}", score.score)))
                        .collect(),
                )
            })
            .collect()
    };

    assert_eq!(strip(&sequential.trials), strip(&bounded.trials));
    assert_eq!(sequential.overall_success, bounded.overall_success);
}

// =============================================================================
// Failure containment
// =============================================================================

/// Agent that fails one specific trial, selected via the injected env
struct FailOneAgent {
    fail_trial: usize,
}

#[async_trait]
impl AgentRunner for FailOneAgent {
    async fn invoke(&self, invocation: AgentInvocation) -> Result<AgentOutcome, AgentError> {
        let trial_id: usize = invocation
            .env
            .get("TRIAL_ID")
            .and_then(|v| v.parse().ok())
            .unwrap_or(usize::MAX);
        if trial_id == self.fail_trial {
            return Err(AgentError::SpawnFailed("simulated crash".to_string()));
        }
        Ok(AgentOutcome::default())
    }
}

#[tokio::test]
async fn test_one_failing_trial_does_not_disturb_siblings() {
    let source = tempdir().unwrap();
    let base = tempdir().unwrap();
    setup_source(source.path());

    let report = EvalRunner::from_config(config(source.path(), base.path(), 2, 3, "parallel"))
        .with_agent(Arc::new(FailOneAgent { fail_trial: 2 }))
        .with_env_provider(trial_id_env())
        .run()
        .await
        .unwrap();

    // Full id set despite the failure
    assert_exact_id_range(&report.trials, 6);
    assert!(!report.overall_success);

    for trial in &report.trials {
        if trial.trial_id == 2 {
            assert!(!trial.success);
            assert!(trial.error.as_ref().unwrap().contains("simulated crash"));
        } else {
            assert!(trial.success, "trial {} should be unaffected", trial.trial_id);
            assert!(trial.error.is_none());
        }
    }
}

// =============================================================================
// Aggregation
// =============================================================================

#[tokio::test]
async fn test_demo_scenario_pass_rate() {
    // 1 variant, 3 iterations, sequential; scorer passes trials 0-1, fails trial 2
    let source = tempdir().unwrap();
    let base = tempdir().unwrap();
    setup_source(source.path());

    let mut runner = EvalRunner::from_config(config(source.path(), base.path(), 1, 3, "sequential"))
        .with_agent(Arc::new(MockAgent::new(vec![json!({"type": "result"})])))
        .with_env_provider(trial_id_env());
    runner.add_scorer(
        Arc::new(FnScorer::new("demo", |ctx| {
            let trial_id: usize = ctx.env.get("TRIAL_ID").unwrap().parse().unwrap();
            if trial_id < 2 {
                Ok(ScoreResult::pass("ok"))
            } else {
                Ok(ScoreResult::fail("regressed"))
            }
        })),
        Duration::from_secs(5),
    );

    let report = runner.run().await.unwrap();

    assert_eq!(report.trials.len(), 3);
    assert!(!report.overall_success);
    assert!((report.aggregates["demo"].pass_rate - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_no_scorers_vacuous_success() {
    let source = tempdir().unwrap();
    let base = tempdir().unwrap();
    setup_source(source.path());

    let report = EvalRunner::from_config(config(source.path(), base.path(), 2, 2, "sequential"))
        .with_agent(Arc::new(MockAgent::new(vec![json!({"type": "result"})])))
        .run()
        .await
        .unwrap();

    assert!(report.overall_success);
    for trial in &report.trials {
        assert!(trial.success);
    }
    assert_eq!(report.aggregates["_overall"].pass_rate, 1.0);
}

#[tokio::test]
async fn test_usage_summed_across_trials() {
    let source = tempdir().unwrap();
    let base = tempdir().unwrap();
    setup_source(source.path());

    let report = EvalRunner::from_config(config(source.path(), base.path(), 1, 3, "sequential"))
        .with_agent(Arc::new(MockAgent::new(vec![
            json!({"type": "result", "usage": {"input_tokens": 100, "output_tokens": 20}}),
        ])))
        .run()
        .await
        .unwrap();

    let usage = report.total_resource_usage.unwrap();
    assert_eq!(usage.input_tokens, 300);
    assert_eq!(usage.output_tokens, 60);
}

// =============================================================================
// Configuration errors
// =============================================================================

#[tokio::test]
async fn test_parallel_limit_without_concurrency_is_fatal() {
    let source = tempdir().unwrap();
    let base = tempdir().unwrap();
    setup_source(source.path());
    let workspace_base = base.path().join("workspaces");

    let cfg = config(source.path(), &workspace_base, 2, 2, "parallel-limit");
    let err = EvalRunner::from_config(cfg)
        .with_agent(Arc::new(MockAgent::new(vec![])))
        .run()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("concurrency"));
    // Raised before any workspace was provisioned
    assert!(!workspace_base.exists());
}

// =============================================================================
// Full production path
// =============================================================================

#[tokio::test]
async fn test_process_agent_and_command_scorer_end_to_end() {
    let source = tempdir().unwrap();
    let base = tempdir().unwrap();
    setup_source(source.path());

    // A scripted "agent": reads the prompt, edits the workspace, emits events
    let script = r#"
read -r prompt
echo "{\"type\":\"message\",\"text\":\"working on: $prompt\"}"
echo "patched" > note.txt
echo '{"type":"result","usage":{"input_tokens":7,"output_tokens":3}}'
"#;

    let mut cfg = config(source.path(), base.path(), 1, 2, "sequential");
    cfg.agent.command = "sh".to_string();
    cfg.agent.args = vec!["-c".to_string(), script.to_string()];

    // No with_agent override: exercises the ProcessAgent built from config
    let mut runner = EvalRunner::from_config(cfg);
    runner.add_scorer(
        Arc::new(CommandScorer::new("note-exists", "test -f note.txt")),
        Duration::from_secs(10),
    );

    let report = runner.run().await.unwrap();

    assert!(report.overall_success);
    assert_eq!(report.trials.len(), 2);
    for trial in &report.trials {
        assert!(trial.transcript.contains("working on"));
        assert!(trial.change_set.contains("note.txt"));
        assert!(trial.scores["note-exists"].passed());
    }
    assert_eq!(report.total_resource_usage.unwrap().input_tokens, 14);
}
