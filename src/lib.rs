//! EvalMatrix - Prompt-Variant Evaluation Matrix Runner
//!
//! EvalMatrix executes `variants x iterations` independent trials, each
//! against a freshly isolated copy of a source project, collects per-trial
//! pass/fail and scorer measurements, and produces an aggregate report.
//!
//! # Core Concepts
//!
//! - **Isolation Always**: every trial gets its own workspace copy with a
//!   git baseline; the source tree is never mutated
//! - **Failures Are Data**: one trial's failure never aborts siblings; it
//!   lands on that trial's result and the run still yields a full report
//! - **Stable Identity**: trial ids are assigned at generation time, so
//!   report order never depends on completion order
//! - **Bounded Concurrency**: a semaphore admits trials in generation
//!   order under the `parallel-limit` strategy
//!
//! # Modules
//!
//! - [`matrix`] - Trial spec generation from variants and iterations
//! - [`workspace`] - Workspace provisioning, diffing, and disposal
//! - [`agent`] - Agent collaborator adapter and event draining
//! - [`scorer`] - Scorer trait, command scorer, and containment adapter
//! - [`engine`] - Per-trial lifecycle executor
//! - [`scheduler`] - Sequential / parallel / bounded execution strategies
//! - [`aggregate`] - Statistical report assembly
//! - [`config`] - Eval file types and loading

pub mod agent;
pub mod aggregate;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod env;
pub mod matrix;
pub mod runner;
pub mod scheduler;
pub mod scorer;
pub mod workspace;

// Re-export commonly used types
pub use agent::{AgentError, AgentInvocation, AgentOutcome, AgentRunner, MockAgent, ProcessAgent};
pub use aggregate::aggregate;
pub use config::{AgentConfig, ConfigError, EvalConfig, ExecutionConfig, ScorerConfig, WorkspaceSettings};
pub use domain::{
    AggregateScore, EvalReport, OVERALL_KEY, PromptVariant, ResourceUsage, ScoreResult, TrialContext,
    TrialResult, TrialSpec,
};
pub use engine::{EvalTrialExecutor, TrialExecutor};
pub use env::{EnvProvider, FnEnv, StaticEnv};
pub use matrix::generate;
pub use runner::EvalRunner;
pub use scheduler::{ExecutionMode, run_trials};
pub use scorer::{CommandOutput, CommandRunner, CommandScorer, FnScorer, Scorer, ScorerContext, run_scorer};
pub use workspace::{CleanupPolicy, Workspace, WorkspaceConfig, WorkspaceError, WorkspaceManager};
