//! Top-level evaluation runner
//!
//! Wires configuration into the generator, executor, scheduler, and
//! aggregator. Configuration errors are the only errors this surfaces;
//! a run with failing trials still returns a complete report.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::Result;
use tracing::info;

use crate::agent::{AgentRunner, ProcessAgent};
use crate::aggregate::aggregate;
use crate::config::EvalConfig;
use crate::domain::EvalReport;
use crate::engine::EvalTrialExecutor;
use crate::env::{EnvProvider, StaticEnv};
use crate::matrix;
use crate::scheduler::{ExecutionMode, run_trials};
use crate::scorer::{CommandScorer, Scorer};
use crate::workspace::{WorkspaceConfig, WorkspaceManager};

/// Runs one evaluation matrix to a report
pub struct EvalRunner {
    config: EvalConfig,
    agent: Arc<dyn AgentRunner>,
    env_provider: Arc<dyn EnvProvider>,
    extra_scorers: Vec<(Arc<dyn Scorer>, Duration)>,
}

impl EvalRunner {
    /// Build a runner from configuration
    ///
    /// The agent defaults to the configured external process and the
    /// environment provider to the configured static map; both can be
    /// replaced for programmatic use.
    pub fn from_config(config: EvalConfig) -> Self {
        let agent = Arc::new(ProcessAgent::new(config.agent.command.clone(), config.agent.args.clone()));
        let env_provider = Arc::new(StaticEnv::new(config.env.clone()));
        Self {
            config,
            agent,
            env_provider,
            extra_scorers: Vec::new(),
        }
    }

    /// Replace the agent collaborator
    pub fn with_agent(mut self, agent: Arc<dyn AgentRunner>) -> Self {
        self.agent = agent;
        self
    }

    /// Replace the environment provider
    pub fn with_env_provider(mut self, env_provider: Arc<dyn EnvProvider>) -> Self {
        self.env_provider = env_provider;
        self
    }

    /// Register a scorer beyond the configured command scorers
    pub fn add_scorer(&mut self, scorer: Arc<dyn Scorer>, timeout: Duration) {
        self.extra_scorers.push((scorer, timeout));
    }

    /// Execute the full matrix and assemble the report
    ///
    /// Fails only on configuration errors, before any workspace is
    /// provisioned. Trial-scoped failures land on individual results.
    pub async fn run(self) -> Result<EvalReport> {
        self.config.validate()?;
        let mode = ExecutionMode::from_config(&self.config.execution)?;
        let specs = matrix::generate(&self.config.prompts, self.config.iterations)?;

        info!(
            name = %self.config.name,
            trials = specs.len(),
            ?mode,
            "Starting evaluation run"
        );

        let workspaces = WorkspaceManager::new(WorkspaceConfig {
            base_dir: self.config.workspace.base_dir.clone(),
            source_dir: self.config.workspace.source_dir.clone(),
            exclude: self.config.workspace.exclude.clone(),
        });

        let mut executor = EvalTrialExecutor::new(
            workspaces,
            self.agent,
            self.env_provider,
            self.config.workspace.cleanup,
            Duration::from_millis(self.config.agent.timeout_ms),
        );
        if let Some(install) = &self.config.workspace.install_command {
            executor = executor.with_install_command(install.clone());
        }
        for scorer in &self.config.scorers {
            executor.add_scorer(
                Arc::new(CommandScorer::new(scorer.name.clone(), scorer.command.clone())),
                Duration::from_millis(scorer.timeout_ms),
            );
        }
        for (scorer, timeout) in self.extra_scorers {
            executor.add_scorer(scorer, timeout);
        }

        let started = Instant::now();
        let results = run_trials(specs, mode, Arc::new(executor)).await?;
        let report = aggregate(&self.config.name, results, started.elapsed());

        info!(
            name = %report.name,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Evaluation run finished"
        );
        Ok(report)
    }
}
