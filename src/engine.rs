//! Trial executor
//!
//! Composes the workspace manager and the collaborator adapters into the
//! full lifecycle of one trial: provision, materialize environment,
//! install, invoke agent, diff, score, dispose. Every failure along the
//! way is captured as data on the `TrialResult`; nothing escapes to
//! sibling trials.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::agent::{AgentInvocation, AgentRunner};
use crate::domain::{TrialResult, TrialSpec};
use crate::env::EnvProvider;
use crate::scorer::{CommandRunner, Scorer, ScorerContext, run_scorer};
use crate::workspace::{CleanupPolicy, Workspace, WorkspaceManager};

/// Executes one trial spec to a result
///
/// The scheduler only knows this contract; the real composition below and
/// instrumented test executors both implement it.
#[async_trait]
pub trait TrialExecutor: Send + Sync {
    /// Run one trial's full lifecycle
    ///
    /// Never fails: every error is folded into the returned result.
    async fn execute(&self, spec: TrialSpec) -> TrialResult;
}

/// The production trial executor
pub struct EvalTrialExecutor {
    workspaces: WorkspaceManager,
    agent: Arc<dyn AgentRunner>,
    env_provider: Arc<dyn EnvProvider>,
    scorers: Vec<(Arc<dyn Scorer>, CommandRunner)>,
    agent_timeout: Duration,
    install_command: Option<String>,
    cleanup: CleanupPolicy,
}

impl EvalTrialExecutor {
    /// Create an executor with no scorers
    pub fn new(
        workspaces: WorkspaceManager,
        agent: Arc<dyn AgentRunner>,
        env_provider: Arc<dyn EnvProvider>,
        cleanup: CleanupPolicy,
        agent_timeout: Duration,
    ) -> Self {
        debug!(?cleanup, agent_timeout_ms = agent_timeout.as_millis() as u64, "EvalTrialExecutor::new: called");
        Self {
            workspaces,
            agent,
            env_provider,
            scorers: Vec::new(),
            agent_timeout,
            install_command: None,
            cleanup,
        }
    }

    /// Register a scorer with its command timeout
    pub fn add_scorer(&mut self, scorer: Arc<dyn Scorer>, timeout: Duration) {
        debug!(scorer = scorer.name(), "EvalTrialExecutor::add_scorer: called");
        self.scorers.push((scorer, CommandRunner::new(timeout)));
    }

    /// Set the dependency-install command run before the agent
    pub fn with_install_command(mut self, command: impl Into<String>) -> Self {
        self.install_command = Some(command.into());
        self
    }

    /// Run the lifecycle stages that need a provisioned workspace
    ///
    /// Fills the result in place; a returned error message means the trial
    /// failed at that stage. Scorer failures are not lifecycle failures:
    /// they land as zero scores via the scorer adapter.
    async fn run_lifecycle(
        &self,
        spec: &TrialSpec,
        workspace: &Workspace,
        result: &mut TrialResult,
    ) -> Result<(), String> {
        self.workspaces
            .materialize_env(workspace, &result.environment_values)
            .await
            .map_err(|e| e.to_string())?;

        if let Some(install) = &self.install_command {
            debug!(trial_id = spec.trial_id, %install, "EvalTrialExecutor::run_lifecycle: running install command");
            let runner = CommandRunner::new(self.agent_timeout);
            let output = runner
                .run(install, &workspace.path, &result.environment_values)
                .await
                .map_err(|e| format!("Install command failed: {}", e))?;
            if !output.passed() {
                return Err(format!(
                    "Install command '{}' exited {}: {}",
                    install,
                    output.exit_code,
                    output.stderr.trim()
                ));
            }
        }

        let outcome = self
            .agent
            .invoke(AgentInvocation {
                working_dir: workspace.path.clone(),
                prompt_text: spec.prompt_text.clone(),
                timeout: self.agent_timeout,
                env: result.environment_values.clone(),
            })
            .await
            .map_err(|e| e.to_string())?;
        result.transcript = outcome.transcript;
        result.resource_usage = outcome.usage;
        debug!(trial_id = spec.trial_id, "EvalTrialExecutor::run_lifecycle: agent drained");

        result.change_set = self.workspaces.change_set(workspace).await.map_err(|e| e.to_string())?;

        for (scorer, runner) in &self.scorers {
            let context = ScorerContext {
                workspace: &workspace.path,
                change_set: &result.change_set,
                transcript: &result.transcript,
                prompt_id: &spec.prompt_id,
                env: &result.environment_values,
                runner,
            };
            let score = run_scorer(scorer.as_ref(), &context).await;
            result.scores.insert(scorer.name().to_string(), score);
        }

        Ok(())
    }
}

#[async_trait]
impl TrialExecutor for EvalTrialExecutor {
    async fn execute(&self, spec: TrialSpec) -> TrialResult {
        info!(trial_id = spec.trial_id, prompt_id = %spec.prompt_id, "Trial starting");
        let started = Instant::now();
        let mut result = TrialResult::new(spec.trial_id, &spec.prompt_id);

        // Resolve environment values before provisioning anything
        match self.env_provider.provide(&spec.env_context).await {
            Ok(env) => result.environment_values = env,
            Err(e) => {
                result.error = Some(format!("Environment provider failed: {}", e));
                result.evaluate_success();
                result.duration_ms = started.elapsed().as_millis() as u64;
                return result;
            }
        }

        let workspace = match self.workspaces.provision(spec.trial_id).await {
            Ok(workspace) => workspace,
            Err(e) => {
                debug!(trial_id = spec.trial_id, "EvalTrialExecutor::execute: provisioning failed");
                result.error = Some(e.to_string());
                result.evaluate_success();
                result.duration_ms = started.elapsed().as_millis() as u64;
                return result;
            }
        };

        if let Err(message) = self.run_lifecycle(&spec, &workspace, &mut result).await {
            debug!(trial_id = spec.trial_id, %message, "EvalTrialExecutor::execute: lifecycle failed");
            result.error = Some(message);
        }
        result.evaluate_success();

        match self.workspaces.dispose(&workspace, self.cleanup, result.success).await {
            Ok(Some(path)) => result.retained_workspace = Some(path.display().to_string()),
            Ok(None) => {}
            Err(e) => {
                warn!(trial_id = spec.trial_id, "Failed to dispose workspace: {}", e);
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            trial_id = spec.trial_id,
            success = result.success,
            duration_ms = result.duration_ms,
            "Trial finished"
        );
        result
    }
}
