//! Evaluation configuration types and loading

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::PromptVariant;
use crate::workspace::CleanupPolicy;

/// Configuration errors, raised before any trial starts
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No prompt variants configured")]
    NoPromptVariants,

    #[error("Duplicate prompt variant id: {0}")]
    DuplicatePromptId(String),

    #[error("Duplicate scorer name: {0}")]
    DuplicateScorerName(String),

    #[error("Iterations must be at least 1")]
    ZeroIterations,

    #[error("Unknown execution mode: {0}")]
    UnknownMode(String),

    #[error("Execution mode 'parallel-limit' requires a positive concurrency value")]
    MissingConcurrencyLimit,
}

/// Top-level evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Run name, used in the report and output file names
    pub name: String,

    /// Prompt variants to evaluate
    pub prompts: Vec<PromptVariant>,

    /// Trials per variant
    pub iterations: u32,

    /// Execution strategy
    pub execution: ExecutionConfig,

    /// Agent collaborator invocation
    pub agent: AgentConfig,

    /// Scorer commands to run per trial
    pub scorers: Vec<ScorerConfig>,

    /// Workspace provisioning settings
    pub workspace: WorkspaceSettings,

    /// Static environment values injected into every trial
    pub env: BTreeMap<String, String>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            name: "eval".to_string(),
            prompts: Vec::new(),
            iterations: 1,
            execution: ExecutionConfig::default(),
            agent: AgentConfig::default(),
            scorers: Vec::new(),
            workspace: WorkspaceSettings::default(),
            env: BTreeMap::new(),
        }
    }
}

impl EvalConfig {
    /// Validate configuration before use
    ///
    /// Configuration errors are the only fatal error class; everything else
    /// is contained per trial. Call this early so a bad eval file fails
    /// before any workspace is provisioned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prompts.is_empty() {
            return Err(ConfigError::NoPromptVariants);
        }

        let mut seen = std::collections::HashSet::new();
        for prompt in &self.prompts {
            if !seen.insert(prompt.id.as_str()) {
                return Err(ConfigError::DuplicatePromptId(prompt.id.clone()));
            }
        }

        let mut scorer_names = std::collections::HashSet::new();
        for scorer in &self.scorers {
            if !scorer_names.insert(scorer.name.as_str()) {
                return Err(ConfigError::DuplicateScorerName(scorer.name.clone()));
            }
        }

        if self.iterations < 1 {
            return Err(ConfigError::ZeroIterations);
        }

        self.execution.validate()?;

        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load eval file from {}", path.display()));
        }

        // Try project-local config: .evalmatrix.yml
        let local_config = PathBuf::from(".evalmatrix.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load eval file from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/evalmatrix/evalmatrix.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("evalmatrix").join("evalmatrix.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load eval file from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        Err(eyre::eyre!(
            "No eval file found (pass a path, or create .evalmatrix.yml)"
        ))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read eval file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse eval file")?;

        tracing::info!("Loaded eval file from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Execution strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Strategy: "sequential", "parallel", or "parallel-limit"
    pub mode: String,

    /// In-flight trial limit, required for "parallel-limit"
    pub concurrency: Option<usize>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: "sequential".to_string(),
            concurrency: None,
        }
    }
}

impl ExecutionConfig {
    /// Check the mode string and its concurrency requirement
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.mode.as_str() {
            "sequential" | "parallel" => Ok(()),
            "parallel-limit" => match self.concurrency {
                Some(limit) if limit >= 1 => Ok(()),
                _ => Err(ConfigError::MissingConcurrencyLimit),
            },
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Agent collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Command to spawn per trial
    pub command: String,

    /// Arguments passed to the command
    pub args: Vec<String>,

    /// Timeout applied to the full event drain
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: vec![
                "-p".to_string(),
                "--verbose".to_string(),
                "--output-format".to_string(),
                "stream-json".to_string(),
            ],
            timeout_ms: 600_000,
        }
    }
}

/// One deterministic command scorer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Scorer name, unique within a run
    pub name: String,

    /// Shell command run in the workspace; exit code 0 scores 1.0
    pub command: String,

    /// Per-invocation timeout
    #[serde(rename = "timeout-ms", default = "default_scorer_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_scorer_timeout_ms() -> u64 {
    120_000
}

/// Workspace provisioning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    /// Source project directory, shared read-only across trials
    #[serde(rename = "source-dir")]
    pub source_dir: PathBuf,

    /// Base directory for per-trial workspace copies
    #[serde(rename = "base-dir")]
    pub base_dir: PathBuf,

    /// Extra glob patterns excluded from the copy
    pub exclude: Vec<String>,

    /// Workspace cleanup policy
    pub cleanup: CleanupPolicy,

    /// Optional dependency-install command run before the agent
    #[serde(rename = "install-command")]
    pub install_command: Option<String>,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            base_dir: std::env::temp_dir().join("evalmatrix").join("workspaces"),
            exclude: Vec::new(),
            cleanup: CleanupPolicy::Always,
            install_command: None,
        }
    }
}
