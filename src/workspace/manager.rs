//! Workspace manager for provisioning, diffing, and disposing trial copies

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, warn};

/// Error types for workspace operations
///
/// All of these are trial-scoped: the trial executor converts them into a
/// failed `TrialResult` and sibling trials keep running.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Failed to copy source tree: {0}")]
    CopyFailed(String),

    #[error("Failed to establish baseline: {0}")]
    BaselineFailed(String),

    #[error("Failed to write environment file: {0}")]
    EnvWriteFailed(String),

    #[error("Failed to remove workspace: {0}")]
    RemoveFailed(String),

    #[error("Git command failed: {0}")]
    GitError(String),
}

/// Rule governing whether a workspace is deleted after its trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    /// Delete every workspace
    #[default]
    Always,
    /// Retain only workspaces of failed trials
    OnFailure,
    /// Delete nothing
    Never,
}

impl CleanupPolicy {
    /// Whether a workspace should be retained for the given trial outcome
    pub fn retains(&self, success: bool) -> bool {
        match self {
            CleanupPolicy::Always => false,
            CleanupPolicy::OnFailure => !success,
            CleanupPolicy::Never => true,
        }
    }
}

/// Configuration for the workspace manager
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Base directory for workspace copies
    pub base_dir: PathBuf,

    /// Source project directory, shared read-only across trials
    pub source_dir: PathBuf,

    /// Extra glob patterns excluded from the copy
    pub exclude: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        debug!("WorkspaceConfig::default: called");
        Self {
            base_dir: std::env::temp_dir().join("evalmatrix").join("workspaces"),
            source_dir: PathBuf::from("."),
            exclude: Vec::new(),
        }
    }
}

impl WorkspaceConfig {
    /// Create config with the given source directory
    pub fn with_source(source_dir: impl Into<PathBuf>) -> Self {
        let source_dir = source_dir.into();
        debug!(?source_dir, "WorkspaceConfig::with_source: called");
        Self {
            source_dir,
            ..Default::default()
        }
    }
}

/// An ephemeral, trial-exclusive workspace
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Trial that owns this workspace
    pub trial_id: usize,

    /// Unique directory name under the base dir
    pub id: String,

    /// Absolute workspace path
    pub path: PathBuf,

    /// Baseline commit sha the change set is diffed against
    pub baseline: String,
}

/// Directory names never copied into a workspace
const DEFAULT_EXCLUDES: &[&str] = &[".git", "target", "node_modules", "dist", "__pycache__", ".venv"];

/// Manager for trial workspaces
pub struct WorkspaceManager {
    config: WorkspaceConfig,
}

impl WorkspaceManager {
    /// Create a new workspace manager
    pub fn new(config: WorkspaceConfig) -> Self {
        debug!(?config, "WorkspaceManager::new: called");
        Self { config }
    }

    /// Provision an isolated workspace for a trial
    ///
    /// Copies the source tree (excluding reproducible artifacts), then
    /// establishes a fresh git baseline commit so a later diff is always
    /// well-defined. The source directory is never written to.
    pub async fn provision(&self, trial_id: usize) -> Result<Workspace, WorkspaceError> {
        debug!(trial_id, "WorkspaceManager::provision: called");

        if let Err(e) = tokio::fs::create_dir_all(&self.config.base_dir).await {
            debug!("WorkspaceManager::provision: failed to create base dir");
            return Err(WorkspaceError::CopyFailed(format!("Failed to create base dir: {}", e)));
        }
        debug!("WorkspaceManager::provision: base directory exists");

        let id = workspace_id(trial_id);
        let path = self.config.base_dir.join(&id);

        let patterns = compile_patterns(&self.config.exclude)?;
        let source = self.config.source_dir.clone();
        let dest = path.clone();
        tokio::task::spawn_blocking(move || copy_tree(&source, &dest, &patterns))
            .await
            .map_err(|e| WorkspaceError::CopyFailed(format!("Copy task failed: {}", e)))??;
        debug!(trial_id, ?path, "WorkspaceManager::provision: source tree copied");

        let baseline = self.establish_baseline(&path).await?;
        debug!(trial_id, %baseline, "WorkspaceManager::provision: baseline established");

        info!("Provisioned workspace {} at {:?}", id, path);

        Ok(Workspace {
            trial_id,
            id,
            path,
            baseline,
        })
    }

    /// Initialize a git repository and commit everything as the baseline
    async fn establish_baseline(&self, path: &Path) -> Result<String, WorkspaceError> {
        debug!(?path, "WorkspaceManager::establish_baseline: called");

        run_git(&["init", "--quiet"], path).await?;
        run_git(&["config", "user.email", "eval@evalmatrix.local"], path).await?;
        run_git(&["config", "user.name", "evalmatrix"], path).await?;
        run_git(&["add", "-A"], path).await?;

        let output = Command::new("git")
            .args(["commit", "--allow-empty", "--quiet", "-m", "eval baseline"])
            .current_dir(path)
            .output()
            .await
            .map_err(|e| WorkspaceError::GitError(e.to_string()))?;

        if !output.status.success() {
            debug!("WorkspaceManager::establish_baseline: baseline commit failed");
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkspaceError::BaselineFailed(stderr.to_string()));
        }
        debug!("WorkspaceManager::establish_baseline: baseline commit succeeded");

        let rev = run_git(&["rev-parse", "HEAD"], path).await?;
        Ok(rev.trim().to_string())
    }

    /// Write resolved environment values into the workspace as a `.env` file
    ///
    /// Values are materialized per workspace, never into process-global
    /// state: concurrent trials each see only their own file. The file is
    /// added to the repo's local exclude list so it never shows up in the
    /// change set.
    pub async fn materialize_env(
        &self,
        workspace: &Workspace,
        values: &BTreeMap<String, String>,
    ) -> Result<(), WorkspaceError> {
        debug!(trial_id = workspace.trial_id, count = values.len(), "WorkspaceManager::materialize_env: called");

        let mut content = String::new();
        for (key, value) in values {
            content.push_str(key);
            content.push('=');
            content.push_str(value);
            content.push('\n');
        }

        tokio::fs::write(workspace.path.join(".env"), content)
            .await
            .map_err(|e| WorkspaceError::EnvWriteFailed(e.to_string()))?;

        let exclude_path = workspace.path.join(".git").join("info").join("exclude");
        if let Some(parent) = exclude_path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        let existing = tokio::fs::read_to_string(&exclude_path).await.unwrap_or_default();
        if !existing.lines().any(|l| l == ".env") {
            debug!(trial_id = workspace.trial_id, "WorkspaceManager::materialize_env: adding .env to git exclude");
            tokio::fs::write(&exclude_path, format!("{}.env\n", existing))
                .await
                .map_err(|e| WorkspaceError::EnvWriteFailed(e.to_string()))?;
        }

        Ok(())
    }

    /// Compute the diff of the workspace against its baseline
    pub async fn change_set(&self, workspace: &Workspace) -> Result<String, WorkspaceError> {
        debug!(trial_id = workspace.trial_id, "WorkspaceManager::change_set: called");

        // Stage everything so new files appear in the diff. The workspace
        // is trial-exclusive, so mutating its index is safe.
        run_git(&["add", "-A"], &workspace.path).await?;
        let diff = run_git(&["diff", "--cached", workspace.baseline.as_str()], &workspace.path).await?;

        debug!(trial_id = workspace.trial_id, bytes = diff.len(), "WorkspaceManager::change_set: diff computed");
        Ok(diff)
    }

    /// Dispose of a workspace per the cleanup policy and trial outcome
    ///
    /// Returns the workspace path when the policy retained it.
    pub async fn dispose(
        &self,
        workspace: &Workspace,
        policy: CleanupPolicy,
        success: bool,
    ) -> Result<Option<PathBuf>, WorkspaceError> {
        debug!(trial_id = workspace.trial_id, ?policy, success, "WorkspaceManager::dispose: called");

        if policy.retains(success) {
            debug!(trial_id = workspace.trial_id, "WorkspaceManager::dispose: retaining workspace");
            info!("Retained workspace {} at {:?}", workspace.id, workspace.path);
            return Ok(Some(workspace.path.clone()));
        }

        if !workspace.path.exists() {
            debug!(trial_id = workspace.trial_id, "WorkspaceManager::dispose: already gone, skipping");
            warn!("Workspace {:?} does not exist, skipping removal", workspace.path);
            return Ok(None);
        }

        tokio::fs::remove_dir_all(&workspace.path)
            .await
            .map_err(|e| WorkspaceError::RemoveFailed(e.to_string()))?;
        debug!(trial_id = workspace.trial_id, "WorkspaceManager::dispose: removed");

        info!("Removed workspace {}", workspace.id);
        Ok(None)
    }

    /// The manager's base directory
    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }
}

/// Build a unique workspace directory name for a trial
///
/// Format: `trial-{id}-{6-char-hex}`. The suffix comes from the random
/// tail of a v7 uuid (the leading characters are timestamp bits and can
/// repeat within a run), keeping concurrent runs against the same base
/// directory from colliding.
fn workspace_id(trial_id: usize) -> String {
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    let hex_suffix = &uuid[uuid.len() - 6..];
    format!("trial-{:04}-{}", trial_id, hex_suffix)
}

/// Compile user exclude globs, failing provisioning on a malformed pattern
fn compile_patterns(exclude: &[String]) -> Result<Vec<glob::Pattern>, WorkspaceError> {
    exclude
        .iter()
        .map(|p| glob::Pattern::new(p).map_err(|e| WorkspaceError::CopyFailed(format!("Bad exclude pattern {}: {}", p, e))))
        .collect()
}

/// Copy the source tree into the workspace, skipping excluded entries
///
/// Runs on the blocking pool; the provisioning call awaits it.
fn copy_tree(source: &Path, dest: &Path, patterns: &[glob::Pattern]) -> Result<(), WorkspaceError> {
    let excluded = |entry: &walkdir::DirEntry| -> bool {
        let name = entry.file_name().to_string_lossy();
        if DEFAULT_EXCLUDES.contains(&name.as_ref()) {
            return true;
        }
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        patterns.iter().any(|p| p.matches_path(relative))
    };

    for entry in walkdir::WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !excluded(e))
    {
        let entry = entry.map_err(|e| WorkspaceError::CopyFailed(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| WorkspaceError::CopyFailed(e.to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| WorkspaceError::CopyFailed(e.to_string()))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| WorkspaceError::CopyFailed(e.to_string()))?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| WorkspaceError::CopyFailed(e.to_string()))?;
        }
        // Symlinks are skipped: workspaces must not reach back into shared state
    }

    Ok(())
}

/// Run a git command in a directory, returning stdout
async fn run_git(args: &[&str], cwd: &Path) -> Result<String, WorkspaceError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|e| WorkspaceError::GitError(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(WorkspaceError::GitError(format!("git {}: {}", args.join(" "), stderr)));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup_source(dir: &Path) {
        std::fs::write(dir.join("main.rs"), "fn main() {}\n").unwrap();
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(dir.join("src").join("lib.rs"), "pub fn lib() {}\n").unwrap();
        std::fs::create_dir_all(dir.join("target")).unwrap();
        std::fs::write(dir.join("target").join("artifact.o"), "binary").unwrap();
    }

    fn manager_for(source: &Path, base: &Path) -> WorkspaceManager {
        WorkspaceManager::new(WorkspaceConfig {
            base_dir: base.to_path_buf(),
            source_dir: source.to_path_buf(),
            exclude: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_provision_copies_and_excludes() {
        let source = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_source(source.path());

        let manager = manager_for(source.path(), base.path());
        let ws = manager.provision(0).await.unwrap();

        assert!(ws.path.join("main.rs").exists());
        assert!(ws.path.join("src").join("lib.rs").exists());
        // Build caches are never copied
        assert!(!ws.path.join("target").exists());
        // Baseline repo was initialized in the copy
        assert!(ws.path.join(".git").exists());
        assert!(!ws.baseline.is_empty());
    }

    #[tokio::test]
    async fn test_provision_never_mutates_source() {
        let source = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_source(source.path());

        let manager = manager_for(source.path(), base.path());
        let ws = manager.provision(0).await.unwrap();

        // Source has no repo and no new files after provisioning
        assert!(!source.path().join(".git").exists());
        let entries: Vec<_> = std::fs::read_dir(source.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries.len(), 3); // main.rs, src, target

        // Mutating the workspace leaves the source file untouched
        std::fs::write(ws.path.join("main.rs"), "fn main() { changed(); }\n").unwrap();
        let original = std::fs::read_to_string(source.path().join("main.rs")).unwrap();
        assert_eq!(original, "fn main() {}\n");
    }

    #[tokio::test]
    async fn test_provision_unique_paths() {
        let source = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_source(source.path());

        let manager = manager_for(source.path(), base.path());
        let a = manager.provision(1).await.unwrap();
        let b = manager.provision(1).await.unwrap();

        assert_ne!(a.path, b.path);
        assert!(a.path.exists());
        assert!(b.path.exists());
    }

    #[tokio::test]
    async fn test_custom_exclude_patterns() {
        let source = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_source(source.path());
        std::fs::write(source.path().join("debug.log"), "noise").unwrap();

        let manager = WorkspaceManager::new(WorkspaceConfig {
            base_dir: base.path().to_path_buf(),
            source_dir: source.path().to_path_buf(),
            exclude: vec!["*.log".to_string()],
        });
        let ws = manager.provision(0).await.unwrap();

        assert!(ws.path.join("main.rs").exists());
        assert!(!ws.path.join("debug.log").exists());
    }

    #[tokio::test]
    async fn test_change_set_reflects_edits() {
        let source = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_source(source.path());

        let manager = manager_for(source.path(), base.path());
        let ws = manager.provision(0).await.unwrap();

        // No edits: empty diff
        let clean = manager.change_set(&ws).await.unwrap();
        assert!(clean.is_empty());

        std::fs::write(ws.path.join("main.rs"), "fn main() { changed(); }\n").unwrap();
        std::fs::write(ws.path.join("added.rs"), "pub fn added() {}\n").unwrap();

        let diff = manager.change_set(&ws).await.unwrap();
        assert!(diff.contains("changed()"));
        assert!(diff.contains("added.rs"));
    }

    #[tokio::test]
    async fn test_materialize_env_excluded_from_change_set() {
        let source = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_source(source.path());

        let manager = manager_for(source.path(), base.path());
        let ws = manager.provision(0).await.unwrap();

        let values = BTreeMap::from([
            ("EVAL_FLAG".to_string(), "on".to_string()),
            ("API_BASE".to_string(), "http://localhost:9999".to_string()),
        ]);
        manager.materialize_env(&ws, &values).await.unwrap();

        let content = std::fs::read_to_string(ws.path.join(".env")).unwrap();
        assert!(content.contains("EVAL_FLAG=on"));
        assert!(content.contains("API_BASE=http://localhost:9999"));

        // The env file is workspace plumbing, not an agent edit
        let diff = manager.change_set(&ws).await.unwrap();
        assert!(!diff.contains(".env"));
    }

    #[tokio::test]
    async fn test_dispose_always_removes() {
        let source = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_source(source.path());

        let manager = manager_for(source.path(), base.path());
        let ws = manager.provision(0).await.unwrap();

        let retained = manager.dispose(&ws, CleanupPolicy::Always, false).await.unwrap();
        assert!(retained.is_none());
        assert!(!ws.path.exists());
    }

    #[tokio::test]
    async fn test_dispose_on_failure_policy() {
        let source = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_source(source.path());

        let manager = manager_for(source.path(), base.path());

        let passed = manager.provision(0).await.unwrap();
        let retained = manager.dispose(&passed, CleanupPolicy::OnFailure, true).await.unwrap();
        assert!(retained.is_none());
        assert!(!passed.path.exists());

        let failed = manager.provision(1).await.unwrap();
        let retained = manager.dispose(&failed, CleanupPolicy::OnFailure, false).await.unwrap();
        assert_eq!(retained, Some(failed.path.clone()));
        assert!(failed.path.exists());
    }

    #[tokio::test]
    async fn test_dispose_never_retains() {
        let source = tempdir().unwrap();
        let base = tempdir().unwrap();
        setup_source(source.path());

        let manager = manager_for(source.path(), base.path());
        let ws = manager.provision(0).await.unwrap();

        let retained = manager.dispose(&ws, CleanupPolicy::Never, true).await.unwrap();
        assert_eq!(retained, Some(ws.path.clone()));
        assert!(ws.path.exists());
    }

    #[test]
    fn test_cleanup_policy_serde() {
        let policy: CleanupPolicy = serde_yaml::from_str("on-failure").unwrap();
        assert_eq!(policy, CleanupPolicy::OnFailure);
        assert_eq!(serde_yaml::to_string(&CleanupPolicy::Never).unwrap().trim(), "never");
    }

    #[test]
    fn test_workspace_id_format() {
        let id = workspace_id(12);
        assert!(id.starts_with("trial-0012-"));
        assert_ne!(workspace_id(12), workspace_id(12));
    }
}
