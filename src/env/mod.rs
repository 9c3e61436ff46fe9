//! Environment value providers
//!
//! Trials may need injected environment values (feature flags, endpoints,
//! credentials for sandboxed services). A provider resolves them once per
//! trial from the trial context. Values only ever travel through call
//! signatures and the per-workspace `.env` file; the process environment
//! table is shared mutable state and is never touched, because trials run
//! concurrently.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::TrialContext;

/// Resolves environment values for one trial
#[async_trait]
pub trait EnvProvider: Send + Sync {
    /// Produce the environment values for the given trial
    async fn provide(&self, context: &TrialContext) -> eyre::Result<BTreeMap<String, String>>;
}

/// Provider backed by a static map, the same for every trial
#[derive(Debug, Clone, Default)]
pub struct StaticEnv {
    values: BTreeMap<String, String>,
}

impl StaticEnv {
    /// Create a provider from a fixed value map
    pub fn new(values: BTreeMap<String, String>) -> Self {
        debug!(count = values.len(), "StaticEnv::new: called");
        Self { values }
    }
}

#[async_trait]
impl EnvProvider for StaticEnv {
    async fn provide(&self, context: &TrialContext) -> eyre::Result<BTreeMap<String, String>> {
        debug!(trial_id = context.trial_id, "StaticEnv::provide: called");
        Ok(self.values.clone())
    }
}

/// Provider backed by a caller-supplied function of the trial context
///
/// Covers both "computed per trial" and "dynamic lookup" uses with one
/// contract instead of separate code paths.
pub struct FnEnv<F>
where
    F: Fn(&TrialContext) -> eyre::Result<BTreeMap<String, String>> + Send + Sync,
{
    f: F,
}

impl<F> FnEnv<F>
where
    F: Fn(&TrialContext) -> eyre::Result<BTreeMap<String, String>> + Send + Sync,
{
    /// Wrap a function as a provider
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> EnvProvider for FnEnv<F>
where
    F: Fn(&TrialContext) -> eyre::Result<BTreeMap<String, String>> + Send + Sync,
{
    async fn provide(&self, context: &TrialContext) -> eyre::Result<BTreeMap<String, String>> {
        debug!(trial_id = context.trial_id, "FnEnv::provide: called");
        (self.f)(context)
    }
}
