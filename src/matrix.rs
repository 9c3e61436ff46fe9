//! Task matrix generation
//!
//! Expands `(prompt variants x iterations)` into an ordered list of trial
//! specifications. Trial ids are assigned here, in variant-major,
//! iteration-minor order, and never depend on how the scheduler later
//! executes the trials; the final report is sorted by these ids.

use tracing::debug;

use crate::config::ConfigError;
use crate::domain::{PromptVariant, TrialContext, TrialSpec};

/// Expand variants and iterations into trial specs
///
/// Guarantees `variants.len() * iterations` specs with trial ids forming
/// the contiguous range `[0, n)` with no duplicates or gaps.
pub fn generate(variants: &[PromptVariant], iterations: u32) -> Result<Vec<TrialSpec>, ConfigError> {
    debug!(variant_count = variants.len(), iterations, "matrix::generate: called");

    if variants.is_empty() {
        return Err(ConfigError::NoPromptVariants);
    }
    if iterations < 1 {
        return Err(ConfigError::ZeroIterations);
    }

    let mut specs = Vec::with_capacity(variants.len() * iterations as usize);
    let mut trial_id = 0usize;

    for variant in variants {
        for iteration in 0..iterations {
            specs.push(TrialSpec {
                trial_id,
                prompt_id: variant.id.clone(),
                prompt_text: variant.text.clone(),
                env_context: TrialContext {
                    trial_id,
                    prompt_id: variant.id.clone(),
                    iteration,
                },
            });
            trial_id += 1;
        }
    }

    debug!(count = specs.len(), "matrix::generate: specs generated");
    Ok(specs)
}
