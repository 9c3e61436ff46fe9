//! Domain types for the evaluation matrix
//!
//! Plain data flowing through the engine: prompt variants, trial specs and
//! results, and the final report. No behavior beyond construction helpers
//! and success evaluation lives here.

mod report;
mod trial;

pub use report::{AggregateScore, EvalReport, OVERALL_KEY};
pub use trial::{PromptVariant, ResourceUsage, ScoreResult, TrialContext, TrialResult, TrialSpec};
