//! Workspace lifecycle management
//!
//! Each trial runs in a disposable copy of the source project with a git
//! baseline, so change-set diffs are always well-defined and the source
//! tree is never mutated.

mod manager;

pub use manager::{CleanupPolicy, Workspace, WorkspaceConfig, WorkspaceError, WorkspaceManager};
