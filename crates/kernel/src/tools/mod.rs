//! Built-in tool capabilities (spec §4.4).

mod process_run;
mod repo_edit;
mod repo_patch;
mod repo_read;
mod repo_search;

pub use process_run::ProcessRunTool;
pub use repo_edit::RepoEditTool;
pub use repo_patch::RepoPatchTool;
pub use repo_read::RepoReadTool;
pub use repo_search::RepoSearchTool;

use std::sync::Arc;

use crate::registry::ToolKernel;

/// Registers all built-in tools onto `kernel`.
pub fn register_builtins(kernel: &ToolKernel) -> sa_domain::error::Result<()> {
    kernel.register(Arc::new(RepoReadTool))?;
    kernel.register(Arc::new(RepoPatchTool))?;
    kernel.register(Arc::new(RepoSearchTool))?;
    kernel.register(Arc::new(ProcessRunTool))?;
    kernel.register(Arc::new(RepoEditTool))?;
    Ok(())
}
