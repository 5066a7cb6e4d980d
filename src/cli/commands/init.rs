use crate::cli::output::Output;
use crate::config::{initialize_repo, is_repo_initialized};
use crate::errors::{Result, StackError};
use crate::git::get_current_repository;

/// Initialize the current repository
pub fn run(trunk: Option<String>, force: bool) -> Result<()> {
    let repo = get_current_repository()?;
    tracing::debug!("Found Git repository at: {}", repo.path().display());

    if is_repo_initialized(&repo) && !force {
        return Err(StackError::precondition(
            "Repository is already initialized. Use --force to reinitialize.",
        ));
    }
    if force && is_repo_initialized(&repo) {
        tracing::warn!("Force reinitializing repository...");
    }

    if let Some(trunk) = &trunk {
        if !repo.branch_exists(trunk) {
            return Err(StackError::branch_not_found(trunk));
        }
    }

    let config = initialize_repo(&repo, trunk)?;
    Output::success(format!(
        "Initialized with trunk {}",
        Output::branch(&config.trunk)
    ));
    Output::next_steps(&[
        "Create a branch on top of the current one: bst create <name>",
        "Adopt an existing branch: bst track <branch> --parent <parent>",
    ]);
    Ok(())
}
