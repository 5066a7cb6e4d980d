use crate::cli::output::Output;
use crate::errors::{Result, StackError};
use crate::stack::StackManager;

use super::{current_or, finish, open_initialized};

/// Create a branch; with a message, staged changes are committed onto it
pub fn create(name: &str, message: Option<String>, all: bool) -> Result<()> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;
    let parent = manager.current_branch()?;

    match message {
        Some(message) => manager.create_branch_with_commit(name, &message, all)?,
        None => {
            if all {
                Output::warning("--all has no effect without --message");
            }
            manager.create_branch(name)?;
        }
    }
    Output::success(format!("Created {}", Output::on_top_of(name, &parent)));
    Ok(())
}

pub fn track(branch: Option<String>, parent: &str) -> Result<()> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;
    let branch = current_or(&manager, branch)?;

    manager.track(&branch, parent)?;
    Output::success(format!("Tracking {}", Output::on_top_of(&branch, parent)));
    Ok(())
}

pub fn rename(branch: Option<String>, new_name: &str) -> Result<()> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;
    let old = current_or(&manager, branch)?;

    manager.rename_branch(&old, new_name)?;
    Output::success(format!(
        "Renamed {} to {}",
        Output::branch(&old),
        Output::branch(new_name)
    ));
    Ok(())
}

pub fn delete(branches: Vec<String>, force: bool, no_restack: bool) -> Result<i32> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;

    if no_restack {
        for branch in &branches {
            manager.delete_branch(branch, force)?;
            Output::success(format!("Deleted {}", Output::branch(&branch)));
        }
        return Ok(0);
    }

    if !force {
        for branch in &branches {
            if repo.branch_exists(branch) && !manager.is_merged(branch)? {
                return Err(StackError::precondition(format!(
                    "Branch ({branch}) is not merged into ({}). Use --force to delete it anyway.",
                    manager.config().trunk
                )));
            }
        }
    }

    let outcome = manager.delete_branches(&branches)?;
    finish(&manager, outcome, &format!("Deleted {}", branches.join(", ")))
}

pub fn up() -> Result<()> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;
    let child = manager.checkout_child()?;
    Output::success(format!("Checked out {}", Output::branch(&child)));
    Ok(())
}

pub fn down() -> Result<()> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;
    let parent = manager.checkout_parent()?;
    Output::success(format!("Checked out {}", Output::branch(&parent)));
    Ok(())
}
