use crate::cli::output::Output;
use crate::cli::CommitAction;
use crate::errors::Result;
use crate::stack::StackManager;

use super::{finish, open_initialized, print_report};

/// Commit on the current branch, then restack every branch above it
pub fn run(action: CommitAction) -> Result<i32> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;
    let branch = manager.current_branch()?;

    let (report, outcome) = match action {
        CommitAction::Create { message, all } => manager.commit_create(&message, all)?,
        CommitAction::Amend { message, all } => manager.commit_amend(message.as_deref(), all)?,
    };

    print_report(&report);
    finish(
        &manager,
        outcome,
        &format!("Committed on {}", Output::branch(&branch)),
    )
}
