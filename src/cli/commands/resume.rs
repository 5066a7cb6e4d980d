use crate::cli::output::Output;
use crate::errors::Result;
use crate::stack::StackManager;

use super::{finish, open_initialized, print_conflict};

pub fn continue_operation(add_all: bool) -> Result<i32> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;

    let outcome = manager.continue_operation(add_all)?;
    finish(&manager, outcome, "Operation complete")
}

pub fn abort() -> Result<()> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;

    if manager.abort_operation()? {
        Output::success("Aborted; the stopped rebase and pending steps were discarded");
    } else {
        Output::info("Nothing to abort");
    }
    Ok(())
}

pub fn status() -> Result<()> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;

    let frames = manager.pending_frames()?;
    if frames.is_empty() && !repo.is_rebase_in_progress() {
        Output::info("No operation in progress");
        return Ok(());
    }
    print_conflict(&manager, &frames)
}
