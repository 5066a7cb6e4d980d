use crate::cli::output::Output;
use crate::errors::{Result, StackError};
use crate::stack::{parse_todo, BranchEdit, RestackScope, StackManager, SyncOptions};
use std::fs;
use std::path::PathBuf;

use super::{current_or, finish, open_initialized, print_report};

pub fn restack(branch: Option<String>, scope: RestackScope) -> Result<i32> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;
    let branch = current_or(&manager, branch)?;

    let (report, outcome) = manager.restack(&branch, scope)?;
    print_report(&report);
    finish(&manager, outcome, "Restack complete")
}

pub fn onto(branch: Option<String>, onto: &str) -> Result<i32> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;
    let branch = current_or(&manager, branch)?;

    let (report, outcome) = manager.move_onto(&branch, onto)?;
    print_report(&report);
    finish(
        &manager,
        outcome,
        &format!("Moved {} onto {}", Output::branch(&branch), Output::branch(&onto)),
    )
}

pub fn sync(pull: bool, delete_merged: bool) -> Result<i32> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;

    let (report, outcome) = manager.sync(SyncOptions {
        pull,
        delete_merged,
    })?;
    print_report(&report);
    finish(&manager, outcome, "Sync complete")
}

pub fn edit(branches: Vec<String>, todos: Vec<PathBuf>) -> Result<i32> {
    if branches.len() != todos.len() {
        return Err(StackError::validation(format!(
            "Got {} branches but {} todo files",
            branches.len(),
            todos.len()
        )));
    }

    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;

    let mut edits = Vec::with_capacity(branches.len());
    for (branch, path) in branches.into_iter().zip(todos) {
        let text = fs::read_to_string(&path)?;
        edits.push(BranchEdit {
            branch,
            todo: parse_todo(&text)?,
        });
    }

    Output::info(format!("Editing {} branch(es)", edits.len()));
    let outcome = manager.edit_stack(edits)?;
    finish(&manager, outcome, "Edit complete")
}
