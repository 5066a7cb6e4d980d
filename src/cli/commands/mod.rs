pub mod branch;
pub mod commit;
pub mod config;
pub mod init;
pub mod log;
pub mod pr;
pub mod restack;
pub mod resume;

use crate::cli::output::Output;
use crate::config::is_repo_initialized;
use crate::errors::{Result, StackError};
use crate::git::{get_current_repository, GitRepository};
use crate::stack::{ContinuationFrame, Outcome, RestackReport, StackManager};

/// Open the current repository, requiring `bst init` to have run
pub(crate) fn open_initialized() -> Result<GitRepository> {
    let repo = get_current_repository()?;
    if !is_repo_initialized(&repo) {
        return Err(StackError::config(
            "Repository is not initialized. Run 'bst init' first.",
        ));
    }
    Ok(repo)
}

pub(crate) fn current_or(manager: &StackManager<'_>, branch: Option<String>) -> Result<String> {
    match branch {
        Some(branch) => Ok(branch),
        None => manager.current_branch(),
    }
}

pub(crate) fn print_report(report: &RestackReport) {
    for branch in &report.rebased {
        Output::restacked(branch);
    }
    if !report.skipped.is_empty() {
        tracing::debug!("Already up to date: {}", report.skipped.join(", "));
    }
}

/// Print the result of a suspendable command and map it to an exit code
pub(crate) fn finish(manager: &StackManager<'_>, outcome: Outcome, done: &str) -> Result<i32> {
    match outcome {
        Outcome::Completed => {
            Output::success(done);
            Ok(0)
        }
        Outcome::Suspended(frames) => {
            print_conflict(manager, &frames)?;
            Ok(1)
        }
    }
}

/// Explain a stopped operation: what conflicted, what is left, how to go on
pub(crate) fn print_conflict(manager: &StackManager<'_>, frames: &[ContinuationFrame]) -> Result<()> {
    let repo = manager.repo();

    let stopped_on = frames.iter().find_map(|frame| match frame {
        ContinuationFrame::StackOntoBaseRebase { in_flight } => Some(in_flight.clone()),
        ContinuationFrame::RestackBranches {
            in_flight: Some(in_flight),
            ..
        } => Some(in_flight.clone()),
        _ => None,
    });

    match stopped_on {
        Some(in_flight) => Output::conflict(&in_flight.branch, &in_flight.parent),
        None => Output::error("Hit a conflict"),
    }
    if let Some(commit) = repo.rebase_head() {
        Output::sub_item(format!("Stopped while replaying {}", &commit[..commit.len().min(8)]));
    }

    let conflicted = repo.conflicted_files()?;
    if !conflicted.is_empty() {
        Output::section("Conflicted files");
        for file in &conflicted {
            Output::conflicted_file(file);
        }
    }

    Output::section("Still to do");
    for frame in frames {
        Output::pending_step(frame.describe());
    }

    Output::next_steps(&[
        "Resolve the conflicts and stage them with 'git add'",
        "Run 'bst continue' to carry on",
        "Or run 'bst abort' to give up on this operation",
    ]);
    Ok(())
}
