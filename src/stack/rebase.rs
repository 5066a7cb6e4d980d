use crate::errors::{Result, StackError};
use crate::git::{GitRepository, RunOptions};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{debug, info};

/// Result of a single rebase attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseStatus {
    /// The rebase finished and no rebase is in progress
    Done,
    /// The repository is left mid-rebase waiting for conflict resolution
    Conflict,
}

/// One line of an interactive rebase todo list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoAction {
    Pick,
    Drop,
    Fixup,
    Squash,
}

impl TodoAction {
    fn keyword(self) -> &'static str {
        match self {
            TodoAction::Pick => "pick",
            TodoAction::Drop => "drop",
            TodoAction::Fixup => "fixup",
            TodoAction::Squash => "squash",
        }
    }
}

impl std::str::FromStr for TodoAction {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pick" | "p" => Ok(TodoAction::Pick),
            "drop" | "d" => Ok(TodoAction::Drop),
            "fixup" | "f" => Ok(TodoAction::Fixup),
            "squash" | "s" => Ok(TodoAction::Squash),
            other => Err(StackError::validation(format!("Unknown todo action: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub action: TodoAction,
    pub commit: String,
}

impl TodoItem {
    pub fn new(action: TodoAction, commit: impl Into<String>) -> Self {
        Self {
            action,
            commit: commit.into(),
        }
    }
}

/// Parse `<action> <commit> [summary...]` lines; blank lines and `#` comments are skipped
pub fn parse_todo(text: &str) -> Result<Vec<TodoItem>> {
    let mut items = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(action), Some(commit)) = (parts.next(), parts.next()) else {
            return Err(StackError::validation(format!("Malformed todo line: {line}")));
        };
        items.push(TodoItem::new(action.parse()?, commit));
    }
    Ok(items)
}

/// Runs single-branch rebases and reports whether they left a conflict.
///
/// Conflict detection looks at the repository's rebase state after the
/// attempt. The exit code alone is not trusted: git also exits non-zero for
/// failures that never start a rebase.
pub struct RebaseEngine<'a> {
    repo: &'a GitRepository,
}

impl<'a> RebaseEngine<'a> {
    pub fn new(repo: &'a GitRepository) -> Self {
        Self { repo }
    }

    pub fn is_in_progress(&self) -> bool {
        self.repo.is_rebase_in_progress()
    }

    fn settle(&self, attempt: Result<String>) -> Result<RebaseStatus> {
        match attempt {
            _ if self.is_in_progress() => Ok(RebaseStatus::Conflict),
            Ok(_) => Ok(RebaseStatus::Done),
            Err(e) => Err(e),
        }
    }

    /// Replay the commits of `branch` since `old_base` onto `new_base`
    pub fn rebase_onto(&self, branch: &str, old_base: &str, new_base: &str) -> Result<RebaseStatus> {
        info!("Rebasing {} onto {}", branch, short(new_base));
        debug!("git rebase --onto {} {} {}", new_base, old_base, branch);

        let attempt = self.repo.run_git(
            &["rebase", "--onto", new_base, old_base, branch],
            RunOptions::default().with_env("GIT_EDITOR", "true"),
        );
        self.settle(attempt)
    }

    /// Continue a stopped rebase. Nothing to continue is not an error.
    pub fn rebase_continue(&self) -> Result<RebaseStatus> {
        if !self.is_in_progress() {
            debug!("No rebase in progress; nothing to continue");
            return Ok(RebaseStatus::Done);
        }

        let attempt = self.repo.run_git(
            &["rebase", "--continue"],
            RunOptions::default().with_env("GIT_EDITOR", "true"),
        );
        self.settle(attempt)
    }

    /// Discard a stopped rebase, restoring the branch to its pre-rebase tip
    pub fn rebase_abort(&self) -> Result<()> {
        if !self.is_in_progress() {
            return Ok(());
        }
        self.repo.run_git(&["rebase", "--abort"], RunOptions::default())?;
        info!("Aborted rebase");
        Ok(())
    }

    /// Rewrite the commits of `branch` above `base` following `todo`.
    ///
    /// The todo list replaces the one git generates, so it must name the
    /// commits oldest first. A list that starts with fixup or squash has
    /// nothing to fold into and is rejected.
    pub fn rebase_interactive(&self, branch: &str, base: &str, todo: &[TodoItem]) -> Result<RebaseStatus> {
        if let Some(first) = todo.iter().find(|item| item.action != TodoAction::Drop) {
            if matches!(first.action, TodoAction::Fixup | TodoAction::Squash) {
                return Err(StackError::validation(
                    "The first kept commit cannot be a fixup or squash",
                ));
            }
        }

        let mut todo_file = tempfile::NamedTempFile::new()?;
        for item in todo {
            writeln!(todo_file, "{} {}", item.action.keyword(), item.commit)?;
        }
        todo_file.flush()?;

        let todo_path = todo_file.path().to_string_lossy().replace('\'', "'\\''");
        info!("Editing {} ({} commits)", branch, todo.len());

        let attempt = self.repo.run_git(
            &["rebase", "-i", base, branch],
            RunOptions::default()
                .with_env("GIT_SEQUENCE_EDITOR", format!("cp '{todo_path}'"))
                .with_env("GIT_EDITOR", "true"),
        );
        self.settle(attempt)
    }
}

fn short(rev: &str) -> &str {
    if rev.len() > 8 && rev.chars().all(|c| c.is_ascii_hexdigit()) {
        &rev[..8]
    } else {
        rev
    }
}
