use crate::errors::{Result, StackError};
use git2::{BranchType, Oid, Repository, RepositoryState};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// What to do when a git subprocess exits non-zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    /// Surface the failure as `StackError::CommandFailed`
    Throw,
    /// Return whatever stdout was produced; callers inspect repository state instead
    Ignore,
}

/// Options for a single git invocation
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub on_error: OnError,
    pub env: Vec<(String, String)>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            on_error: OnError::Throw,
            env: Vec::new(),
        }
    }
}

impl RunOptions {
    pub fn ignore_errors() -> Self {
        Self {
            on_error: OnError::Ignore,
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }
}

/// A single commit as shown to users
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub id: String,
    pub summary: String,
}

/// Wrapper around git2::Repository plus the git binary for porcelain operations
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
}

impl GitRepository {
    /// Open a Git repository at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .map_err(|e| StackError::config(format!("Not a git repository: {e}")))?;

        let workdir = repo
            .workdir()
            .ok_or_else(|| StackError::config("Repository has no working directory"))?
            .to_path_buf();

        Ok(Self {
            repo,
            path: workdir,
        })
    }

    /// Get repository work tree path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The repository's own storage directory (`.git` for normal checkouts)
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    pub(crate) fn raw(&self) -> &Repository {
        &self.repo
    }

    /// Run the git binary in the work tree and return trimmed stdout.
    pub fn run_git(&self, args: &[&str], options: RunOptions) -> Result<String> {
        debug!("git {}", args.join(" "));

        let mut command = Command::new("git");
        command.args(args).current_dir(&self.path);
        for (key, value) in &options.env {
            command.env(key, value);
        }

        let output = command.output().map_err(|e| StackError::CommandFailed {
            command: args.join(" "),
            stderr: e.to_string(),
        })?;

        if !output.status.success() && options.on_error == OnError::Throw {
            return Err(StackError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Current branch name, or None when HEAD is detached or unborn
    pub fn current_branch(&self) -> Result<Option<String>> {
        if self.repo.head_detached().unwrap_or(false) {
            return Ok(None);
        }

        match self.repo.head() {
            Ok(head) => Ok(head.shorthand().map(|s| s.to_string())),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(StackError::Git(e)),
        }
    }

    /// Check if a local branch exists
    pub fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    /// List local branch names. With `by_recency` the list is ordered by tip
    /// committer time, newest first; otherwise alphabetically.
    pub fn list_branches(&self, by_recency: bool) -> Result<Vec<String>> {
        let mut entries = Vec::new();
        for item in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = item?;
            let Some(name) = branch.name()?.map(|s| s.to_string()) else {
                continue;
            };
            let time = match branch.get().peel_to_commit() {
                Ok(commit) => {
                    let seconds = commit.committer().when().seconds();
                    seconds
                }
                Err(_) => 0,
            };
            entries.push((name, time));
        }

        if by_recency {
            entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        } else {
            entries.sort_by(|a, b| a.0.cmp(&b.0));
        }

        Ok(entries.into_iter().map(|(name, _)| name).collect())
    }

    /// Tip commit of a local branch
    pub fn branch_oid(&self, name: &str) -> Result<Oid> {
        let branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| StackError::branch_not_found(name))?;
        let commit = branch.get().peel_to_commit()?;
        Ok(commit.id())
    }

    /// Tip commit id of a local branch as hex
    pub fn branch_tip(&self, name: &str) -> Result<String> {
        Ok(self.branch_oid(name)?.to_string())
    }

    /// Every local branch with its tip, alphabetically
    pub fn branch_tips(&self) -> Result<Vec<(String, Oid)>> {
        let mut tips = Vec::new();
        for name in self.list_branches(false)? {
            tips.push((name.clone(), self.branch_oid(&name)?));
        }
        Ok(tips)
    }

    /// Resolve any revision (branch, sha, `HEAD~1`) to a commit id
    pub fn resolve(&self, rev: &str) -> Result<Oid> {
        let obj = self.repo.revparse_single(rev).map_err(|e| {
            StackError::precondition(format!("Could not resolve reference '{rev}': {e}"))
        })?;
        let commit = obj.peel_to_commit().map_err(|e| {
            StackError::precondition(format!("Reference '{rev}' does not point to a commit: {e}"))
        })?;
        Ok(commit.id())
    }

    /// Merge base of two revisions; None when the histories are unrelated
    pub fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>> {
        let a = self.resolve(a)?;
        let b = self.resolve(b)?;
        Ok(self.merge_base_oid(a, b)?.map(|oid| oid.to_string()))
    }

    pub fn merge_base_oid(&self, a: Oid, b: Oid) -> Result<Option<Oid>> {
        match self.repo.merge_base(a, b) {
            Ok(oid) => Ok(Some(oid)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(StackError::Git(e)),
        }
    }

    /// True when `ancestor` is reachable from `descendant` (or equal to it)
    pub fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self.repo.graph_descendant_of(descendant, ancestor)?)
    }

    pub fn commit_parents(&self, oid: Oid) -> Result<Vec<Oid>> {
        let commit = self.repo.find_commit(oid)?;
        Ok(commit.parent_ids().collect())
    }

    /// Committer time of a revision in unix seconds
    pub fn commit_time(&self, rev: &str) -> Result<i64> {
        let oid = self.resolve(rev)?;
        let commit = self.repo.find_commit(oid)?;
        let seconds = commit.committer().when().seconds();
        Ok(seconds)
    }

    /// Commits reachable from `tip` but not from `base`, newest first
    pub fn commits_between(&self, base: &str, tip: &str) -> Result<Vec<CommitSummary>> {
        let base = self.resolve(base)?;
        let tip = self.resolve(tip)?;

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(tip)?;
        revwalk.hide(base)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            commits.push(CommitSummary {
                id: oid.to_string(),
                summary: commit.summary().unwrap_or("").to_string(),
            });
        }
        Ok(commits)
    }

    /// Create a new branch pointing at `target`
    pub fn create_branch(&self, name: &str, target: &str) -> Result<()> {
        let oid = self.resolve(target)?;
        let commit = self.repo.find_commit(oid)?;
        self.repo.branch(name, &commit, false).map_err(|e| {
            StackError::validation(format!("Could not create branch '{name}': {e}"))
        })?;

        info!("Created branch '{}'", name);
        Ok(())
    }

    /// Delete a local branch, merged or not
    pub fn delete_branch(&self, name: &str) -> Result<()> {
        let mut branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| StackError::branch_not_found(name))?;

        branch.delete().map_err(|e| {
            StackError::validation(format!("Could not delete branch '{name}': {e}"))
        })?;

        info!("Deleted branch '{}'", name);
        Ok(())
    }

    /// Rename a local branch. HEAD follows the branch if it was checked out.
    pub fn rename_branch(&self, old: &str, new: &str) -> Result<()> {
        self.run_git(&["branch", "-m", old, new], RunOptions::default())?;
        info!("Renamed branch '{}' to '{}'", old, new);
        Ok(())
    }

    /// Switch to a branch
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        let branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| StackError::branch_not_found(name))?;

        let tree = branch.get().peel_to_tree()?;
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(tree.as_object(), Some(&mut checkout))
            .map_err(|e| {
                StackError::precondition(format!("Could not checkout branch '{name}': {e}"))
            })?;
        self.repo.set_head(&format!("refs/heads/{name}"))?;

        debug!("Switched to branch '{}'", name);
        Ok(())
    }

    /// Point HEAD at a branch that sits on the current commit. The index
    /// and work tree are left exactly as they are.
    pub fn attach_head(&self, name: &str) -> Result<()> {
        let head = self.repo.head()?.peel_to_commit()?.id();
        if self.branch_oid(name)? != head {
            return Err(StackError::precondition(format!(
                "Branch ({name}) is not on the current commit."
            )));
        }
        self.repo.set_head(&format!("refs/heads/{name}"))?;
        debug!("Attached HEAD to '{}'", name);
        Ok(())
    }

    /// Commit the index on the current branch, or rewrite its tip with
    /// `amend`. Without a message an amend keeps the old one.
    pub fn commit(&self, message: Option<&str>, amend: bool) -> Result<()> {
        let mut args = vec!["commit", "--quiet"];
        if amend {
            args.extend(["--amend", "--allow-empty"]);
        }
        match message {
            Some(message) => args.extend(["-m", message]),
            None if amend => args.push("--no-edit"),
            None => {
                return Err(StackError::validation("A commit message is required"));
            }
        }
        self.run_git(&args, RunOptions::default())?;
        Ok(())
    }

    /// True if tracked files have uncommitted modifications
    pub fn has_tracked_changes(&self) -> Result<bool> {
        let mut options = git2::StatusOptions::new();
        options.include_untracked(false).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut options))?;

        Ok(statuses.iter().any(|status| {
            status.status().intersects(
                git2::Status::INDEX_MODIFIED
                    | git2::Status::INDEX_NEW
                    | git2::Status::INDEX_DELETED
                    | git2::Status::INDEX_RENAMED
                    | git2::Status::WT_MODIFIED
                    | git2::Status::WT_DELETED
                    | git2::Status::WT_RENAMED
                    | git2::Status::CONFLICTED,
            )
        }))
    }

    /// True if tracked files differ between the index and the work tree
    pub fn has_unstaged_changes(&self) -> Result<bool> {
        let mut options = git2::StatusOptions::new();
        options.include_untracked(false).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut options))?;

        Ok(statuses.iter().any(|status| {
            status.status().intersects(
                git2::Status::WT_MODIFIED
                    | git2::Status::WT_DELETED
                    | git2::Status::WT_RENAMED
                    | git2::Status::WT_TYPECHANGE,
            )
        }))
    }

    /// Detect an unresolved rebase by repository state, never by exit code
    pub fn is_rebase_in_progress(&self) -> bool {
        let state_says_rebase = matches!(
            self.repo.state(),
            RepositoryState::Rebase
                | RepositoryState::RebaseInteractive
                | RepositoryState::RebaseMerge
                | RepositoryState::ApplyMailboxOrRebase
        );
        let git_dir = self.git_dir();
        state_says_rebase
            || git_dir.join("rebase-merge").exists()
            || git_dir.join("rebase-apply").exists()
    }

    /// Commit currently being replayed by a stopped rebase
    pub fn rebase_head(&self) -> Option<String> {
        self.repo
            .revparse_single("REBASE_HEAD")
            .ok()
            .map(|obj| obj.id().to_string())
    }

    /// Files with unresolved conflicts in the index
    pub fn conflicted_files(&self) -> Result<Vec<String>> {
        let mut index = self.repo.index()?;
        // The git binary may have rewritten the index behind libgit2's cache
        index.read(false)?;

        let mut conflicts = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
            if let Some(entry) = entry {
                if let Ok(path) = std::str::from_utf8(&entry.path) {
                    conflicts.push(path.to_string());
                }
            }
        }
        conflicts.sort();
        conflicts.dedup();
        Ok(conflicts)
    }

    /// Stage every change in the work tree
    pub fn stage_all(&self) -> Result<()> {
        self.run_git(&["add", "--all"], RunOptions::default())?;
        debug!("Staged all changes");
        Ok(())
    }

    /// Fast-forward a local branch from a remote
    pub fn pull_ff_only(&self, remote: &str, branch: &str) -> Result<()> {
        info!("Pulling {} from {}", branch, remote);
        self.run_git(&["pull", "--ff-only", remote, branch], RunOptions::default())?;
        Ok(())
    }
}
