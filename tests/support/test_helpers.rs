//! Shared setup for integration tests: throwaway repositories driven through
//! the git binary, initialized with `main` as trunk.

use branchstack::config::{initialize_repo, RepoConfig};
use branchstack::git::GitRepository;
use branchstack::stack::StackManager;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

pub struct TestRepo {
    _dir: TempDir,
    pub path: PathBuf,
}

#[allow(dead_code)]
impl TestRepo {
    /// Repository with one commit on `main`, initialized for branchstack
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();
        let repo = Self { _dir: dir, path };

        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.name", "Test User"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "core.autocrlf", "false"],
            vec!["config", "commit.gpgsign", "false"],
        ] {
            repo.git(&args);
        }
        repo.commit("README.md", "# Test Repository\n", "Initial commit");

        let git_repo = repo.open();
        initialize_repo(&git_repo, Some("main".to_string())).unwrap();
        repo
    }

    pub fn open(&self) -> GitRepository {
        GitRepository::open(&self.path).unwrap()
    }

    pub fn config(&self) -> RepoConfig {
        branchstack::config::load_repo_config(&self.open()).unwrap()
    }

    /// Create `names` as a chain on top of the current branch, one commit
    /// each, leaving the last one checked out
    pub fn build_stack(&self, names: &[&str]) {
        let git_repo = self.open();
        let manager = StackManager::new(&git_repo).unwrap();
        for name in names {
            manager.create_branch(name).unwrap();
            self.commit(&format!("{name}.txt"), &format!("{name}\n"), &format!("Add {name}"));
        }
    }

    /// Run git, panicking with its stderr on failure
    pub fn git(&self, args: &[&str]) -> String {
        let output = self.try_git(args);
        if !output.status.success() {
            panic!(
                "git {} failed:\n{}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub fn try_git(&self, args: &[&str]) -> Output {
        Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()
            .expect("git should be installed")
    }

    /// Write a file, stage it, commit it, and return the new commit id
    pub fn commit(&self, file: &str, content: &str, message: &str) -> String {
        std::fs::write(self.path.join(file), content).unwrap();
        self.git(&["add", file]);
        self.git(&["commit", "-m", message]);
        self.head()
    }

    /// Like `commit`, with author and committer dates forced to `date`
    pub fn commit_dated(&self, file: &str, content: &str, message: &str, date: &str) -> String {
        std::fs::write(self.path.join(file), content).unwrap();
        self.git(&["add", file]);
        let output = Command::new("git")
            .args(["commit", "-m", message])
            .env("GIT_AUTHOR_DATE", date)
            .env("GIT_COMMITTER_DATE", date)
            .current_dir(&self.path)
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        self.head()
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
    }

    pub fn tip(&self, branch: &str) -> String {
        self.git(&["rev-parse", &format!("refs/heads/{branch}")])
    }

    pub fn checkout(&self, branch: &str) {
        self.git(&["checkout", "-q", branch]);
    }

    pub fn current_branch(&self) -> String {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// True when `ancestor` is reachable from `descendant`
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        self.try_git(&["merge-base", "--is-ancestor", ancestor, descendant])
            .status
            .success()
    }

    pub fn read(&self, file: &str) -> String {
        std::fs::read_to_string(self.path.join(file)).unwrap()
    }

    pub fn write(&self, file: &str, content: &str) {
        std::fs::write(self.path.join(file), content).unwrap();
    }

    pub fn git_dir(&self) -> PathBuf {
        self.path.join(".git")
    }

    /// Run the `bst` binary in this repository
    pub fn bst(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_bst"))
            .args(args)
            .arg("--no-color")
            .current_dir(&self.path)
            .output()
            .expect("bst binary should be built")
    }
}

/// Assert CLI command succeeds with helpful error messages
#[allow(dead_code)]
pub fn assert_cli_success(output: &Output, operation: &str) {
    if !output.status.success() {
        panic!(
            "{operation} failed:\nExit code: {}\nStderr: {}\nStdout: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr),
            String::from_utf8_lossy(&output.stdout)
        );
    }
}

/// Check if CLI command output contains expected content
#[allow(dead_code)]
pub fn assert_output_contains(output: &Output, expected: &str, context: &str) {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stderr.contains(expected) || stdout.contains(expected),
        "{context}: expected to find '{expected}' in output.\nStderr: {stderr}\nStdout: {stdout}"
    );
}
