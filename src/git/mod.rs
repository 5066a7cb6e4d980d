pub mod repository;

pub use repository::{CommitSummary, GitRepository, OnError, RunOptions};

use crate::errors::{Result, StackError};
use std::path::{Path, PathBuf};

/// Check if a directory is inside a Git repository
pub fn is_git_repository(path: &Path) -> bool {
    git2::Repository::discover(path).is_ok()
}

/// Find the root of the Git repository
pub fn find_repository_root(start_path: &Path) -> Result<PathBuf> {
    let repo = git2::Repository::discover(start_path).map_err(StackError::Git)?;

    let workdir = repo
        .workdir()
        .ok_or_else(|| StackError::config("Repository has no working directory (bare repo?)"))?;

    Ok(workdir.to_path_buf())
}

/// Get the current working directory as a Git repository
pub fn get_current_repository() -> Result<GitRepository> {
    let current_dir = std::env::current_dir()
        .map_err(|e| StackError::config(format!("Could not get current directory: {e}")))?;

    let repo_root = find_repository_root(&current_dir)?;
    GitRepository::open(&repo_root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plain_directory_is_not_a_repository() {
        let tmp = TempDir::new().unwrap();
        assert!(!is_git_repository(tmp.path()));
        assert!(find_repository_root(tmp.path()).is_err());
    }

    #[test]
    fn test_find_root_from_subdirectory() {
        let tmp = TempDir::new().unwrap();
        git2::Repository::init(tmp.path()).unwrap();
        let nested = tmp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let root = find_repository_root(&nested).unwrap();
        assert_eq!(
            root.canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }
}
