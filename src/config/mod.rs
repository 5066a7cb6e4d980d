pub mod settings;

pub use settings::{IgnoreMatcher, RepoConfig};

use crate::errors::Result;
use crate::git::GitRepository;
use std::path::{Path, PathBuf};

/// Directory inside the repository's git dir that holds branchstack state
pub fn state_dir(git_dir: &Path) -> PathBuf {
    git_dir.join("branchstack")
}

pub fn config_path(git_dir: &Path) -> PathBuf {
    state_dir(git_dir).join("config.json")
}

/// Check if a repository has been initialized
pub fn is_repo_initialized(repo: &GitRepository) -> bool {
    config_path(repo.git_dir()).exists()
}

/// Load the repository configuration, falling back to defaults
pub fn load_repo_config(repo: &GitRepository) -> Result<RepoConfig> {
    RepoConfig::load_from_file(&config_path(repo.git_dir()))
}

pub fn save_repo_config(repo: &GitRepository, config: &RepoConfig) -> Result<()> {
    config.save_to_file(&config_path(repo.git_dir()))
}

/// Initialize a repository, inferring trunk when none is given
pub fn initialize_repo(repo: &GitRepository, trunk: Option<String>) -> Result<RepoConfig> {
    let mut config = load_repo_config(repo)?;
    config.trunk = match trunk {
        Some(trunk) => trunk,
        None if repo.branch_exists("main") => "main".to_string(),
        None if repo.branch_exists("master") => "master".to_string(),
        None => repo
            .current_branch()?
            .unwrap_or_else(|| config.trunk.clone()),
    };
    save_repo_config(repo, &config)?;

    tracing::info!(
        "Initialized branchstack at {} with trunk '{}'",
        repo.path().display(),
        config.trunk
    );
    Ok(config)
}
