use crate::cli::output::Output;
use crate::cli::ConfigAction;
use crate::config::{load_repo_config, save_repo_config};
use crate::errors::Result;
use console::style;

use super::open_initialized;

/// Handle configuration commands
pub fn run(action: ConfigAction) -> Result<()> {
    let repo = open_initialized()?;
    let mut config = load_repo_config(&repo)?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set_value(&key, &value)?;
            config.validate()?;
            save_repo_config(&repo, &config)?;
            Output::success(format!("Configuration updated: {key} = {value}"));
        }
        ConfigAction::Get { key } => {
            println!("{}", config.get_value(&key)?);
        }
        ConfigAction::List => {
            for (key, value) in config.entries() {
                println!("{} = {}", style(key).bold(), value);
            }
        }
        ConfigAction::Ignore { pattern } => {
            config.add_ignore_pattern(&pattern)?;
            save_repo_config(&repo, &config)?;
            Output::success(format!("Ignoring branches matching {pattern}"));
        }
        ConfigAction::Unignore { pattern } => {
            config.remove_ignore_pattern(&pattern);
            save_repo_config(&repo, &config)?;
            Output::success(format!("No longer ignoring {pattern}"));
        }
    }
    Ok(())
}
