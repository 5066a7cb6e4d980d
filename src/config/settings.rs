use crate::errors::{Result, StackError};
use crate::utils::atomic_file;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Per-repository settings consumed read-only by the branch graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepoConfig {
    /// Base branch every stack rests on
    pub trunk: String,
    /// Remote used by `sync --pull`
    pub remote: String,
    /// Branch-name regex patterns excluded from every traversal
    pub ignore_branches: Vec<String>,
    /// Longest branch name accepted by `create`
    pub max_branch_length: usize,
    /// Hide branches whose tip is older than trunk's tip minus this many days
    pub max_days_behind_trunk: Option<u32>,
    /// Cap on the number of branches listed by `log`
    pub max_stacks_behind_trunk: Option<usize>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            trunk: "main".to_string(),
            remote: "origin".to_string(),
            ignore_branches: Vec::new(),
            max_branch_length: 100,
            max_days_behind_trunk: None,
            max_stacks_behind_trunk: None,
        }
    }
}

impl RepoConfig {
    /// Load settings from a file; defaults when the file is missing
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| StackError::config(format!("Failed to read config file: {e}")))?;

        let config: RepoConfig = serde_json::from_str(&content)
            .map_err(|e| StackError::config(format!("Failed to parse config file: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save settings to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;
        atomic_file::write_json(path, self)
    }

    /// Update a configuration value by key
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "trunk" => self.trunk = value.to_string(),
            "remote" => self.remote = value.to_string(),
            "max_branch_length" => {
                self.max_branch_length = value
                    .parse()
                    .map_err(|_| StackError::config(format!("Invalid number: {value}")))?;
            }
            "max_days_behind_trunk" => {
                self.max_days_behind_trunk = parse_optional(value)?;
            }
            "max_stacks_behind_trunk" => {
                self.max_stacks_behind_trunk = parse_optional(value)?;
            }
            "ignore_branches" => {
                self.ignore_branches = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            _ => return Err(StackError::config(format!("Unknown config key: {key}"))),
        }

        self.validate()
    }

    /// Get a configuration value by key
    pub fn get_value(&self, key: &str) -> Result<String> {
        let value = match key {
            "trunk" => self.trunk.clone(),
            "remote" => self.remote.clone(),
            "max_branch_length" => self.max_branch_length.to_string(),
            "max_days_behind_trunk" => display_optional(self.max_days_behind_trunk),
            "max_stacks_behind_trunk" => display_optional(self.max_stacks_behind_trunk),
            "ignore_branches" => self.ignore_branches.join(","),
            _ => return Err(StackError::config(format!("Unknown config key: {key}"))),
        };
        Ok(value)
    }

    /// All keys with their current values, for `config list`
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        [
            "trunk",
            "remote",
            "ignore_branches",
            "max_branch_length",
            "max_days_behind_trunk",
            "max_stacks_behind_trunk",
        ]
        .into_iter()
        .filter_map(|key| self.get_value(key).ok().map(|value| (key, value)))
        .collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.trunk.trim().is_empty() {
            return Err(StackError::config("Trunk branch name cannot be empty"));
        }

        if self.max_branch_length == 0 {
            return Err(StackError::config("max_branch_length must be at least 1"));
        }

        for pattern in &self.ignore_branches {
            Regex::new(pattern).map_err(|e| {
                StackError::config(format!("Invalid ignore pattern '{pattern}': {e}"))
            })?;
        }

        Ok(())
    }

    pub fn add_ignore_pattern(&mut self, pattern: &str) -> Result<()> {
        if !self.ignore_branches.iter().any(|p| p == pattern) {
            self.ignore_branches.push(pattern.to_string());
        }
        self.validate()
    }

    pub fn remove_ignore_pattern(&mut self, pattern: &str) {
        self.ignore_branches.retain(|p| p != pattern);
    }

    /// Compile the ignore list once per command
    pub fn ignore_matcher(&self) -> Result<IgnoreMatcher> {
        let patterns = self
            .ignore_branches
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| StackError::config(format!("Invalid ignore pattern '{p}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(IgnoreMatcher { patterns })
    }

    pub fn is_ignored(&self, branch: &str) -> bool {
        self.ignore_matcher()
            .map(|m| m.is_ignored(branch))
            .unwrap_or(false)
    }
}

/// Compiled branch ignore patterns
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<Regex>,
}

impl IgnoreMatcher {
    pub fn is_ignored(&self, branch: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(branch))
    }
}

fn parse_optional<T: std::str::FromStr>(value: &str) -> Result<Option<T>> {
    if value.is_empty() || value == "none" {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| StackError::config(format!("Invalid number: {value}")))
}

fn display_optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "none".to_string())
}
