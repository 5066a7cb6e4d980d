use crate::errors::{Result, StackError};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Atomic file operations so a reader never observes a half-written file
pub mod atomic_file {
    use super::*;

    /// Write JSON data to a file atomically using a temporary file + rename strategy
    pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| StackError::config(format!("Failed to serialize data: {e}")))?;

        write_string(path, &content)
    }

    /// Write string content to a file atomically using a temporary file + rename strategy
    pub fn write_string(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    StackError::config(format!("Failed to create directory {}: {e}", parent.display()))
                })?;
            }
        }

        // Create temporary file in the same directory as the target
        let temp_path = path.with_extension("tmp");

        fs::write(&temp_path, content)
            .map_err(|e| StackError::config(format!("Failed to write temporary file: {e}")))?;

        atomic_rename(&temp_path, path)
    }

    /// Remove a file if present; a missing file is not an error
    pub fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StackError::config(format!(
                "Failed to remove {}: {e}",
                path.display()
            ))),
        }
    }

    #[cfg(windows)]
    fn atomic_rename(temp_path: &Path, final_path: &Path) -> Result<()> {
        const MAX_RETRIES: u32 = 3;
        const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

        let mut attempt = 1;
        loop {
            match fs::rename(temp_path, final_path) {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= MAX_RETRIES => {
                    let _ = fs::remove_file(temp_path);
                    return Err(StackError::config(format!(
                        "Failed to finalize file write after {MAX_RETRIES} attempts on Windows: {e}"
                    )));
                }
                Err(_) => {
                    attempt += 1;
                    std::thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    #[cfg(not(windows))]
    fn atomic_rename(temp_path: &Path, final_path: &Path) -> Result<()> {
        fs::rename(temp_path, final_path)
            .map_err(|e| StackError::config(format!("Failed to finalize file write: {e}")))?;
        Ok(())
    }
}

/// Join a list of branch names for messages
pub fn format_branch_list(branches: &[String]) -> String {
    branches
        .iter()
        .map(|b| format!("({b})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Short relative age of a unix timestamp, e.g. "3h ago"
pub fn format_age(seconds: i64, now: DateTime<Utc>) -> String {
    let Some(then) = Utc.timestamp_opt(seconds, 0).single() else {
        return "unknown".to_string();
    };
    let age = now.signed_duration_since(then);

    if age.num_seconds() < 60 {
        "just now".to_string()
    } else if age.num_minutes() < 60 {
        format!("{}m ago", age.num_minutes())
    } else if age.num_hours() < 24 {
        format!("{}h ago", age.num_hours())
    } else if age.num_days() < 60 {
        format!("{}d ago", age.num_days())
    } else {
        then.format("%Y-%m-%d").to_string()
    }
}
