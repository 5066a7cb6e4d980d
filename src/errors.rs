/// Branchstack error types
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// Self-referential parents or unresolvable cycles in branch metadata
    #[error("Graph corruption: {0}")]
    GraphCorruption(String),

    /// Missing parent, missing branch, or an operation that cannot start
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Unknown or malformed continuation frame
    #[error("Continuation state is inconsistent: {0}")]
    ContinuationConsistency(String),

    /// Git-related errors
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// A git subprocess exited non-zero
    #[error("Command `git {command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl StackError {
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        StackError::GraphCorruption(msg.into())
    }

    pub fn precondition<S: Into<String>>(msg: S) -> Self {
        StackError::PreconditionFailed(msg.into())
    }

    pub fn continuation<S: Into<String>>(msg: S) -> Self {
        StackError::ContinuationConsistency(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        StackError::Config(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        StackError::Validation(msg.into())
    }

    pub fn branch_not_found(name: &str) -> Self {
        StackError::PreconditionFailed(format!("Cannot find branch named: ({name})."))
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
