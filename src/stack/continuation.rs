//! Persisted continuation callstack.
//!
//! An operation that hits a rebase conflict returns `Outcome::Suspended`
//! with the frames describing what is left to do. The frames are written to
//! the repository's git dir and a later `continue` drains them in order.
//! Frames are stored in execution order: the first element runs next.

use crate::config;
use crate::errors::{Result, StackError};
use crate::stack::rebase::TodoItem;
use crate::utils::atomic_file;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A branch rebase that stopped on a conflict. Once git finishes it, the
/// branch's metadata is updated from these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InFlightRebase {
    pub branch: String,
    /// Parent the branch is being rebased onto
    pub parent: String,
    /// Parent's tip used as the new base
    pub parent_revision: String,
    /// The branch's own tip before the rebase
    pub prev_ref: String,
}

/// Re-parent `branch` onto `new_parent`, replaying only commits above `old_base`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchMove {
    pub branch: String,
    pub new_parent: String,
    pub old_base: String,
}

/// Interactive edit of one branch's own commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchEdit {
    pub branch: String,
    pub todo: Vec<TodoItem>,
}

/// One suspended step of a larger operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContinuationFrame {
    /// A branch was being moved onto a new parent; record the move, then
    /// restack everything above it
    StackOntoBaseRebase {
        #[serde(rename = "inFlight")]
        in_flight: InFlightRebase,
    },
    /// Finish the in-flight branch, then restack `remaining` in order
    RestackBranches {
        #[serde(rename = "inFlight", default, skip_serializing_if = "Option::is_none")]
        in_flight: Option<InFlightRebase>,
        remaining: Vec<String>,
    },
    /// Perform the pending child moves, then delete `branches`
    DeleteBranches {
        branches: Vec<String>,
        #[serde(rename = "pendingMoves", default)]
        pending_moves: Vec<BranchMove>,
    },
    /// Continue a repository sync. `None` roots means they are computed on
    /// resume, after merged branches were removed.
    RepoSync {
        #[serde(rename = "remainingRoots", default)]
        remaining_roots: Option<Vec<String>>,
    },
    /// Apply the remaining per-branch edits, then restack above `restack_root`
    StackEdit {
        #[serde(rename = "currentBranch")]
        current_branch: String,
        #[serde(rename = "remainingEdits")]
        remaining_edits: Vec<BranchEdit>,
        #[serde(rename = "restackRoot")]
        restack_root: String,
    },
}

impl ContinuationFrame {
    /// Tag as it appears on disk
    pub fn op(&self) -> &'static str {
        match self {
            ContinuationFrame::StackOntoBaseRebase { .. } => "STACK_ONTO_BASE_REBASE",
            ContinuationFrame::RestackBranches { .. } => "RESTACK_BRANCHES",
            ContinuationFrame::DeleteBranches { .. } => "DELETE_BRANCHES",
            ContinuationFrame::RepoSync { .. } => "REPO_SYNC",
            ContinuationFrame::StackEdit { .. } => "STACK_EDIT",
        }
    }

    /// Reject frames that parse but cannot be executed
    pub fn validate(&self) -> Result<()> {
        let malformed = |what: &str| {
            Err(StackError::continuation(format!(
                "{} frame {what}",
                self.op()
            )))
        };

        match self {
            ContinuationFrame::StackOntoBaseRebase { in_flight } => {
                if in_flight.branch.is_empty() || in_flight.parent.is_empty() {
                    return malformed("names no branch");
                }
            }
            ContinuationFrame::RestackBranches { in_flight, remaining } => {
                if in_flight.as_ref().is_some_and(|f| f.branch.is_empty())
                    || remaining.iter().any(|b| b.is_empty())
                {
                    return malformed("contains an empty branch name");
                }
            }
            ContinuationFrame::DeleteBranches { branches, .. } => {
                if branches.is_empty() {
                    return malformed("has no branches to delete");
                }
            }
            ContinuationFrame::RepoSync { .. } => {}
            ContinuationFrame::StackEdit {
                current_branch,
                restack_root,
                ..
            } => {
                if current_branch.is_empty() || restack_root.is_empty() {
                    return malformed("names no branch");
                }
            }
        }
        Ok(())
    }

    /// Short human description for status output
    pub fn describe(&self) -> String {
        match self {
            ContinuationFrame::StackOntoBaseRebase { in_flight } => {
                format!("move {} onto {}", in_flight.branch, in_flight.parent)
            }
            ContinuationFrame::RestackBranches {
                in_flight,
                remaining,
            } => {
                let mut names: Vec<&str> = in_flight.iter().map(|f| f.branch.as_str()).collect();
                names.extend(remaining.iter().map(|s| s.as_str()));
                format!("restack {}", names.join(", "))
            }
            ContinuationFrame::DeleteBranches { branches, .. } => {
                format!("delete {}", branches.join(", "))
            }
            ContinuationFrame::RepoSync { .. } => "sync repository".to_string(),
            ContinuationFrame::StackEdit { current_branch, .. } => {
                format!("edit stack at {current_branch}")
            }
        }
    }
}

/// What an orchestration step achieved
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Stopped on a conflict; the frames finish the job, first one first
    Suspended(Vec<ContinuationFrame>),
}

impl Outcome {
    pub fn is_suspended(&self) -> bool {
        matches!(self, Outcome::Suspended(_))
    }

    /// Add the caller's own continuation after the inner frames. A completed
    /// outcome stays completed; the caller just carries on.
    pub fn then(self, frame: ContinuationFrame) -> Outcome {
        match self {
            Outcome::Completed => Outcome::Completed,
            Outcome::Suspended(mut frames) => {
                frames.push(frame);
                Outcome::Suspended(frames)
            }
        }
    }
}

/// The on-disk callstack
pub struct Callstack {
    path: PathBuf,
}

impl Callstack {
    pub fn new(git_dir: &Path) -> Self {
        Self {
            path: config::state_dir(git_dir).join("continuation.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when a suspended operation is waiting for `continue`
    pub fn is_pending(&self) -> bool {
        self.path.exists()
    }

    /// Every frame in execution order
    pub fn peek_all(&self) -> Result<Vec<ContinuationFrame>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&self.path)
            .map_err(|e| StackError::config(format!("Failed to read continuation state: {e}")))?;
        let frames: Vec<ContinuationFrame> = serde_json::from_str(&json).map_err(|e| {
            StackError::continuation(format!("Unreadable continuation state: {e}"))
        })?;
        for frame in &frames {
            frame.validate()?;
        }
        Ok(frames)
    }

    /// Replace the stack; an empty list removes it
    pub fn save(&self, frames: &[ContinuationFrame]) -> Result<()> {
        if frames.is_empty() {
            return self.clear();
        }
        atomic_file::write_json(&self.path, &frames)?;
        debug!("Saved {} continuation frame(s) to {:?}", frames.len(), self.path);
        Ok(())
    }

    /// Make `frame` the next one to run
    pub fn push(&self, frame: ContinuationFrame) -> Result<()> {
        self.push_all(vec![frame])
    }

    /// Put `frames` ahead of whatever is already pending, keeping their order
    pub fn push_all(&self, mut frames: Vec<ContinuationFrame>) -> Result<()> {
        frames.extend(self.peek_all()?);
        self.save(&frames)
    }

    pub fn clear(&self) -> Result<()> {
        atomic_file::remove(&self.path)?;
        debug!("Cleared continuation state");
        Ok(())
    }

    /// Run pending frames front to back until empty or suspended again.
    ///
    /// The file is rewritten after every step. Frames returned by a
    /// suspended step go in front of those still pending. If a step fails
    /// the file keeps that step, so the operator can fix things and retry.
    pub fn drain<F>(&self, mut execute: F) -> Result<Outcome>
    where
        F: FnMut(ContinuationFrame) -> Result<Outcome>,
    {
        loop {
            let mut frames = self.peek_all()?;
            if frames.is_empty() {
                self.clear()?;
                return Ok(Outcome::Completed);
            }

            let frame = frames.remove(0);
            debug!("Resuming {}", frame.op());

            match execute(frame)? {
                Outcome::Completed => self.save(&frames)?,
                Outcome::Suspended(mut pushed) => {
                    pushed.extend(frames);
                    self.save(&pushed)?;
                    return Ok(Outcome::Suspended(pushed));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn restack(remaining: &[&str]) -> ContinuationFrame {
        ContinuationFrame::RestackBranches {
            in_flight: None,
            remaining: remaining.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_frame_wire_format() {
        let frame = ContinuationFrame::StackOntoBaseRebase {
            in_flight: InFlightRebase {
                branch: "b".to_string(),
                parent: "a".to_string(),
                parent_revision: "abc".to_string(),
                prev_ref: "def".to_string(),
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["op"], "STACK_ONTO_BASE_REBASE");
        assert_eq!(json["inFlight"]["parentRevision"], "abc");

        let back: ContinuationFrame = serde_json::from_value(json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_unknown_op_is_consistency_error() {
        let temp_dir = TempDir::new().unwrap();
        let callstack = Callstack::new(temp_dir.path());
        atomic_file::write_string(callstack.path(), r#"[{"op":"TELEPORT_BRANCHES"}]"#).unwrap();

        let err = callstack.peek_all().unwrap_err();
        assert!(matches!(err, StackError::ContinuationConsistency(_)));

        // Nothing was dropped
        assert!(callstack.is_pending());
        let err = callstack.drain(|_| Ok(Outcome::Completed)).unwrap_err();
        assert!(matches!(err, StackError::ContinuationConsistency(_)));
        assert!(callstack.is_pending());
    }

    #[test]
    fn test_malformed_frame_is_consistency_error() {
        let temp_dir = TempDir::new().unwrap();
        let callstack = Callstack::new(temp_dir.path());
        atomic_file::write_string(callstack.path(), r#"[{"op":"DELETE_BRANCHES","branches":[]}]"#)
            .unwrap();

        assert!(matches!(
            callstack.peek_all(),
            Err(StackError::ContinuationConsistency(_))
        ));
    }

    #[test]
    fn test_push_puts_frame_first() {
        let temp_dir = TempDir::new().unwrap();
        let callstack = Callstack::new(temp_dir.path());

        callstack.push(restack(&["outer"])).unwrap();
        callstack.push(restack(&["inner"])).unwrap();

        assert_eq!(
            callstack.peek_all().unwrap(),
            vec![restack(&["inner"]), restack(&["outer"])]
        );
    }

    #[test]
    fn test_drain_runs_in_order_and_clears() {
        let temp_dir = TempDir::new().unwrap();
        let callstack = Callstack::new(temp_dir.path());
        callstack
            .save(&[restack(&["a"]), restack(&["b"]), restack(&["c"])])
            .unwrap();

        let mut seen = Vec::new();
        let outcome = callstack
            .drain(|frame| {
                seen.push(frame);
                Ok(Outcome::Completed)
            })
            .unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(seen, vec![restack(&["a"]), restack(&["b"]), restack(&["c"])]);
        assert!(!callstack.is_pending());
    }

    #[test]
    fn test_drain_suspension_puts_new_frames_before_remaining() {
        let temp_dir = TempDir::new().unwrap();
        let callstack = Callstack::new(temp_dir.path());
        callstack.save(&[restack(&["a"]), restack(&["tail"])]).unwrap();

        let outcome = callstack
            .drain(|frame| {
                if frame == restack(&["a"]) {
                    Ok(Outcome::Suspended(vec![restack(&["a-retry"])]))
                } else {
                    Ok(Outcome::Completed)
                }
            })
            .unwrap();

        assert!(outcome.is_suspended());
        assert_eq!(
            callstack.peek_all().unwrap(),
            vec![restack(&["a-retry"]), restack(&["tail"])]
        );
    }

    #[test]
    fn test_drain_error_keeps_failing_frame() {
        let temp_dir = TempDir::new().unwrap();
        let callstack = Callstack::new(temp_dir.path());
        callstack.save(&[restack(&["a"]), restack(&["b"])]).unwrap();

        let result = callstack.drain(|frame| {
            if frame == restack(&["b"]) {
                Err(StackError::precondition("boom"))
            } else {
                Ok(Outcome::Completed)
            }
        });

        assert!(result.is_err());
        assert_eq!(callstack.peek_all().unwrap(), vec![restack(&["b"])]);
    }

    #[test]
    fn test_outcome_then_appends_outer_frame() {
        let inner = Outcome::Suspended(vec![restack(&["inner"])]);
        let outer = inner.then(restack(&["outer"]));
        assert_eq!(
            outer,
            Outcome::Suspended(vec![restack(&["inner"]), restack(&["outer"])])
        );
        assert_eq!(Outcome::Completed.then(restack(&["x"])), Outcome::Completed);
    }
}
