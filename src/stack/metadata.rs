use crate::errors::{Result, StackError};
use crate::git::GitRepository;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Namespace holding one metadata ref per branch
pub const METADATA_REF_PREFIX: &str = "refs/branch-metadata/";

/// Cached remote pull-request state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrState {
    Open,
    Merged,
    Closed,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PrState::Open => "OPEN",
            PrState::Merged => "MERGED",
            PrState::Closed => "CLOSED",
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for PrState {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => Ok(PrState::Open),
            "MERGED" => Ok(PrState::Merged),
            "CLOSED" => Ok(PrState::Closed),
            other => Err(StackError::validation(format!(
                "Unknown pull request state: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrInfo {
    pub number: u64,
    pub state: PrState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

impl PrInfo {
    pub fn is_closed_or_merged(&self) -> bool {
        matches!(self.state, PrState::Merged | PrState::Closed)
    }
}

/// Last title/body/reviewers used when submitting the branch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorSubmitInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewers: Option<Vec<String>>,
}

impl PriorSubmitInfo {
    /// Field-by-field merge; fields absent from `other` are kept
    pub fn merge(&mut self, other: PriorSubmitInfo) {
        if other.title.is_some() {
            self.title = other.title;
        }
        if other.body.is_some() {
            self.body = other.body;
        }
        if other.reviewers.is_some() {
            self.reviewers = other.reviewers;
        }
    }
}

/// Everything persisted about one branch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchMetadata {
    /// Declared parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_branch_name: Option<String>,
    /// Parent's tip when this branch was created or last restacked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_branch_revision: Option<String>,
    /// This branch's own tip before its most recent move. Children read it
    /// to find their fork point across the move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_submit_info: Option<PriorSubmitInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_info: Option<PrInfo>,
}

/// A partial update. `None` leaves a field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    pub parent_branch_name: Option<Option<String>>,
    pub parent_branch_revision: Option<Option<String>>,
    pub prev_ref: Option<Option<String>>,
    pub prior_submit_info: Option<PriorSubmitInfo>,
    pub pr_info: Option<Option<PrInfo>>,
}

impl MetadataPatch {
    pub fn parent(name: &str, revision: &str) -> Self {
        Self {
            parent_branch_name: Some(Some(name.to_string())),
            parent_branch_revision: Some(Some(revision.to_string())),
            ..Default::default()
        }
    }

    pub fn parent_name(name: &str) -> Self {
        Self {
            parent_branch_name: Some(Some(name.to_string())),
            ..Default::default()
        }
    }

    pub fn clear_parent() -> Self {
        Self {
            parent_branch_name: Some(None),
            ..Default::default()
        }
    }

    pub fn with_prev_ref(mut self, prev_ref: &str) -> Self {
        self.prev_ref = Some(Some(prev_ref.to_string()));
        self
    }

    fn apply(self, meta: &mut BranchMetadata) {
        if let Some(value) = self.parent_branch_name {
            meta.parent_branch_name = value;
        }
        if let Some(value) = self.parent_branch_revision {
            meta.parent_branch_revision = value;
        }
        if let Some(value) = self.prev_ref {
            meta.prev_ref = value;
        }
        if let Some(info) = self.prior_submit_info {
            meta.prior_submit_info
                .get_or_insert_with(PriorSubmitInfo::default)
                .merge(info);
        }
        if let Some(value) = self.pr_info {
            meta.pr_info = value;
        }
    }
}

/// Per-branch records kept as JSON blobs under `refs/branch-metadata/`.
///
/// Refs are local-only unless someone pushes them explicitly, so metadata
/// does not travel with normal push/pull. Each write is one ref update,
/// which git performs atomically.
pub struct MetadataStore<'a> {
    repo: &'a GitRepository,
}

impl<'a> MetadataStore<'a> {
    pub fn new(repo: &'a GitRepository) -> Self {
        Self { repo }
    }

    fn ref_name(branch: &str) -> String {
        format!("{METADATA_REF_PREFIX}{branch}")
    }

    /// Read a branch's record. Unreadable storage counts as absent.
    pub fn get(&self, branch: &str) -> Option<BranchMetadata> {
        let raw = self.repo.raw();
        let reference = raw.find_reference(&Self::ref_name(branch)).ok()?;

        let blob = match reference.peel_to_blob() {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Ignoring unreadable metadata for '{}': {}", branch, e);
                return None;
            }
        };

        match serde_json::from_slice(blob.content()) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!("Ignoring malformed metadata for '{}': {}", branch, e);
                None
            }
        }
    }

    /// Replace a branch's record wholesale
    pub fn put(&self, branch: &str, meta: &BranchMetadata) -> Result<()> {
        let raw = self.repo.raw();
        let content = serde_json::to_vec(meta)?;
        let blob = raw.blob(&content)?;
        raw.reference(
            &Self::ref_name(branch),
            blob,
            true,
            &format!("branchstack: update metadata for {branch}"),
        )?;

        debug!("Wrote metadata for '{}'", branch);
        Ok(())
    }

    /// Merge a partial update into the existing record
    pub fn upsert(&self, branch: &str, patch: MetadataPatch) -> Result<BranchMetadata> {
        self.update(branch, |meta| patch.apply(meta))
    }

    /// Read-merge-write with a closure
    pub fn update<F>(&self, branch: &str, mutate: F) -> Result<BranchMetadata>
    where
        F: FnOnce(&mut BranchMetadata),
    {
        let mut meta = self.get(branch).unwrap_or_default();
        mutate(&mut meta);
        self.put(branch, &meta)?;
        Ok(meta)
    }

    pub fn delete(&self, branch: &str) -> Result<()> {
        match self.repo.raw().find_reference(&Self::ref_name(branch)) {
            Ok(mut reference) => {
                reference.delete()?;
                debug!("Deleted metadata for '{}'", branch);
                Ok(())
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(()),
            Err(e) => Err(StackError::Git(e)),
        }
    }

    /// Move a record to a new name, preserving every field
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if let Some(meta) = self.get(old) {
            self.put(new, &meta)?;
        }
        self.delete(old)
    }

    /// Names of every branch that has a record, including deleted branches
    pub fn all_branch_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for reference in self.repo.raw().references()? {
            let reference = reference?;
            if let Some(name) = reference.name() {
                if let Some(branch) = name.strip_prefix(METADATA_REF_PREFIX) {
                    names.push(branch.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn parent_name(&self, branch: &str) -> Option<String> {
        self.get(branch).and_then(|m| m.parent_branch_name)
    }

    pub fn set_parent(&self, branch: &str, parent: &str, revision: &str) -> Result<()> {
        self.upsert(branch, MetadataPatch::parent(parent, revision))?;
        Ok(())
    }

    pub fn clear_parent(&self, branch: &str) -> Result<()> {
        self.upsert(branch, MetadataPatch::clear_parent())?;
        Ok(())
    }

    pub fn upsert_prior_submit_info(&self, branch: &str, info: PriorSubmitInfo) -> Result<()> {
        self.upsert(
            branch,
            MetadataPatch {
                prior_submit_info: Some(info),
                ..Default::default()
            },
        )?;
        Ok(())
    }

    pub fn pr_info(&self, branch: &str) -> Option<PrInfo> {
        self.get(branch).and_then(|m| m.pr_info)
    }

    pub fn set_pr_info(&self, branch: &str, info: Option<PrInfo>) -> Result<()> {
        self.upsert(
            branch,
            MetadataPatch {
                pr_info: Some(info),
                ..Default::default()
            },
        )?;
        Ok(())
    }

    /// True when the cached PR targets a different base than the declared parent
    pub fn pr_base_mismatch(&self, branch: &str) -> bool {
        let Some(meta) = self.get(branch) else {
            return false;
        };
        match (meta.pr_info.and_then(|pr| pr.base), meta.parent_branch_name) {
            (Some(base), Some(parent)) => base != parent,
            _ => false,
        }
    }
}
