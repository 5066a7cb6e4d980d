//! Branch graph: declared (metadata) and inferred (commit ancestry) parentage,
//! plus the traversals built on them.
//!
//! The two views are independent queries over the same branch name. Where
//! they must agree (stack paths), `validate_stack` compares them explicitly.

use crate::config::{IgnoreMatcher, RepoConfig};
use crate::errors::{Result, StackError};
use crate::git::GitRepository;
use crate::stack::metadata::{MetadataPatch, MetadataStore};
use chrono::{DateTime, Duration, TimeZone, Utc};
use git2::Oid;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Options for `all_branches`
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Stop at the first branch whose tip is older than trunk's tip minus N days
    pub max_days_behind_trunk: Option<u32>,
    /// Return at most this many branches
    pub max_branches: Option<usize>,
}

/// Lookup tables cached for one command.
///
/// Only valid while the commit graph does not change. A command that
/// rebases, creates, or deletes branches must build a fresh graph
/// afterwards instead of reusing one carrying a memo.
#[derive(Debug, Default)]
pub struct GraphMemo {
    branch_names: Option<Vec<String>>,
    meta_children: Option<HashMap<String, Vec<String>>>,
    tips_by_commit: Option<HashMap<Oid, Vec<String>>>,
    ancestry_parents: HashMap<String, Vec<String>>,
}

pub struct BranchGraph<'a> {
    repo: &'a GitRepository,
    store: MetadataStore<'a>,
    trunk: String,
    ignore: IgnoreMatcher,
    default_list: ListOptions,
    memo: Option<RefCell<GraphMemo>>,
}

impl<'a> BranchGraph<'a> {
    pub fn new(repo: &'a GitRepository, config: &RepoConfig) -> Result<Self> {
        Ok(Self {
            repo,
            store: MetadataStore::new(repo),
            trunk: config.trunk.clone(),
            ignore: config.ignore_matcher()?,
            default_list: ListOptions {
                max_days_behind_trunk: config.max_days_behind_trunk,
                max_branches: config.max_stacks_behind_trunk,
            },
            memo: None,
        })
    }

    /// A graph that caches traversal tables. See `GraphMemo` for the
    /// condition under which this is sound.
    pub fn with_memo(repo: &'a GitRepository, config: &RepoConfig) -> Result<Self> {
        let mut graph = Self::new(repo, config)?;
        graph.memo = Some(RefCell::new(GraphMemo::default()));
        Ok(graph)
    }

    pub fn trunk(&self) -> &str {
        &self.trunk
    }

    pub fn is_trunk(&self, branch: &str) -> bool {
        branch == self.trunk
    }

    pub fn repo(&self) -> &'a GitRepository {
        self.repo
    }

    pub fn store(&self) -> &MetadataStore<'a> {
        &self.store
    }

    pub fn is_ignored(&self, branch: &str) -> bool {
        self.ignore.is_ignored(branch)
    }

    pub fn default_list_options(&self) -> ListOptions {
        self.default_list
    }

    fn invalidate_meta_children(&self) {
        if let Some(memo) = &self.memo {
            memo.borrow_mut().meta_children = None;
        }
    }

    /// Every existing, non-ignored branch, alphabetically
    pub fn branch_names(&self) -> Result<Vec<String>> {
        if let Some(memo) = &self.memo {
            if let Some(names) = &memo.borrow().branch_names {
                return Ok(names.clone());
            }
        }

        let names: Vec<String> = self
            .repo
            .list_branches(false)?
            .into_iter()
            .filter(|name| !self.is_ignored(name))
            .collect();

        if let Some(memo) = &self.memo {
            memo.borrow_mut().branch_names = Some(names.clone());
        }
        Ok(names)
    }

    /// Filtered branch listing honoring the recency cutoff and result cap.
    ///
    /// With a cutoff the candidates are walked newest first, so the first
    /// branch older than the cutoff ends the scan.
    pub fn all_branches<F>(&self, filter: F, opts: ListOptions) -> Result<Vec<String>>
    where
        F: Fn(&str) -> bool,
    {
        let by_recency = opts.max_days_behind_trunk.is_some();
        let candidates: Vec<String> = self
            .repo
            .list_branches(by_recency)?
            .into_iter()
            .filter(|name| !self.is_ignored(name))
            .collect();

        let cutoff: Option<DateTime<Utc>> = match opts.max_days_behind_trunk {
            Some(days) => {
                let trunk_time = self.repo.commit_time(&self.trunk)?;
                let trunk_time = Utc
                    .timestamp_opt(trunk_time, 0)
                    .single()
                    .ok_or_else(|| StackError::validation("Trunk commit time out of range"))?;
                Some(trunk_time - Duration::days(i64::from(days)))
            }
            None => None,
        };

        let mut result = Vec::new();
        for name in candidates {
            if opts.max_branches == Some(result.len()) {
                break;
            }
            if let Some(cutoff) = cutoff {
                let committed = self.repo.commit_time(&name)?;
                if committed < cutoff.timestamp() {
                    debug!("Stopping branch scan at '{}': older than cutoff", name);
                    break;
                }
            }
            if filter(&name) {
                result.push(name);
            }
        }
        Ok(result)
    }

    /// Declared parent, repaired in place when the chain is broken.
    ///
    /// A parent that no longer exists is skipped by walking its own declared
    /// parents until an existing branch is found, and the record is rewritten
    /// to point there. If the chain dies out the parent is cleared. A parent
    /// chain that leads back to `branch` is cleared and reported as corruption.
    pub fn parent_from_meta(&self, branch: &str) -> Result<Option<String>> {
        if self.is_trunk(branch) {
            return Ok(None);
        }

        let Some(declared) = self.store.parent_name(branch) else {
            return Ok(None);
        };

        if declared == branch {
            self.store.clear_parent(branch)?;
            self.invalidate_meta_children();
            return Err(StackError::corruption(format!(
                "Branch ({branch}) has itself listed as a parent in the meta. Deleted ({branch}) parent metadata."
            )));
        }

        if self.repo.branch_exists(&declared) {
            return Ok(Some(declared));
        }

        let mut visited: HashSet<String> = HashSet::from([branch.to_string(), declared.clone()]);
        let mut cursor = self.store.parent_name(&declared);

        loop {
            match cursor {
                None => {
                    debug!(
                        "Parent chain of '{}' never reaches an existing branch; clearing",
                        branch
                    );
                    self.store.clear_parent(branch)?;
                    self.invalidate_meta_children();
                    return Ok(None);
                }
                Some(name) if !visited.insert(name.clone()) => {
                    self.store.clear_parent(branch)?;
                    self.invalidate_meta_children();
                    return Err(StackError::corruption(format!(
                        "Parent chain of ({branch}) loops through ({name}). Deleted ({branch}) parent metadata."
                    )));
                }
                Some(name) if self.repo.branch_exists(&name) => {
                    debug!(
                        "Re-pointing '{}' past deleted parent '{}' to '{}'",
                        branch, declared, name
                    );
                    self.store.upsert(branch, MetadataPatch::parent_name(&name))?;
                    self.invalidate_meta_children();
                    return Ok(Some(name));
                }
                Some(name) => {
                    cursor = self.store.parent_name(&name);
                }
            }
        }
    }

    /// Branches whose declared parent is `branch`, by name
    pub fn children_from_meta(&self, branch: &str) -> Result<Vec<String>> {
        if let Some(memo) = &self.memo {
            if let Some(table) = &memo.borrow().meta_children {
                return Ok(table.get(branch).cloned().unwrap_or_default());
            }
        }

        let table = self.build_meta_children()?;
        let children = table.get(branch).cloned().unwrap_or_default();

        if let Some(memo) = &self.memo {
            memo.borrow_mut().meta_children = Some(table);
        }
        Ok(children)
    }

    fn build_meta_children(&self) -> Result<HashMap<String, Vec<String>>> {
        let mut table: HashMap<String, Vec<String>> = HashMap::new();
        for name in self.branch_names()? {
            let parent = match self.parent_from_meta(&name) {
                Ok(parent) => parent,
                Err(StackError::GraphCorruption(msg)) => {
                    warn!("{}", msg);
                    None
                }
                Err(e) => return Err(e),
            };
            if let Some(parent) = parent {
                table.entry(parent).or_default().push(name);
            }
        }
        for children in table.values_mut() {
            children.sort();
        }
        Ok(table)
    }

    fn tips_by_commit(&self) -> Result<HashMap<Oid, Vec<String>>> {
        if let Some(memo) = &self.memo {
            if let Some(tips) = &memo.borrow().tips_by_commit {
                return Ok(tips.clone());
            }
        }

        let mut tips: HashMap<Oid, Vec<String>> = HashMap::new();
        for (name, oid) in self.repo.branch_tips()? {
            if !self.is_ignored(&name) {
                tips.entry(oid).or_default().push(name);
            }
        }

        if let Some(memo) = &self.memo {
            memo.borrow_mut().tips_by_commit = Some(tips.clone());
        }
        Ok(tips)
    }

    /// Parents implied by the commit graph.
    ///
    /// A branch on trunk's tip has trunk as its only parent. Otherwise this
    /// walks back from the branch tip and stops at the first commit that is
    /// either on trunk's history (attributed to trunk) or the tip of another
    /// branch. Each commit is visited once; when several branches share a
    /// tip the commit is attributed to the first of them by name.
    pub fn parents_from_ancestry(&self, branch: &str) -> Result<Vec<String>> {
        if self.is_trunk(branch) {
            return Ok(Vec::new());
        }

        if let Some(memo) = &self.memo {
            if let Some(parents) = memo.borrow().ancestry_parents.get(branch) {
                return Ok(parents.clone());
            }
        }

        let tip = self.repo.branch_oid(branch)?;
        let trunk_tip = self.repo.branch_oid(&self.trunk)?;

        let parents = if tip == trunk_tip {
            vec![self.trunk.clone()]
        } else {
            let tips = self.tips_by_commit()?;
            let mut found: BTreeSet<String> = BTreeSet::new();
            let mut visited: HashSet<Oid> = HashSet::new();
            let mut queue: VecDeque<Oid> = self.repo.commit_parents(tip)?.into();

            while let Some(commit) = queue.pop_front() {
                if !visited.insert(commit) {
                    continue;
                }
                if self.repo.is_ancestor(commit, trunk_tip)? {
                    found.insert(self.trunk.clone());
                    continue;
                }
                if let Some(names) = tips.get(&commit) {
                    let owner = names
                        .iter()
                        .filter(|name| name.as_str() != branch)
                        .min();
                    if let Some(owner) = owner {
                        found.insert(owner.clone());
                        continue;
                    }
                }
                queue.extend(self.repo.commit_parents(commit)?);
            }
            found.into_iter().collect()
        };

        if let Some(memo) = &self.memo {
            memo.borrow_mut()
                .ancestry_parents
                .insert(branch.to_string(), parents.clone());
        }
        Ok(parents)
    }

    /// Branches whose ancestry-derived parents include `branch`, by name
    pub fn children_from_ancestry(&self, branch: &str) -> Result<Vec<String>> {
        let mut children = Vec::new();
        for name in self.branch_names()? {
            if name == branch || self.is_trunk(&name) {
                continue;
            }
            if self.parents_from_ancestry(&name)?.iter().any(|p| p == branch) {
                children.push(name);
            }
        }
        Ok(children)
    }

    /// Trunk-exclusive path to `branch` following declared parents
    pub fn stack_by_meta(&self, branch: &str) -> Result<Vec<String>> {
        self.trace_stack(branch, |name| self.parent_from_meta(name), true)
    }

    /// Trunk-exclusive path to `branch` following ancestry, stopping where
    /// the ancestry parent is ambiguous or missing
    pub fn stack_by_ancestry(&self, branch: &str) -> Result<Vec<String>> {
        self.trace_stack(
            branch,
            |name| {
                let parents = self.parents_from_ancestry(name)?;
                Ok(if parents.len() == 1 {
                    parents.into_iter().next()
                } else {
                    None
                })
            },
            false,
        )
    }

    fn trace_stack<F>(&self, branch: &str, parent_of: F, repair: bool) -> Result<Vec<String>>
    where
        F: Fn(&str) -> Result<Option<String>>,
    {
        if self.is_trunk(branch) {
            return Ok(Vec::new());
        }

        let mut path = vec![branch.to_string()];
        let mut visited: HashSet<String> = HashSet::from([branch.to_string()]);
        let mut current = branch.to_string();

        while let Some(parent) = parent_of(&current)? {
            if self.is_trunk(&parent) {
                break;
            }
            if !visited.insert(parent.clone()) {
                if repair {
                    self.store.clear_parent(&current)?;
                    self.invalidate_meta_children();
                }
                return Err(StackError::corruption(format!(
                    "Cycle detected: ({current}) -> ({parent}) is already part of the stack of ({branch})."
                )));
            }
            path.push(parent.clone());
            current = parent;
        }

        path.reverse();
        Ok(path)
    }

    /// Stack from trunk (exclusive) to `branch`, by metadata when the branch
    /// has a declared parent and by ancestry otherwise
    pub fn stack_to_branch(&self, branch: &str) -> Result<Vec<String>> {
        if !self.repo.branch_exists(branch) {
            return Err(StackError::branch_not_found(branch));
        }
        if self.store.parent_name(branch).is_some() {
            self.stack_by_meta(branch)
        } else {
            self.stack_by_ancestry(branch)
        }
    }

    /// Fails when the declared and ancestry views of a stack disagree
    pub fn validate_stack(&self, branch: &str) -> Result<Vec<String>> {
        let by_meta = self.stack_by_meta(branch)?;
        let by_ancestry = self.stack_by_ancestry(branch)?;
        if by_meta != by_ancestry {
            return Err(StackError::corruption(format!(
                "Stack of ({branch}) differs between metadata [{}] and commit history [{}]",
                by_meta.join(" -> "),
                by_ancestry.join(" -> ")
            )));
        }
        Ok(by_meta)
    }

    /// `branch` followed by all its declared descendants, parents before children
    pub fn upstack(&self, branch: &str) -> Result<Vec<String>> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.collect_upstack(branch, &mut order, &mut visited)?;
        Ok(order)
    }

    fn collect_upstack(
        &self,
        branch: &str,
        order: &mut Vec<String>,
        visited: &mut HashSet<String>,
    ) -> Result<()> {
        if !visited.insert(branch.to_string()) {
            return Err(StackError::corruption(format!(
                "Cycle detected while walking descendants at ({branch})"
            )));
        }
        order.push(branch.to_string());
        for child in self.children_from_meta(branch)? {
            self.collect_upstack(&child, order, visited)?;
        }
        Ok(())
    }

    /// Declared descendants of `branch`, parents before children
    pub fn descendants(&self, branch: &str) -> Result<Vec<String>> {
        let mut order = self.upstack(branch)?;
        order.remove(0);
        Ok(order)
    }

    /// Whole stack around `branch`: its downstack then its upstack
    pub fn full_stack(&self, branch: &str) -> Result<Vec<String>> {
        if self.is_trunk(branch) {
            return self.descendants(branch);
        }
        let mut order = self.stack_to_branch(branch)?;
        order.pop();
        order.extend(self.upstack(branch)?);
        Ok(order)
    }

    pub fn trunk_children(&self) -> Result<Vec<String>> {
        self.children_from_meta(&self.trunk)
    }

    /// Correct lower bound for replaying `branch` after its parent moved.
    ///
    /// Compares the merge base against the parent's current tip with the one
    /// against the parent's previous tip. The merge base of those two is the
    /// one nearer trunk; the other is the fork point to use.
    pub fn meta_merge_base(&self, branch: &str) -> Result<Option<String>> {
        let Some(parent) = self.parent_from_meta(branch)? else {
            return Ok(None);
        };

        let branch_tip = self.repo.branch_tip(branch)?;
        let cur_parent_ref = self.repo.branch_tip(&parent)?;
        let Some(cur_merge_base) = self.repo.merge_base(&cur_parent_ref, &branch_tip)? else {
            return Ok(None);
        };

        let prev_parent_ref = self
            .store
            .get(&parent)
            .and_then(|m| m.prev_ref)
            .filter(|r| self.repo.resolve(r).is_ok());
        let Some(prev_parent_ref) = prev_parent_ref else {
            return Ok(Some(cur_merge_base));
        };

        let Some(prev_merge_base) = self.repo.merge_base(&prev_parent_ref, &branch_tip)? else {
            return Ok(Some(cur_merge_base));
        };

        let nearer_trunk = self.repo.merge_base(&prev_merge_base, &cur_merge_base)?;
        if nearer_trunk.as_deref() == Some(cur_merge_base.as_str()) {
            Ok(Some(prev_merge_base))
        } else {
            Ok(Some(cur_merge_base))
        }
    }
}
