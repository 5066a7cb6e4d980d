use crate::config::{self, RepoConfig};
use crate::errors::{Result, StackError};
use crate::git::GitRepository;
use crate::stack::continuation::{
    BranchEdit, BranchMove, Callstack, ContinuationFrame, InFlightRebase, Outcome,
};
use crate::stack::graph::BranchGraph;
use crate::stack::metadata::{MetadataPatch, MetadataStore, PrInfo, PrState};
use crate::stack::rebase::{RebaseEngine, RebaseStatus, TodoItem};
use crate::stack::restack::{RestackReport, RestackScope, Restacker};
use crate::utils::format_branch_list;
use git2::Oid;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Options for `sync`
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Fast-forward trunk from the configured remote first
    pub pull: bool,
    /// Delete branches whose cached pull request is merged or closed
    pub delete_merged: bool,
}

/// Entry point for every top-level operation.
///
/// Suspendable operations run through `run_suspendable`. It refuses to
/// start while another operation is waiting and persists the frames of a
/// suspended run. A run that completes returns to the starting branch.
pub struct StackManager<'a> {
    repo: &'a GitRepository,
    config: RepoConfig,
    callstack: Callstack,
}

impl<'a> StackManager<'a> {
    pub fn new(repo: &'a GitRepository) -> Result<Self> {
        let config = config::load_repo_config(repo)?;
        Ok(Self::with_config(repo, config))
    }

    pub fn with_config(repo: &'a GitRepository, config: RepoConfig) -> Self {
        Self {
            callstack: Callstack::new(repo.git_dir()),
            repo,
            config,
        }
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn repo(&self) -> &'a GitRepository {
        self.repo
    }

    pub fn callstack(&self) -> &Callstack {
        &self.callstack
    }

    pub fn store(&self) -> MetadataStore<'a> {
        MetadataStore::new(self.repo)
    }

    /// Graph for commands that change branches; never memoized
    pub fn graph(&self) -> Result<BranchGraph<'a>> {
        BranchGraph::new(self.repo, &self.config)
    }

    /// Graph for read-only commands. The memo is sound because nothing in
    /// such a command moves a branch.
    pub fn read_only_graph(&self) -> Result<BranchGraph<'a>> {
        BranchGraph::with_memo(self.repo, &self.config)
    }

    pub fn current_branch(&self) -> Result<String> {
        self.repo.current_branch()?.ok_or_else(|| {
            StackError::precondition("HEAD is detached. Check out a branch first.")
        })
    }

    fn require_branch(&self, name: &str) -> Result<()> {
        if self.repo.branch_exists(name) {
            Ok(())
        } else {
            Err(StackError::branch_not_found(name))
        }
    }

    fn require_not_trunk(&self, name: &str, action: &str) -> Result<()> {
        if name == self.config.trunk {
            return Err(StackError::precondition(format!(
                "Cannot {action} the trunk branch ({name})."
            )));
        }
        Ok(())
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.repo.is_rebase_in_progress() || self.callstack.is_pending() {
            return Err(StackError::precondition(
                "A previous command is waiting on conflict resolution. Run `bst continue` or `bst abort` first.",
            ));
        }
        Ok(())
    }

    fn ensure_clean(&self) -> Result<()> {
        if self.repo.has_tracked_changes()? {
            return Err(StackError::precondition(
                "There are tracked changes that have not been committed. Please resolve and then retry.",
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Branch bookkeeping
    // ------------------------------------------------------------------

    /// Create `name` at the current commit, stacked on the current branch
    pub fn create_branch(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StackError::validation("Branch name cannot be empty"));
        }
        if name.len() > self.config.max_branch_length {
            return Err(StackError::validation(format!(
                "Branch name ({name}) is {} characters; the maximum is {}",
                name.len(),
                self.config.max_branch_length
            )));
        }
        if self.repo.branch_exists(name) {
            return Err(StackError::precondition(format!(
                "Branch ({name}) already exists."
            )));
        }
        if self.config.is_ignored(name) {
            warn!("Branch '{}' matches an ignore pattern and will be hidden", name);
        }

        let parent = self.current_branch()?;
        let parent_tip = self.repo.branch_tip(&parent)?;

        self.repo.create_branch(name, &parent_tip)?;
        self.store().set_parent(name, &parent, &parent_tip)?;
        // Same commit: staged work stays in place for a following commit
        self.repo.attach_head(name)?;

        info!("Created '{}' on top of '{}'", name, parent);
        Ok(())
    }

    /// Create `name` and commit the staged changes onto it. If the commit
    /// fails the new branch is removed again.
    pub fn create_branch_with_commit(&self, name: &str, message: &str, stage_all: bool) -> Result<()> {
        self.ensure_idle()?;
        let parent = self.current_branch()?;
        self.create_branch(name)?;

        if stage_all {
            self.repo.stage_all()?;
        }
        if let Err(e) = self.repo.commit(Some(message), false) {
            warn!("Commit failed; removing '{}'", name);
            self.repo.attach_head(&parent)?;
            self.repo.delete_branch(name)?;
            self.store().delete(name)?;
            return Err(e);
        }
        Ok(())
    }

    /// Commit staged changes on the current branch, then restack its upstack
    pub fn commit_create(&self, message: &str, stage_all: bool) -> Result<(RestackReport, Outcome)> {
        self.commit_then_restack(Some(message), stage_all, false)
    }

    /// Rewrite the current branch's tip commit, then restack its upstack.
    ///
    /// The pre-amend tip is recorded as the branch's `prev_ref`, so each
    /// child replays only its own commits and drops the replaced one.
    pub fn commit_amend(&self, message: Option<&str>, stage_all: bool) -> Result<(RestackReport, Outcome)> {
        self.commit_then_restack(message, stage_all, true)
    }

    fn commit_then_restack(
        &self,
        message: Option<&str>,
        stage_all: bool,
        amend: bool,
    ) -> Result<(RestackReport, Outcome)> {
        self.ensure_idle()?;
        let branch = self.current_branch()?;
        self.require_not_trunk(&branch, if amend { "amend" } else { "commit on" })?;

        if stage_all {
            self.repo.stage_all()?;
        } else if self.repo.has_unstaged_changes()? {
            return Err(StackError::precondition(
                "There are unstaged changes. Stage them or pass --all.",
            ));
        }

        let prev_tip = self.repo.branch_tip(&branch)?;
        self.repo.commit(message, amend)?;
        self.store()
            .upsert(&branch, MetadataPatch::default().with_prev_ref(&prev_tip))?;
        debug!("Committed on '{}' (previous tip {})", branch, prev_tip);

        let mut report = RestackReport::default();
        let outcome = self.run_suspendable(|| {
            let graph = self.graph()?;
            Restacker::new(&graph).restack_descendants(&branch, &mut report)
        })?;
        Ok((report, outcome))
    }

    /// Declare `parent` as the parent of an existing branch
    pub fn track(&self, branch: &str, parent: &str) -> Result<()> {
        self.require_branch(branch)?;
        self.require_branch(parent)?;
        self.require_not_trunk(branch, "track")?;
        if branch == parent {
            return Err(StackError::precondition(format!(
                "Branch ({branch}) cannot be its own parent."
            )));
        }

        let graph = self.graph()?;
        if graph.descendants(branch)?.iter().any(|d| d == parent) {
            return Err(StackError::precondition(format!(
                "({parent}) is a descendant of ({branch}); tracking it as the parent would create a cycle."
            )));
        }

        let parent_tip = self.repo.branch_tip(parent)?;
        // Record where the branch actually forked so a later restack sees
        // whether it is behind
        let revision = self
            .repo
            .merge_base(&parent_tip, &self.repo.branch_tip(branch)?)?
            .ok_or_else(|| {
                StackError::precondition(format!(
                    "({branch}) and ({parent}) share no history."
                ))
            })?;

        self.store().set_parent(branch, parent, &revision)?;
        info!("Tracking '{}' on top of '{}'", branch, parent);
        Ok(())
    }

    /// Rename a branch, moving its metadata and re-pointing its children
    pub fn rename_branch(&self, old: &str, new: &str) -> Result<()> {
        if old == new {
            debug!("Rename of '{}' to itself is a no-op", old);
            return Ok(());
        }
        self.require_branch(old)?;
        self.require_not_trunk(old, "rename")?;
        if self.repo.branch_exists(new) {
            return Err(StackError::precondition(format!(
                "Branch ({new}) already exists."
            )));
        }
        if new.len() > self.config.max_branch_length {
            return Err(StackError::validation(format!(
                "Branch name ({new}) exceeds the maximum length of {}",
                self.config.max_branch_length
            )));
        }

        self.repo.rename_branch(old, new)?;

        let store = self.store();
        store.rename(old, new)?;
        for name in store.all_branch_names()? {
            if store.parent_name(&name).as_deref() == Some(old) {
                store.upsert(&name, MetadataPatch::parent_name(new))?;
            }
        }

        info!("Renamed '{}' to '{}'", old, new);
        Ok(())
    }

    /// Delete one branch and its metadata without restacking. Children are
    /// re-pointed at the deleted branch's parent and keep its commits.
    pub fn delete_branch(&self, name: &str, force: bool) -> Result<()> {
        self.require_branch(name)?;
        self.require_not_trunk(name, "delete")?;

        if !force && !self.is_merged(name)? {
            return Err(StackError::precondition(format!(
                "Branch ({name}) is not merged into ({}). Use --force to delete it anyway.",
                self.config.trunk
            )));
        }

        let graph = self.graph()?;
        let new_parent = graph
            .parent_from_meta(name)?
            .unwrap_or_else(|| self.config.trunk.clone());

        if self.repo.current_branch()?.as_deref() == Some(name) {
            self.repo.checkout_branch(&new_parent)?;
        }

        self.repo.delete_branch(name)?;

        // The record goes away with the branch, so nothing may still name it
        let store = self.store();
        for child in store.all_branch_names()? {
            if store.parent_name(&child).as_deref() == Some(name) {
                debug!("Re-pointing '{}' from '{}' to '{}'", child, name, new_parent);
                store.upsert(&child, MetadataPatch::parent_name(&new_parent))?;
            }
        }
        store.delete(name)?;
        Ok(())
    }

    /// Merged when the cached PR says so or the tip is already in trunk
    pub fn is_merged(&self, name: &str) -> Result<bool> {
        if self
            .store()
            .pr_info(name)
            .is_some_and(|pr| pr.state == PrState::Merged)
        {
            return Ok(true);
        }
        let tip = self.repo.branch_oid(name)?;
        let trunk_tip = self.repo.branch_oid(&self.config.trunk)?;
        self.repo.is_ancestor(tip, trunk_tip)
    }

    /// Check out the parent of the current branch
    pub fn checkout_parent(&self) -> Result<String> {
        let current = self.current_branch()?;
        let graph = self.graph()?;
        let parent = match graph.parent_from_meta(&current)? {
            Some(parent) => parent,
            None => {
                let mut parents = graph.parents_from_ancestry(&current)?;
                if parents.len() != 1 {
                    return Err(StackError::precondition(format!(
                        "Cannot determine a single parent of ({current})."
                    )));
                }
                parents.remove(0)
            }
        };
        self.repo.checkout_branch(&parent)?;
        Ok(parent)
    }

    /// Check out the only child of the current branch
    pub fn checkout_child(&self) -> Result<String> {
        let current = self.current_branch()?;
        let graph = self.graph()?;
        let mut children = graph.children_from_meta(&current)?;
        match children.len() {
            0 => Err(StackError::precondition(format!(
                "({current}) has no child branches."
            ))),
            1 => {
                let child = children.remove(0);
                self.repo.checkout_branch(&child)?;
                Ok(child)
            }
            _ => Err(StackError::precondition(format!(
                "({current}) has several children: {}",
                format_branch_list(&children)
            ))),
        }
    }

    /// Write the cached pull-request state for a branch
    pub fn set_pr_info(&self, branch: &str, info: Option<PrInfo>) -> Result<()> {
        self.require_branch(branch)?;
        self.store().set_pr_info(branch, info)
    }

    /// Branches in scope whose pull request is already merged or closed
    pub fn submit_blockers(&self, branch: &str, scope: RestackScope) -> Result<Vec<(String, PrState)>> {
        let graph = self.read_only_graph()?;
        let restacker = Restacker::new(&graph);
        let store = self.store();
        Ok(restacker
            .branches_in_scope(branch, scope)?
            .into_iter()
            .filter_map(|name| {
                store
                    .pr_info(&name)
                    .filter(|pr| pr.is_closed_or_merged())
                    .map(|pr| (name, pr.state))
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Suspendable operations
    // ------------------------------------------------------------------

    fn run_suspendable<F>(&self, op: F) -> Result<Outcome>
    where
        F: FnOnce() -> Result<Outcome>,
    {
        self.ensure_idle()?;
        self.ensure_clean()?;
        let original = self.repo.current_branch()?;

        let outcome = op()?;
        match &outcome {
            Outcome::Completed => self.return_to(original.as_deref())?,
            // git leaves HEAD on the conflicted branch; it stays there
            Outcome::Suspended(frames) => self.callstack.save(frames)?,
        }
        Ok(outcome)
    }

    fn return_to(&self, branch: Option<&str>) -> Result<()> {
        let target = match branch {
            Some(b) if self.repo.branch_exists(b) => b,
            _ => self.config.trunk.as_str(),
        };
        if self.repo.current_branch()?.as_deref() != Some(target) {
            self.repo.checkout_branch(target)?;
        }
        Ok(())
    }

    /// Restack `branch` and, depending on scope, its neighbours
    pub fn restack(&self, branch: &str, scope: RestackScope) -> Result<(RestackReport, Outcome)> {
        self.require_branch(branch)?;
        let mut report = RestackReport::default();
        let outcome = self.run_suspendable(|| {
            let graph = self.graph()?;
            Restacker::new(&graph).restack(branch, scope, &mut report)
        })?;
        Ok((report, outcome))
    }

    /// Move `branch` onto `onto`, carrying its descendants along
    pub fn move_onto(&self, branch: &str, onto: &str) -> Result<(RestackReport, Outcome)> {
        self.require_branch(branch)?;
        self.require_branch(onto)?;
        self.require_not_trunk(branch, "move")?;
        if branch == onto {
            return Err(StackError::precondition(format!(
                "Cannot move ({branch}) onto itself."
            )));
        }

        let mut report = RestackReport::default();
        let outcome = self.run_suspendable(|| {
            let graph = self.graph()?;
            if graph.descendants(branch)?.iter().any(|d| d == onto) {
                return Err(StackError::precondition(format!(
                    "Cannot move ({branch}) onto its own descendant ({onto})."
                )));
            }

            let old_base = match graph.meta_merge_base(branch)? {
                Some(base) => base,
                None => {
                    // Untracked branch: replay everything not on the target
                    let onto_tip = self.repo.branch_tip(onto)?;
                    let tip = self.repo.branch_tip(branch)?;
                    self.repo.merge_base(&onto_tip, &tip)?.ok_or_else(|| {
                        StackError::precondition(format!(
                            "({branch}) shares no history with ({onto})."
                        ))
                    })?
                }
            };

            Restacker::new(&graph).move_onto(branch, onto, &old_base, &mut report)
        })?;
        Ok((report, outcome))
    }

    /// Delete branches, first moving their surviving children onto the
    /// nearest surviving ancestor
    pub fn delete_branches(&self, names: &[String]) -> Result<Outcome> {
        for name in names {
            self.require_branch(name)?;
            self.require_not_trunk(name, "delete")?;
        }
        self.run_suspendable(|| {
            let mut report = RestackReport::default();
            self.delete_branches_inner(names, &mut report)
        })
    }

    fn delete_branches_inner(&self, names: &[String], report: &mut RestackReport) -> Result<Outcome> {
        let graph = self.graph()?;
        let doomed: HashSet<&str> = names.iter().map(|s| s.as_str()).collect();

        let mut moves = Vec::new();
        for name in names {
            let new_parent = self.surviving_ancestor(&graph, name, &doomed)?;
            let tip = self.repo.branch_tip(name)?;
            for child in graph.children_from_meta(name)? {
                if doomed.contains(child.as_str()) {
                    continue;
                }
                let child_tip = self.repo.branch_tip(&child)?;
                let old_base = self.repo.merge_base(&tip, &child_tip)?.unwrap_or(tip.clone());
                moves.push(BranchMove {
                    branch: child,
                    new_parent: new_parent.clone(),
                    old_base,
                });
            }
        }

        self.perform_moves_then_delete(names, &moves, report)
    }

    fn surviving_ancestor(
        &self,
        graph: &BranchGraph<'_>,
        branch: &str,
        doomed: &HashSet<&str>,
    ) -> Result<String> {
        let mut seen = HashSet::new();
        let mut current = branch.to_string();
        while let Some(parent) = graph.parent_from_meta(&current)? {
            if !doomed.contains(parent.as_str()) {
                return Ok(parent);
            }
            if !seen.insert(parent.clone()) {
                break;
            }
            current = parent;
        }
        Ok(self.config.trunk.clone())
    }

    fn perform_moves_then_delete(
        &self,
        branches: &[String],
        moves: &[BranchMove],
        report: &mut RestackReport,
    ) -> Result<Outcome> {
        for (i, mv) in moves.iter().enumerate() {
            let graph = self.graph()?;
            let outcome = Restacker::new(&graph).move_onto(&mv.branch, &mv.new_parent, &mv.old_base, report)?;
            if outcome.is_suspended() {
                return Ok(outcome.then(ContinuationFrame::DeleteBranches {
                    branches: branches.to_vec(),
                    pending_moves: moves[i + 1..].to_vec(),
                }));
            }
        }

        let store = self.store();
        for name in branches {
            if self.repo.branch_exists(name) {
                if self.repo.current_branch()?.as_deref() == Some(name.as_str()) {
                    self.repo.checkout_branch(&self.config.trunk)?;
                }
                self.repo.delete_branch(name)?;
            }
            store.delete(name)?;
        }
        Ok(Outcome::Completed)
    }

    /// Pull trunk, drop merged branches, and restack every stack on trunk
    pub fn sync(&self, opts: SyncOptions) -> Result<(RestackReport, Outcome)> {
        let mut report = RestackReport::default();
        let outcome = self.run_suspendable(|| {
            if opts.pull {
                self.repo.checkout_branch(&self.config.trunk)?;
                self.repo
                    .pull_ff_only(&self.config.remote, &self.config.trunk)?;
            }

            if opts.delete_merged {
                let merged = self.merged_or_closed_branches()?;
                if !merged.is_empty() {
                    info!("Deleting {}", format_branch_list(&merged));
                    let outcome = self.delete_branches_inner(&merged, &mut report)?;
                    if outcome.is_suspended() {
                        return Ok(outcome.then(ContinuationFrame::RepoSync {
                            remaining_roots: None,
                        }));
                    }
                }
            }

            self.sync_restack(None, &mut report)
        })?;
        Ok((report, outcome))
    }

    fn merged_or_closed_branches(&self) -> Result<Vec<String>> {
        let graph = self.read_only_graph()?;
        let store = self.store();
        graph.all_branches(
            |name| {
                !graph.is_trunk(name)
                    && store
                        .pr_info(name)
                        .is_some_and(|pr| pr.is_closed_or_merged())
            },
            Default::default(),
        )
    }

    fn sync_restack(&self, roots: Option<Vec<String>>, report: &mut RestackReport) -> Result<Outcome> {
        let graph = self.graph()?;
        let roots = match roots {
            Some(roots) => roots,
            None => graph.trunk_children()?,
        };

        let restacker = Restacker::new(&graph);
        for (i, root) in roots.iter().enumerate() {
            if !self.repo.branch_exists(root) {
                continue;
            }
            let outcome = restacker.restack(root, RestackScope::Upstack, report)?;
            if outcome.is_suspended() {
                return Ok(outcome.then(ContinuationFrame::RepoSync {
                    remaining_roots: Some(roots[i + 1..].to_vec()),
                }));
            }
        }
        Ok(Outcome::Completed)
    }

    /// Rewrite the commits of one or more branches, lowest first, then
    /// restack everything above the first one
    pub fn edit_stack(&self, edits: Vec<BranchEdit>) -> Result<Outcome> {
        let Some(first) = edits.first() else {
            return Err(StackError::validation("No edits given"));
        };
        let root = first.branch.clone();
        for edit in &edits {
            self.require_branch(&edit.branch)?;
            self.require_not_trunk(&edit.branch, "edit")?;
        }

        let graph = self.graph()?;
        let upstack = graph.upstack(&root)?;
        for edit in &edits[1..] {
            if !upstack.contains(&edit.branch) {
                return Err(StackError::validation(format!(
                    "({}) is not above ({root}); list edits from the bottom of the stack up.",
                    edit.branch
                )));
            }
        }

        self.run_suspendable(|| self.apply_stack_edits(&edits, &root))
    }

    fn apply_stack_edits(&self, edits: &[BranchEdit], restack_root: &str) -> Result<Outcome> {
        let engine = RebaseEngine::new(self.repo);
        for (i, edit) in edits.iter().enumerate() {
            let graph = self.graph()?;
            let base = graph.meta_merge_base(&edit.branch)?.ok_or_else(|| {
                StackError::precondition(format!(
                    "Branch ({}) has no parent; track it before editing.",
                    edit.branch
                ))
            })?;

            let mut todo = edit.todo.clone();
            self.check_todo_covers_branch(&edit.branch, &base, &mut todo)?;

            let tip = self.repo.branch_tip(&edit.branch)?;
            self.store()
                .upsert(&edit.branch, MetadataPatch::default().with_prev_ref(&tip))?;

            if engine.rebase_interactive(&edit.branch, &base, &todo)? == RebaseStatus::Conflict {
                return Ok(Outcome::Suspended(vec![ContinuationFrame::StackEdit {
                    current_branch: edit.branch.clone(),
                    remaining_edits: edits[i + 1..].to_vec(),
                    restack_root: restack_root.to_string(),
                }]));
            }
        }

        let graph = self.graph()?;
        let mut report = RestackReport::default();
        Restacker::new(&graph).restack_descendants(restack_root, &mut report)
    }

    /// Every todo entry must be one of the branch's own commits and every
    /// commit must be listed. Abbreviated ids are expanded in place.
    fn check_todo_covers_branch(
        &self,
        branch: &str,
        base: &str,
        todo: &mut [TodoItem],
    ) -> Result<()> {
        let own: HashSet<String> = self
            .repo
            .commits_between(base, branch)?
            .into_iter()
            .map(|c| c.id)
            .collect();

        let mut listed = HashSet::new();
        for item in todo.iter_mut() {
            let full = self.repo.resolve(&item.commit)?.to_string();
            if !own.contains(&full) {
                return Err(StackError::validation(format!(
                    "Commit {} does not belong to ({branch})",
                    item.commit
                )));
            }
            item.commit = full.clone();
            listed.insert(full);
        }

        if listed.len() != own.len() {
            return Err(StackError::validation(format!(
                "The edit for ({branch}) must list each of its {} commits exactly once",
                own.len()
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resume and abort
    // ------------------------------------------------------------------

    pub fn pending_frames(&self) -> Result<Vec<ContinuationFrame>> {
        self.callstack.peek_all()
    }

    /// Finish the rebase git stopped on, then drain the callstack
    pub fn continue_operation(&self, add_all: bool) -> Result<Outcome> {
        let engine = RebaseEngine::new(self.repo);
        let rebase_pending = engine.is_in_progress();
        let frames_pending = self.callstack.is_pending();

        if !rebase_pending && !frames_pending {
            return Err(StackError::precondition("No branchstack command to continue."));
        }

        if add_all {
            self.repo.stage_all()?;
        }

        if rebase_pending && engine.rebase_continue()? == RebaseStatus::Conflict {
            return Ok(Outcome::Suspended(self.callstack.peek_all()?));
        }

        if !frames_pending {
            return Ok(Outcome::Completed);
        }

        self.callstack.drain(|frame| self.execute_frame(frame))
    }

    /// Abandon the suspended operation entirely. Returns false when there
    /// was nothing to abort.
    pub fn abort_operation(&self) -> Result<bool> {
        let engine = RebaseEngine::new(self.repo);
        if !engine.is_in_progress() && !self.callstack.is_pending() {
            return Ok(false);
        }

        engine.rebase_abort()?;
        // An unreadable callstack is discarded all the same
        self.callstack.clear()?;
        Ok(true)
    }

    /// Run one frame. Only looks at the frame it is given.
    fn execute_frame(&self, frame: ContinuationFrame) -> Result<Outcome> {
        frame.validate()?;
        let mut report = RestackReport::default();

        match frame {
            ContinuationFrame::StackOntoBaseRebase { in_flight } => {
                self.verify_landed(&in_flight)?;
                let graph = self.graph()?;
                let restacker = Restacker::new(&graph);
                restacker.finish(&in_flight)?;
                restacker.restack_descendants(&in_flight.branch, &mut report)
            }
            ContinuationFrame::RestackBranches {
                in_flight,
                remaining,
            } => {
                let graph = self.graph()?;
                let restacker = Restacker::new(&graph);
                if let Some(in_flight) = in_flight {
                    self.verify_landed(&in_flight)?;
                    restacker.finish(&in_flight)?;
                }
                restacker.restack_branches(&remaining, &mut report)
            }
            ContinuationFrame::DeleteBranches {
                branches,
                pending_moves,
            } => self.perform_moves_then_delete(&branches, &pending_moves, &mut report),
            ContinuationFrame::RepoSync { remaining_roots } => {
                self.sync_restack(remaining_roots, &mut report)
            }
            ContinuationFrame::StackEdit {
                current_branch,
                remaining_edits,
                restack_root,
            } => {
                debug!("Edit of '{}' finished", current_branch);
                self.apply_stack_edits(&remaining_edits, &restack_root)
            }
        }
    }

    /// The rebase recorded in a frame must actually have landed on its new
    /// base, otherwise it was aborted behind our back
    fn verify_landed(&self, in_flight: &InFlightRebase) -> Result<()> {
        let tip = self.repo.branch_oid(&in_flight.branch)?;
        let base = Oid::from_str(&in_flight.parent_revision).map_err(|_| {
            StackError::continuation(format!(
                "Invalid revision {} recorded for ({})",
                in_flight.parent_revision, in_flight.branch
            ))
        })?;
        if !self.repo.is_ancestor(base, tip)? {
            return Err(StackError::precondition(format!(
                "The rebase of ({}) onto ({}) did not complete. Run `bst abort` to discard the operation.",
                in_flight.branch, in_flight.parent
            )));
        }
        Ok(())
    }
}
