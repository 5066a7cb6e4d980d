use crate::errors::{Result, StackError};
use crate::stack::continuation::{ContinuationFrame, InFlightRebase, Outcome};
use crate::stack::graph::BranchGraph;
use crate::stack::metadata::MetadataPatch;
use crate::stack::rebase::{RebaseEngine, RebaseStatus};
use tracing::{debug, info};

/// Which branches a restack covers, relative to a starting branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestackScope {
    /// Only the branch itself
    Branch,
    /// The branch and everything above it
    Upstack,
    /// Its whole stack, from trunk's first child to every leaf above it
    Stack,
}

/// What a restack run did before completing or suspending
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestackReport {
    pub rebased: Vec<String>,
    pub skipped: Vec<String>,
}

enum Step {
    Rebased,
    UpToDate,
    Conflict(InFlightRebase),
}

/// Brings branches onto their parents' current tips, parents first.
///
/// Must be driven by a graph without a memo: every rebase changes the
/// commit graph.
pub struct Restacker<'g, 'a> {
    graph: &'g BranchGraph<'a>,
    engine: RebaseEngine<'a>,
}

impl<'g, 'a> Restacker<'g, 'a> {
    pub fn new(graph: &'g BranchGraph<'a>) -> Self {
        Self {
            graph,
            engine: RebaseEngine::new(graph.repo()),
        }
    }

    /// Branches covered by `scope`, in restack order, trunk excluded
    pub fn branches_in_scope(&self, branch: &str, scope: RestackScope) -> Result<Vec<String>> {
        let branches = match scope {
            RestackScope::Branch => vec![branch.to_string()],
            RestackScope::Upstack => self.graph.upstack(branch)?,
            RestackScope::Stack => self.graph.full_stack(branch)?,
        };
        Ok(branches
            .into_iter()
            .filter(|b| !self.graph.is_trunk(b))
            .collect())
    }

    pub fn restack(
        &self,
        branch: &str,
        scope: RestackScope,
        report: &mut RestackReport,
    ) -> Result<Outcome> {
        let branches = self.branches_in_scope(branch, scope)?;
        self.restack_branches(&branches, report)
    }

    /// Restack `branches` in the given order. On a conflict the rest of the
    /// list goes into the returned frame and nothing else is touched.
    pub fn restack_branches(&self, branches: &[String], report: &mut RestackReport) -> Result<Outcome> {
        for (i, branch) in branches.iter().enumerate() {
            if self.graph.is_trunk(branch) {
                continue;
            }
            match self.restack_one(branch)? {
                Step::Rebased => report.rebased.push(branch.clone()),
                Step::UpToDate => report.skipped.push(branch.clone()),
                Step::Conflict(in_flight) => {
                    info!("Conflict while restacking {}", branch);
                    return Ok(Outcome::Suspended(vec![ContinuationFrame::RestackBranches {
                        in_flight: Some(in_flight),
                        remaining: branches[i + 1..].to_vec(),
                    }]));
                }
            }
        }
        Ok(Outcome::Completed)
    }

    fn restack_one(&self, branch: &str) -> Result<Step> {
        let repo = self.graph.repo();
        if !repo.branch_exists(branch) {
            return Err(StackError::branch_not_found(branch));
        }

        let parent = self.graph.parent_from_meta(branch)?.ok_or_else(|| {
            StackError::precondition(format!(
                "Branch ({branch}) has no parent to restack onto. Track it with a parent first."
            ))
        })?;
        let parent_tip = repo.branch_tip(&parent)?;

        let recorded = self
            .graph
            .store()
            .get(branch)
            .and_then(|m| m.parent_branch_revision);
        if recorded.as_deref() == Some(parent_tip.as_str()) {
            debug!("{} is up to date with {}", branch, parent);
            return Ok(Step::UpToDate);
        }

        let old_base = self.graph.meta_merge_base(branch)?.ok_or_else(|| {
            StackError::precondition(format!(
                "Branch ({branch}) shares no history with its parent ({parent})."
            ))
        })?;

        let in_flight = InFlightRebase {
            branch: branch.to_string(),
            parent,
            parent_revision: parent_tip.clone(),
            prev_ref: repo.branch_tip(branch)?,
        };

        if old_base == parent_tip {
            // Already sits on the parent's tip; only the bookkeeping is stale
            self.finish(&in_flight)?;
            return Ok(Step::UpToDate);
        }

        match self.engine.rebase_onto(branch, &old_base, &parent_tip)? {
            RebaseStatus::Done => {
                self.finish(&in_flight)?;
                Ok(Step::Rebased)
            }
            RebaseStatus::Conflict => Ok(Step::Conflict(in_flight)),
        }
    }

    /// Record a completed rebase in the branch's metadata
    pub fn finish(&self, in_flight: &InFlightRebase) -> Result<()> {
        self.graph.store().upsert(
            &in_flight.branch,
            MetadataPatch::parent(&in_flight.parent, &in_flight.parent_revision)
                .with_prev_ref(&in_flight.prev_ref),
        )?;
        debug!(
            "Recorded {} on {} at {}",
            in_flight.branch, in_flight.parent, in_flight.parent_revision
        );
        Ok(())
    }

    /// Rebase `branch` onto `new_parent`'s tip replaying commits above
    /// `old_base`, record the new parent, then restack its descendants
    pub fn move_onto(
        &self,
        branch: &str,
        new_parent: &str,
        old_base: &str,
        report: &mut RestackReport,
    ) -> Result<Outcome> {
        let repo = self.graph.repo();
        let parent_tip = repo.branch_tip(new_parent)?;
        let in_flight = InFlightRebase {
            branch: branch.to_string(),
            parent: new_parent.to_string(),
            parent_revision: parent_tip.clone(),
            prev_ref: repo.branch_tip(branch)?,
        };

        match self.engine.rebase_onto(branch, old_base, &parent_tip)? {
            RebaseStatus::Done => {
                self.finish(&in_flight)?;
                report.rebased.push(branch.to_string());
                self.restack_descendants(branch, report)
            }
            RebaseStatus::Conflict => Ok(Outcome::Suspended(vec![
                ContinuationFrame::StackOntoBaseRebase { in_flight },
            ])),
        }
    }

    pub fn restack_descendants(&self, branch: &str, report: &mut RestackReport) -> Result<Outcome> {
        let descendants = self.graph.descendants(branch)?;
        self.restack_branches(&descendants, report)
    }
}
