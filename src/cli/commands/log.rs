use crate::errors::Result;
use crate::stack::{BranchGraph, ListOptions, StackManager};
use crate::utils::format_age;
use chrono::{DateTime, Utc};
use console::style;
use std::collections::HashSet;

use super::open_initialized;

/// Print the branch tree rooted at trunk
pub fn run(ancestry: bool, all: bool) -> Result<()> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;
    let graph = manager.read_only_graph()?;
    let current = repo.current_branch()?;

    let opts = if all {
        ListOptions::default()
    } else {
        graph.default_list_options()
    };
    let shown: HashSet<String> = graph.all_branches(|_| true, opts)?.into_iter().collect();

    let mut printer = TreePrinter {
        graph: &graph,
        ancestry,
        current: current.as_deref(),
        shown: &shown,
        now: Utc::now(),
        printed: HashSet::new(),
    };
    printer.print(graph.trunk(), 0)?;

    let mut untracked: Vec<&String> = shown
        .iter()
        .filter(|b| !printer.printed.contains(*b))
        .collect();
    if !untracked.is_empty() {
        untracked.sort();
        println!();
        println!("{}", style("Not in any stack:").dim());
        for branch in untracked {
            println!("  {}", branch);
        }
    }
    Ok(())
}

struct TreePrinter<'g, 'a> {
    graph: &'g BranchGraph<'a>,
    ancestry: bool,
    current: Option<&'g str>,
    shown: &'g HashSet<String>,
    now: DateTime<Utc>,
    printed: HashSet<String>,
}

impl TreePrinter<'_, '_> {
    fn print(&mut self, branch: &str, depth: usize) -> Result<()> {
        // Ancestry can reach a branch through two parents
        if !self.printed.insert(branch.to_string()) {
            return Ok(());
        }

        let marker = if self.current == Some(branch) { "◉" } else { "◯" };
        let name = if self.current == Some(branch) {
            style(branch).cyan().bold().to_string()
        } else {
            branch.to_string()
        };
        println!("{}{} {}{}", "│ ".repeat(depth), marker, name, self.annotations(branch)?);

        let children = if self.ancestry {
            self.graph.children_from_ancestry(branch)?
        } else {
            self.graph.children_from_meta(branch)?
        };
        for child in children {
            if self.shown.contains(&child) {
                self.print(&child, depth + 1)?;
            }
        }
        Ok(())
    }

    fn annotations(&self, branch: &str) -> Result<String> {
        let age = format_age(self.graph.repo().commit_time(branch)?, self.now);
        if self.graph.is_trunk(branch) {
            return Ok(format!(" {}", style(age).dim()));
        }
        let mut notes = vec![style(age).dim().to_string()];

        if let Some(meta) = self.graph.store().get(branch) {
            if let Some(parent) = self.graph.parent_from_meta(branch).ok().flatten() {
                let parent_tip = self.graph.repo().branch_tip(&parent)?;
                if meta.parent_branch_revision.as_deref() != Some(parent_tip.as_str()) {
                    notes.push(style("needs restack").yellow().to_string());
                }
            }
            if let Some(pr) = &meta.pr_info {
                notes.push(format!("PR #{} {}", pr.number, pr.state));
            }
        } else {
            notes.push(style("untracked").dim().to_string());
        }

        Ok(format!(" ({})", notes.join(", ")))
    }
}
