//! Branch graph: stack paths, parent repair, ancestry inference, and the
//! merge base used across parent rebases.

use branchstack::config::RepoConfig;
use branchstack::stack::{BranchGraph, ListOptions, MetadataPatch, MetadataStore};
use branchstack::StackError;
use std::collections::HashSet;

#[path = "support/test_helpers.rs"]
mod test_helpers;

use test_helpers::TestRepo;

#[test]
fn test_stack_to_branch_is_trunk_exclusive_path() {
    let repo = TestRepo::new();
    repo.build_stack(&["a", "b", "c"]);

    let git_repo = repo.open();
    let graph = BranchGraph::new(&git_repo, &repo.config()).unwrap();

    assert_eq!(graph.stack_to_branch("c").unwrap(), vec!["a", "b", "c"]);
    assert_eq!(graph.stack_to_branch("a").unwrap(), vec!["a"]);
    assert!(graph.stack_to_branch("main").unwrap().is_empty());

    for branch in ["a", "b", "c"] {
        let path = graph.stack_to_branch(branch).unwrap();
        assert_eq!(path.last().map(String::as_str), Some(branch));

        let unique: HashSet<&String> = path.iter().collect();
        assert_eq!(unique.len(), path.len(), "duplicate in {path:?}");

        // Every branch appears after its parent
        for (i, name) in path.iter().enumerate().skip(1) {
            let parent = graph.parent_from_meta(name).unwrap().unwrap();
            assert_eq!(parent, path[i - 1]);
        }
    }

    // Metadata and history agree on a freshly built stack
    assert_eq!(graph.validate_stack("c").unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn test_stack_falls_back_to_ancestry_for_untracked_branch() {
    let repo = TestRepo::new();
    repo.build_stack(&["a"]);

    // Created behind branchstack's back: no metadata
    repo.git(&["checkout", "-q", "-b", "loose"]);
    repo.commit("loose.txt", "loose\n", "Loose work");

    let git_repo = repo.open();
    let graph = BranchGraph::new(&git_repo, &repo.config()).unwrap();

    assert_eq!(graph.parent_from_meta("loose").unwrap(), None);
    assert_eq!(graph.parents_from_ancestry("loose").unwrap(), vec!["a"]);
    assert_eq!(graph.stack_to_branch("loose").unwrap(), vec!["a", "loose"]);
}

#[test]
fn test_self_reference_is_cleared_and_reported_once() {
    let repo = TestRepo::new();
    repo.build_stack(&["a"]);

    let git_repo = repo.open();
    let store = MetadataStore::new(&git_repo);
    store.set_parent("a", "a", &repo.tip("a")).unwrap();

    let graph = BranchGraph::new(&git_repo, &repo.config()).unwrap();

    let first = graph.parent_from_meta("a");
    assert!(matches!(first, Err(StackError::GraphCorruption(_))));
    assert_eq!(store.parent_name("a"), None);

    // Repaired: the second lookup is clean
    assert_eq!(graph.parent_from_meta("a").unwrap(), None);
}

#[test]
fn test_deleted_parent_is_skipped_and_rewritten() {
    let repo = TestRepo::new();
    repo.build_stack(&["a", "b", "c"]);

    // Delete b with plain git: c's record still names it
    repo.git(&["branch", "-D", "b"]);

    let git_repo = repo.open();
    let store = MetadataStore::new(&git_repo);
    assert_eq!(store.parent_name("c").as_deref(), Some("b"));

    let graph = BranchGraph::new(&git_repo, &repo.config()).unwrap();
    assert_eq!(graph.parent_from_meta("c").unwrap().as_deref(), Some("a"));
    assert_eq!(store.parent_name("c").as_deref(), Some("a"));
    assert_eq!(graph.stack_to_branch("c").unwrap(), vec!["a", "c"]);
}

#[test]
fn test_parent_chain_that_dies_out_is_cleared() {
    let repo = TestRepo::new();
    repo.build_stack(&["a"]);

    let git_repo = repo.open();
    let store = MetadataStore::new(&git_repo);
    let tip = repo.tip("a");
    store.set_parent("a", "ghost", &tip).unwrap();

    let graph = BranchGraph::new(&git_repo, &repo.config()).unwrap();
    assert_eq!(graph.parent_from_meta("a").unwrap(), None);
    assert_eq!(store.parent_name("a"), None);
}

#[test]
fn test_cycle_through_deleted_branches_is_repaired() {
    let repo = TestRepo::new();
    repo.build_stack(&["a"]);

    let git_repo = repo.open();
    let store = MetadataStore::new(&git_repo);
    let tip = repo.tip("a");
    store.set_parent("a", "gone1", &tip).unwrap();
    store.set_parent("gone1", "gone2", &tip).unwrap();
    store.set_parent("gone2", "gone1", &tip).unwrap();

    let graph = BranchGraph::new(&git_repo, &repo.config()).unwrap();
    assert!(matches!(
        graph.parent_from_meta("a"),
        Err(StackError::GraphCorruption(_))
    ));
    assert_eq!(store.parent_name("a"), None);
    assert_eq!(graph.parent_from_meta("a").unwrap(), None);
}

#[test]
fn test_cycle_between_existing_branches_is_repaired() {
    let repo = TestRepo::new();
    repo.build_stack(&["x", "y"]);

    let git_repo = repo.open();
    let store = MetadataStore::new(&git_repo);
    store.upsert("x", MetadataPatch::parent_name("y")).unwrap();

    let graph = BranchGraph::new(&git_repo, &repo.config()).unwrap();
    assert!(matches!(
        graph.stack_by_meta("y"),
        Err(StackError::GraphCorruption(_))
    ));

    // The link that closed the loop is gone; the walk now terminates
    let path = graph.stack_by_meta("y").unwrap();
    assert_eq!(path.last().map(String::as_str), Some("y"));
    let unique: HashSet<&String> = path.iter().collect();
    assert_eq!(unique.len(), path.len());
}

#[test]
fn test_meta_merge_base_prefers_previous_parent_tip() {
    let repo = TestRepo::new();
    repo.build_stack(&["p"]);
    let p0 = repo.tip("p");
    repo.build_stack(&["x"]);

    // P moves on: p1 descends from p0
    repo.checkout("p");
    let p1 = repo.commit("p2.txt", "more\n", "More p");
    assert!(repo.is_ancestor(&p0, &p1));

    let git_repo = repo.open();
    MetadataStore::new(&git_repo)
        .upsert("p", MetadataPatch::default().with_prev_ref(&p0))
        .unwrap();

    let graph = BranchGraph::new(&git_repo, &repo.config()).unwrap();
    assert_eq!(graph.meta_merge_base("x").unwrap(), Some(p0));
}

#[test]
fn test_meta_merge_base_survives_parent_rebase() {
    let repo = TestRepo::new();
    let fork = repo.tip("main");
    repo.build_stack(&["p"]);
    let p0 = repo.tip("p");
    repo.build_stack(&["x"]);

    repo.checkout("main");
    repo.commit("trunk.txt", "trunk\n", "Trunk moves");
    repo.git(&["rebase", "-q", "main", "p"]);
    let p1 = repo.tip("p");
    assert!(!repo.is_ancestor(&p0, &p1));

    let git_repo = repo.open();
    let store = MetadataStore::new(&git_repo);
    let graph = BranchGraph::new(&git_repo, &repo.config()).unwrap();

    // Without the previous tip only the trunk fork point is visible
    assert_eq!(graph.meta_merge_base("x").unwrap(), Some(fork));

    store
        .upsert("p", MetadataPatch::default().with_prev_ref(&p0))
        .unwrap();
    assert_eq!(graph.meta_merge_base("x").unwrap(), Some(p0));
}

#[test]
fn test_ancestry_parents_and_children() {
    let repo = TestRepo::new();
    repo.build_stack(&["a", "b"]);
    repo.checkout("a");
    repo.build_stack(&["sibling"]);

    // No commits of its own: sits on trunk
    repo.checkout("main");
    repo.git(&["branch", "empty"]);

    let git_repo = repo.open();
    let graph = BranchGraph::new(&git_repo, &repo.config()).unwrap();

    assert_eq!(graph.parents_from_ancestry("b").unwrap(), vec!["a"]);
    assert_eq!(graph.parents_from_ancestry("a").unwrap(), vec!["main"]);
    assert_eq!(graph.parents_from_ancestry("empty").unwrap(), vec!["main"]);
    assert!(graph.parents_from_ancestry("main").unwrap().is_empty());
    assert_eq!(graph.children_from_ancestry("a").unwrap(), vec!["b", "sibling"]);
}

#[test]
fn test_only_trunk_tip_is_trunk_shortcut() {
    let repo = TestRepo::new();
    let root = repo.tip("main");
    repo.commit("one.txt", "one\n", "Trunk one");
    repo.git(&["branch", "behind"]);
    repo.git(&["branch", "at-root", &root]);
    repo.commit("two.txt", "two\n", "Trunk two");

    let git_repo = repo.open();
    let graph = BranchGraph::new(&git_repo, &repo.config()).unwrap();

    // Behind trunk but with history: the walk still lands on trunk
    assert_eq!(graph.parents_from_ancestry("behind").unwrap(), vec!["main"]);
    // The root commit has nothing to walk back to
    assert!(graph.parents_from_ancestry("at-root").unwrap().is_empty());
}

#[test]
fn test_upstack_and_full_stack_order() {
    let repo = TestRepo::new();
    repo.build_stack(&["a", "b", "c"]);
    repo.checkout("a");
    repo.build_stack(&["d"]);

    let git_repo = repo.open();
    let graph = BranchGraph::new(&git_repo, &repo.config()).unwrap();

    assert_eq!(graph.children_from_meta("a").unwrap(), vec!["b", "d"]);
    assert_eq!(graph.upstack("a").unwrap(), vec!["a", "b", "c", "d"]);
    assert_eq!(graph.descendants("b").unwrap(), vec!["c"]);
    assert_eq!(graph.full_stack("b").unwrap(), vec!["a", "b", "c"]);
    assert_eq!(graph.trunk_children().unwrap(), vec!["a"]);
}

#[test]
fn test_memoized_graph_matches_fresh_graph() {
    let repo = TestRepo::new();
    repo.build_stack(&["a", "b"]);
    repo.checkout("a");
    repo.build_stack(&["c"]);

    let git_repo = repo.open();
    let config = repo.config();
    let fresh = BranchGraph::new(&git_repo, &config).unwrap();
    let memo = BranchGraph::with_memo(&git_repo, &config).unwrap();

    for branch in ["main", "a", "b", "c"] {
        assert_eq!(
            memo.children_from_meta(branch).unwrap(),
            fresh.children_from_meta(branch).unwrap()
        );
        assert_eq!(
            memo.parents_from_ancestry(branch).unwrap(),
            fresh.parents_from_ancestry(branch).unwrap()
        );
        // Second lookup is served from the memo
        assert_eq!(
            memo.children_from_meta(branch).unwrap(),
            fresh.children_from_meta(branch).unwrap()
        );
    }
}

#[test]
fn test_all_branches_cutoff_and_cap() {
    let repo = TestRepo::new();
    repo.git(&["checkout", "-q", "-b", "stale"]);
    repo.commit_dated("stale.txt", "old\n", "Old work", "2020-01-01T00:00:00Z");
    repo.checkout("main");
    repo.build_stack(&["fresh1"]);
    repo.checkout("main");
    repo.build_stack(&["fresh2"]);

    let git_repo = repo.open();
    let graph = BranchGraph::new(&git_repo, &repo.config()).unwrap();

    let everything = graph.all_branches(|_| true, ListOptions::default()).unwrap();
    assert_eq!(everything, vec!["fresh1", "fresh2", "main", "stale"]);

    let recent = graph
        .all_branches(
            |_| true,
            ListOptions {
                max_days_behind_trunk: Some(30),
                max_branches: None,
            },
        )
        .unwrap();
    assert!(!recent.contains(&"stale".to_string()));
    assert_eq!(recent.len(), 3);

    let capped = graph
        .all_branches(
            |name| name != "main",
            ListOptions {
                max_days_behind_trunk: None,
                max_branches: Some(2),
            },
        )
        .unwrap();
    assert_eq!(capped, vec!["fresh1", "fresh2"]);
}

#[test]
fn test_ignored_branches_are_invisible() {
    let repo = TestRepo::new();
    repo.build_stack(&["a"]);
    repo.checkout("main");
    repo.git(&["branch", "wip/scratch"]);

    let git_repo = repo.open();
    let mut config: RepoConfig = repo.config();
    config.add_ignore_pattern("^wip/").unwrap();

    let graph = BranchGraph::new(&git_repo, &config).unwrap();
    assert!(graph.is_ignored("wip/scratch"));
    assert_eq!(graph.branch_names().unwrap(), vec!["a", "main"]);
    assert!(!graph
        .children_from_ancestry("main")
        .unwrap()
        .contains(&"wip/scratch".to_string()));
}
