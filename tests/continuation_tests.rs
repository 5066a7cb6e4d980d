//! The persisted callstack as seen across separate invocations: its on-disk
//! form, resuming from frames alone, and refusal of inconsistent state.

use branchstack::stack::{
    Callstack, ContinuationFrame, InFlightRebase, Outcome, RestackScope, StackManager,
};
use branchstack::StackError;

#[path = "support/test_helpers.rs"]
mod test_helpers;

use test_helpers::TestRepo;

fn continuation_file(repo: &TestRepo) -> std::path::PathBuf {
    repo.git_dir().join("branchstack").join("continuation.json")
}

#[test]
fn test_suspended_restack_is_written_to_git_dir() {
    let repo = TestRepo::new();
    repo.build_stack(&["a", "b"]);
    repo.commit("README.md", "b version\n", "b edits readme");
    repo.build_stack(&["c"]);
    repo.checkout("main");
    repo.commit("README.md", "main version\n", "main edits readme");

    let git_repo = repo.open();
    let manager = StackManager::new(&git_repo).unwrap();
    let (_, outcome) = manager.restack("a", RestackScope::Upstack).unwrap();
    assert!(outcome.is_suspended());

    let path = continuation_file(&repo);
    assert_eq!(manager.callstack().path(), path.as_path());

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let frames = json.as_array().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["op"], "RESTACK_BRANCHES");
    assert_eq!(frames[0]["inFlight"]["branch"], "b");
    assert_eq!(frames[0]["inFlight"]["parentRevision"], repo.tip("a"));
    assert_eq!(frames[0]["remaining"], serde_json::json!(["c"]));
}

#[test]
fn test_frames_alone_drive_resume() {
    let repo = TestRepo::new();
    repo.build_stack(&["a", "b"]);
    repo.checkout("main");
    let main_tip = repo.commit("trunk.txt", "trunk\n", "Trunk moves");

    let git_repo = repo.open();
    Callstack::new(git_repo.git_dir())
        .save(&[ContinuationFrame::RestackBranches {
            in_flight: None,
            remaining: vec!["a".to_string(), "b".to_string()],
        }])
        .unwrap();

    let manager = StackManager::new(&git_repo).unwrap();
    assert_eq!(manager.continue_operation(false).unwrap(), Outcome::Completed);

    assert!(!continuation_file(&repo).exists());
    assert!(repo.is_ancestor(&main_tip, "a"));
    assert!(repo.is_ancestor("a", "b"));
}

#[test]
fn test_unknown_frame_is_fatal_and_kept() {
    let repo = TestRepo::new();
    let path = continuation_file(&repo);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"[{"op":"REWRITE_HISTORY","branch":"a"}]"#).unwrap();

    let git_repo = repo.open();
    let manager = StackManager::new(&git_repo).unwrap();

    assert!(matches!(
        manager.continue_operation(false),
        Err(StackError::ContinuationConsistency(_))
    ));
    assert!(path.exists());

    // Still blocks new work until explicitly abandoned
    assert!(matches!(
        manager.restack("main", RestackScope::Upstack),
        Err(StackError::PreconditionFailed(_))
    ));
    assert!(manager.abort_operation().unwrap());
    assert!(!path.exists());
}

#[test]
fn test_truncated_file_is_consistency_error() {
    let repo = TestRepo::new();
    let path = continuation_file(&repo);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"[{"op":"RESTACK_BRANCHES","remai"#).unwrap();

    let git_repo = repo.open();
    let manager = StackManager::new(&git_repo).unwrap();
    assert!(matches!(
        manager.pending_frames(),
        Err(StackError::ContinuationConsistency(_))
    ));
}

#[test]
fn test_continue_with_nothing_pending_fails() {
    let repo = TestRepo::new();
    let git_repo = repo.open();
    let manager = StackManager::new(&git_repo).unwrap();

    assert!(matches!(
        manager.continue_operation(false),
        Err(StackError::PreconditionFailed(_))
    ));
}

#[test]
fn test_rebase_that_never_landed_is_not_recorded() {
    let repo = TestRepo::new();
    repo.build_stack(&["a"]);
    let a_tip = repo.tip("a");
    repo.checkout("main");
    let main_tip = repo.commit("trunk.txt", "trunk\n", "Trunk moves");

    // Claims a was rebased onto the new trunk, but it never was
    let git_repo = repo.open();
    let frame = ContinuationFrame::StackOntoBaseRebase {
        in_flight: InFlightRebase {
            branch: "a".to_string(),
            parent: "main".to_string(),
            parent_revision: main_tip,
            prev_ref: a_tip.clone(),
        },
    };
    let callstack = Callstack::new(git_repo.git_dir());
    callstack.save(&[frame.clone()]).unwrap();

    let manager = StackManager::new(&git_repo).unwrap();
    assert!(matches!(
        manager.continue_operation(false),
        Err(StackError::PreconditionFailed(_))
    ));

    // Nothing recorded, frame kept for the operator to abort
    assert_eq!(callstack.peek_all().unwrap(), vec![frame]);
    let git_repo = repo.open();
    let meta = branchstack::stack::MetadataStore::new(&git_repo).get("a").unwrap();
    assert_ne!(meta.prev_ref, Some(a_tip));
}
