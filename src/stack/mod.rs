//! Stacked branch management
//!
//! - Branch metadata kept under `refs/branch-metadata/`
//! - The branch graph built from metadata and from commit ancestry
//! - Rebasing and restacking branches onto their parents
//! - The persisted continuation callstack for suspended operations

pub mod continuation;
pub mod graph;
pub mod manager;
pub mod metadata;
pub mod rebase;
pub mod restack;

pub use continuation::{BranchEdit, BranchMove, Callstack, ContinuationFrame, InFlightRebase, Outcome};
pub use graph::{BranchGraph, ListOptions};
pub use manager::{StackManager, SyncOptions};
pub use metadata::{BranchMetadata, MetadataPatch, MetadataStore, PrInfo, PrState, PriorSubmitInfo};
pub use rebase::{parse_todo, RebaseEngine, RebaseStatus, TodoAction, TodoItem};
pub use restack::{RestackReport, RestackScope, Restacker};
