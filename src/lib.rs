//! Salvor - crash recovery for delegated agent tasks.
//!
//! Salvor tracks long-running, delegated units of work spawned against a
//! version-controlled workspace, persists enough state to survive an abrupt
//! interruption of the controlling process, and on restart classifies what
//! state each task is in so a bounded, validated recovery action can be
//! chosen.
//!
//! Execution is single-threaded and synchronous: every inspection and
//! recovery action is a blocking call against the local filesystem, the git
//! subsystem, or the review host. Exactly one recovery flow is assumed to
//! be active against a workspace at a time; concurrent recovery attempts on
//! the same task record are not supported.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`store`] - Durable task record storage (flat, human-readable format)
//! - [`git`] - Read-only git state inspection
//! - [`scenario`] - Pure crash-scenario classification
//! - [`recover`] - Effect-then-verify recovery actions and composites
//! - [`report`] - Session pointer and structured crash-state reports
//! - [`review`] - Remote review-request seam (gh CLI in production)
//! - [`notes`] - Cross-session note store for audit visibility
//! - [`error`] - Custom error types and handling
//!
//! # Example
//!
//! ```rust,ignore
//! use salvor::git::GitInspector;
//! use salvor::report::{Reporter, SessionPointer};
//! use salvor::store::TaskStore;
//!
//! let store = TaskStore::open(TaskStore::default_dir(workspace))?;
//! let inspector = GitInspector::open(workspace)?;
//! let pointer = SessionPointer::load(&SessionPointer::default_path(workspace))?;
//!
//! // Classify the crash state and pick a recovery option from the report.
//! let report = Reporter::new(&store, &inspector).generate(&pointer)?;
//! println!("{}", report.to_json()?);
//! ```

pub mod error;
pub mod git;
pub mod notes;
pub mod recover;
pub mod report;
pub mod review;
pub mod scenario;
pub mod store;

// Re-export commonly used types
pub use error::{Result, SalvorError};

// Re-export store types
pub use store::{NoteLine, TaskField, TaskRecord, TaskStatus, TaskStore, TaskSummary};

// Re-export git types
pub use git::{GitInspector, GitStateSnapshot, DEFAULT_REFERENCE_BRANCH};

// Re-export classification types
pub use scenario::{classify, RecoveryOption, Scenario, ScenarioAnalysis};

// Re-export recovery types
pub use recover::{
    CleanupOutcome, DeleteBranchOutcome, PostWorkOutcome, RecoveryExecutor, StashApplyOutcome,
    StashOutcome,
};

// Re-export reporting types
pub use report::{BranchState, CrashReport, Reporter, ReviewState, SessionPointer, TaskContext};

// Re-export review types
pub use review::{GhReviewHost, MockReviewHost, ReviewHost, ReviewStatus};

// Re-export note store types
pub use notes::{NoteEntry, NoteStatus, NoteStore};
