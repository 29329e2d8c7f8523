//! Crash-state reporting.
//!
//! The reporter pulls one task's record from the store, fresh repository
//! facts from the inspector, and (when a review request is recorded) the
//! remote review state, then classifies the scenario and emits a single
//! structured [`CrashReport`]. Reporting is all-or-nothing: any failure
//! aborts the report instead of emitting a partial, misleading one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SalvorError};
use crate::git::{GitInspector, GitStateSnapshot, DEFAULT_REFERENCE_BRANCH};
use crate::review::{ReviewHost, ReviewStatus};
use crate::scenario::{classify, ScenarioAnalysis};
use crate::store::TaskStore;

// ============================================================================
// Session Pointer
// ============================================================================

/// Small key-value lookup of `{pointer_name -> task_id}`.
///
/// The session document that owns the "current task" pointer is an external
/// collaborator; this type is the explicit, injectable stand-in for it, so
/// multiple concurrent workspaces stay representable without a hidden
/// global.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPointer {
    #[serde(flatten)]
    pointers: BTreeMap<String, String>,
}

impl SessionPointer {
    /// Conventional pointer name for the active task.
    pub const CURRENT_TASK: &'static str = "current_task_id";

    /// The conventional pointer document location inside a workspace.
    #[must_use]
    pub fn default_path(workspace: &Path) -> PathBuf {
        workspace.join(".salvor").join("session.json")
    }

    /// Load a pointer document; a missing file is an empty pointer set.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Persist the pointer document.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Look up a pointer by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pointers.get(name).map(String::as_str)
    }

    /// Set a pointer.
    pub fn set(&mut self, name: impl Into<String>, task_id: impl Into<String>) {
        self.pointers.insert(name.into(), task_id.into());
    }

    /// Remove a pointer.
    pub fn clear(&mut self, name: &str) {
        self.pointers.remove(name);
    }
}

// ============================================================================
// Crash Report
// ============================================================================

/// Task-side context of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub model: String,
    pub prompt: String,
    pub last_good_commit: Option<String>,
    pub branch_name: Option<String>,
}

/// Facts about the task's branch, freshly computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchState {
    pub exists: bool,
    pub name: Option<String>,
    pub commits_ahead: u32,
}

/// Facts about the task's review request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewState {
    pub exists: bool,
    pub id: Option<String>,
    pub status: Option<ReviewStatus>,
}

/// The structured crash-state report consumed by a human or a delegating
/// caller. Serialized through one encoder, never assembled by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashReport {
    pub task_id: String,
    pub task_context: TaskContext,
    pub git_state: GitStateSnapshot,
    pub branch_state: BranchState,
    pub review_state: ReviewState,
    pub scenario_analysis: ScenarioAnalysis,
}

impl CrashReport {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Orchestrates store + inspector + classifier into a crash report.
pub struct Reporter<'a> {
    store: &'a TaskStore,
    git: &'a GitInspector,
    review: Option<&'a dyn ReviewHost>,
    reference_branch: String,
}

impl<'a> Reporter<'a> {
    /// Create a reporter over the given collaborators.
    ///
    /// Without a review host, reports for tasks that carry a `review_ref`
    /// fail rather than guessing at remote state.
    #[must_use]
    pub fn new(store: &'a TaskStore, git: &'a GitInspector) -> Self {
        Self {
            store,
            git,
            review: None,
            reference_branch: DEFAULT_REFERENCE_BRANCH.to_string(),
        }
    }

    /// Attach a review host for remote review-state queries.
    #[must_use]
    pub fn with_review_host(mut self, review: &'a dyn ReviewHost) -> Self {
        self.review = Some(review);
        self
    }

    /// Use a different reference branch than "main".
    #[must_use]
    pub fn with_reference_branch(mut self, reference: impl Into<String>) -> Self {
        self.reference_branch = reference.into();
        self
    }

    /// Generate a report for the task the session pointer names.
    ///
    /// # Errors
    ///
    /// `NoActiveTask` if the pointer is absent or names a task with no
    /// record; otherwise the same failures as [`Reporter::generate_for`].
    pub fn generate(&self, pointer: &SessionPointer) -> Result<CrashReport> {
        let task_id = pointer
            .get(SessionPointer::CURRENT_TASK)
            .ok_or_else(|| SalvorError::no_active_task("session pointer is not set"))?;

        match self.generate_for(task_id) {
            Err(SalvorError::NotFound { .. }) => Err(SalvorError::no_active_task(format!(
                "session pointer names task '{}' which has no record",
                task_id
            ))),
            other => other,
        }
    }

    /// Generate a report for an explicit task id.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no record exists for `task_id`.
    /// - `ValidationFailed` if the record fails integrity checks.
    /// - `RepositoryUnavailable` / `Git` / `ReviewHost` for collaborator
    ///   failures; no partial report is produced.
    pub fn generate_for(&self, task_id: &str) -> Result<CrashReport> {
        if !self.store.record_path(task_id).exists() {
            return Err(SalvorError::record_not_found(task_id));
        }
        if !self.store.validate(task_id) {
            return Err(SalvorError::validation(
                task_id,
                "record failed integrity check; repair it before reporting",
            ));
        }
        let record = self.store.read(task_id)?;
        debug!(task = %task_id, "building crash report");

        let git_state = self.git.snapshot(&self.reference_branch)?;

        let (branch_exists, commits_ahead) = match record.branch_name.as_deref() {
            Some(branch) => (
                self.git.branch_exists(branch)?,
                self.git.commits_ahead(branch, &self.reference_branch)?,
            ),
            None => (false, 0),
        };

        let review_status = match record.review_ref.as_deref() {
            Some(review_ref) => {
                let host = self.review.ok_or_else(|| {
                    SalvorError::review_host(
                        "review_status",
                        "task has a review request but no review host is configured",
                    )
                })?;
                Some(host.review_status(review_ref)?)
            }
            None => None,
        };

        let scenario_analysis = classify(
            record.branch_name.as_deref(),
            branch_exists,
            commits_ahead,
            record.review_ref.as_deref(),
        );

        Ok(CrashReport {
            task_id: record.id.clone(),
            task_context: TaskContext {
                model: record.model.clone(),
                prompt: record.prompt.clone(),
                last_good_commit: record.last_good_commit.clone(),
                branch_name: record.branch_name.clone(),
            },
            git_state,
            branch_state: BranchState {
                exists: branch_exists,
                name: record.branch_name.clone(),
                commits_ahead,
            },
            review_state: ReviewState {
                exists: record.review_ref.is_some(),
                id: record.review_ref.clone(),
                status: review_status,
            },
            scenario_analysis,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
