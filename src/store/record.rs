//! Task record types and status transitions.
//!
//! This module contains the core types for persisted task records:
//! - [`TaskRecord`] - One record per spawned task
//! - [`TaskStatus`] - Lifecycle status with forward-only transitions
//! - [`TaskField`] - Field names for the string-keyed compatibility shim
//! - [`NoteLine`] - One append-only note entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SalvorError};

// ============================================================================
// Task Status
// ============================================================================

/// Lifecycle status of a task record.
///
/// # Transitions
///
/// Transitions are forward-only:
///
/// - `Active` -> `Completed` | `Failed` | `Discarded`
/// - `Failed` -> `Discarded`
///
/// `Completed` and `Discarded` are terminal. Nothing resurrects a terminal
/// task back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is live and may still be worked on or recovered
    #[default]
    Active,
    /// Task finished and its work was accepted
    Completed,
    /// Task finished unsuccessfully
    Failed,
    /// Task was abandoned and its work discarded
    Discarded,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Discarded => "discarded",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for TaskStatus {
    type Err = SalvorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(TaskStatus::Active),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "discarded" => Ok(TaskStatus::Discarded),
            other => Err(SalvorError::invalid_argument(
                "status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

impl TaskStatus {
    /// Check if this status can transition to the target status.
    #[must_use]
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, target),
            (Active, Completed) | (Active, Failed) | (Active, Discarded) | (Failed, Discarded)
        )
    }

    /// Check if this status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Discarded)
    }
}

// ============================================================================
// Note Line
// ============================================================================

/// One append-only note entry on a task record.
///
/// Notes are never edited or removed individually; they go away only when
/// the whole record is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteLine {
    /// When the note was appended.
    pub timestamp: DateTime<Utc>,
    /// Note text. Embedded newlines are preserved through escaping in the
    /// on-disk format.
    pub text: String,
}

// ============================================================================
// Task Field
// ============================================================================

/// Field names accepted by the string-keyed `read_field`/`write_field` shim.
///
/// The typed [`TaskRecord`] is the primary representation; this enum exists
/// so that raw field names arriving from a CLI or a delegating caller are
/// checked once, here, instead of being substituted into the record blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskField {
    Id,
    CreatedAt,
    UpdatedAt,
    Model,
    Depth,
    ParentId,
    BranchName,
    ReviewRef,
    LastGoodCommit,
    Status,
}

impl TaskField {
    /// All known field names, for diagnostics.
    pub const ALL: &'static [&'static str] = &[
        "id",
        "created_at",
        "updated_at",
        "model",
        "depth",
        "parent_id",
        "branch_name",
        "review_ref",
        "last_good_commit",
        "status",
    ];

    /// The canonical on-disk name of this field.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            TaskField::Id => "id",
            TaskField::CreatedAt => "created_at",
            TaskField::UpdatedAt => "updated_at",
            TaskField::Model => "model",
            TaskField::Depth => "depth",
            TaskField::ParentId => "parent_id",
            TaskField::BranchName => "branch_name",
            TaskField::ReviewRef => "review_ref",
            TaskField::LastGoodCommit => "last_good_commit",
            TaskField::Status => "status",
        }
    }

    /// Whether the field may be written after creation.
    ///
    /// `last_good_commit` is writable exactly once; the write path enforces
    /// that separately.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        matches!(
            self,
            TaskField::BranchName
                | TaskField::ReviewRef
                | TaskField::LastGoodCommit
                | TaskField::Status
        )
    }
}

impl FromStr for TaskField {
    type Err = SalvorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "id" => Ok(TaskField::Id),
            "created_at" => Ok(TaskField::CreatedAt),
            "updated_at" => Ok(TaskField::UpdatedAt),
            "model" => Ok(TaskField::Model),
            "depth" => Ok(TaskField::Depth),
            "parent_id" => Ok(TaskField::ParentId),
            "branch_name" => Ok(TaskField::BranchName),
            "review_ref" => Ok(TaskField::ReviewRef),
            "last_good_commit" => Ok(TaskField::LastGoodCommit),
            "status" => Ok(TaskField::Status),
            other => Err(SalvorError::field_not_found(other)),
        }
    }
}

impl fmt::Display for TaskField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Task Record
// ============================================================================

/// Persistent metadata describing one spawned unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Opaque unique id, immutable, assigned at creation.
    pub id: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Bumped on every field mutation. Never decreases.
    pub updated_at: DateTime<Utc>,
    /// Who/what should execute the task. Immutable after creation.
    pub model: String,
    /// 0 for top-level tasks, incremented for tasks spawned under a parent.
    pub depth: u32,
    /// Weak reference to the parent record. Absent for depth 0.
    pub parent_id: Option<String>,
    /// Present only once a branch has been allocated for the task's work.
    pub branch_name: Option<String>,
    /// Opaque remote review-request identifier; absent until one is created.
    pub review_ref: Option<String>,
    /// Rollback anchor captured at spawn time. Written at most once.
    pub last_good_commit: Option<String>,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Free-text task description, immutable, round-trips byte-for-byte.
    pub prompt: String,
    /// Append-only notes.
    pub notes: Vec<NoteLine>,
}

impl TaskRecord {
    /// Build a new record from constructor inputs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `prompt` or `model` is empty, if `id` is
    /// empty, or if `depth` and `parent_id` disagree (depth 0 must have no
    /// parent, depth > 0 must have one).
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        model: impl Into<String>,
        depth: u32,
        parent_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let id = id.into();
        let prompt = prompt.into();
        let model = model.into();

        if id.trim().is_empty() {
            return Err(SalvorError::invalid_argument("id", "must not be empty"));
        }
        if prompt.is_empty() {
            return Err(SalvorError::invalid_argument("prompt", "must not be empty"));
        }
        if model.trim().is_empty() {
            return Err(SalvorError::invalid_argument("model", "must not be empty"));
        }
        match (&parent_id, depth) {
            (Some(_), 0) => {
                return Err(SalvorError::invalid_argument(
                    "parent_id",
                    "depth 0 tasks must not have a parent",
                ));
            }
            (None, d) if d > 0 => {
                return Err(SalvorError::invalid_argument(
                    "parent_id",
                    "tasks with depth > 0 must have a parent",
                ));
            }
            _ => {}
        }

        Ok(Self {
            id,
            created_at: now,
            updated_at: now,
            model,
            depth,
            parent_id,
            branch_name: None,
            review_ref: None,
            last_good_commit: None,
            status: TaskStatus::Active,
            prompt,
            notes: Vec::new(),
        })
    }

    /// Read a field's value as text.
    ///
    /// Returns `None` for optional fields that are currently unset.
    #[must_use]
    pub fn field_value(&self, field: TaskField) -> Option<String> {
        match field {
            TaskField::Id => Some(self.id.clone()),
            TaskField::CreatedAt => Some(self.created_at.to_rfc3339()),
            TaskField::UpdatedAt => Some(self.updated_at.to_rfc3339()),
            TaskField::Model => Some(self.model.clone()),
            TaskField::Depth => Some(self.depth.to_string()),
            TaskField::ParentId => self.parent_id.clone(),
            TaskField::BranchName => self.branch_name.clone(),
            TaskField::ReviewRef => self.review_ref.clone(),
            TaskField::LastGoodCommit => self.last_good_commit.clone(),
            TaskField::Status => Some(self.status.to_string()),
        }
    }

    /// Write a field's value from text, enforcing mutability rules.
    ///
    /// Bumps `updated_at` to `now` on success.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for writes to immutable fields, a second write to
    ///   `last_good_commit`, a malformed status value, or a status
    ///   transition that would move backwards.
    pub fn set_field(&mut self, field: TaskField, value: &str, now: DateTime<Utc>) -> Result<()> {
        if !field.is_writable() {
            return Err(SalvorError::invalid_argument(
                field.name(),
                "field is immutable after creation",
            ));
        }

        match field {
            TaskField::BranchName => {
                self.branch_name = Some(value.to_string());
            }
            TaskField::ReviewRef => {
                self.review_ref = Some(value.to_string());
            }
            TaskField::LastGoodCommit => {
                if self.last_good_commit.is_some() {
                    return Err(SalvorError::invalid_argument(
                        "last_good_commit",
                        "rollback anchor is already set and never mutated",
                    ));
                }
                self.last_good_commit = Some(value.to_string());
            }
            TaskField::Status => {
                let target: TaskStatus = value.parse()?;
                self.set_status(target)?;
            }
            _ => unreachable!("is_writable() gates the remaining fields"),
        }

        if now > self.updated_at {
            self.updated_at = now;
        }
        Ok(())
    }

    /// Transition to a new status, rejecting backward moves.
    ///
    /// Setting the current status again is a no-op.
    pub fn set_status(&mut self, target: TaskStatus) -> Result<()> {
        if self.status == target {
            return Ok(());
        }
        if !self.status.can_transition_to(target) {
            return Err(SalvorError::invalid_argument(
                "status",
                format!("illegal transition {} -> {}", self.status, target),
            ));
        }
        self.status = target;
        Ok(())
    }

    /// Append a note and bump `updated_at`.
    pub fn push_note(&mut self, text: impl Into<String>, now: DateTime<Utc>) {
        self.notes.push(NoteLine {
            timestamp: now,
            text: text.into(),
        });
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// One-line summary used by `list`.
    #[must_use]
    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id.clone(),
            status: self.status,
            model: self.model.clone(),
            created_at: self.created_at,
        }
    }
}

/// Listing summary for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub status: TaskStatus,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================
