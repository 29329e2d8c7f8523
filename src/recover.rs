//! Recovery action execution.
//!
//! Every exposed action follows one contract: perform the effect, then
//! verify an explicit post-condition. A failed post-condition is fatal to
//! the current recovery attempt - there are no automatic retries, and a
//! composite procedure stops at the first failed step, leaving the record
//! and repository in the last successfully validated state.
//!
//! # Safety
//!
//! `reset_to_commit` and `delete_branch` are destructive and not reversible
//! by this system. Callers confirm before invoking them.

use std::process::Command;

use tracing::{debug, info, warn};

use crate::error::{Result, SalvorError};
use crate::git::GitInspector;
use crate::notes::NoteStore;
use crate::review::{ReviewHost, ReviewStatus};
use crate::store::{TaskRecord, TaskStore};

// ============================================================================
// Action Outcomes
// ============================================================================

/// Outcome of `delete_branch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteBranchOutcome {
    /// The branch existed and was removed.
    Deleted,
    /// Nothing to do: no branch recorded, or it no longer exists.
    AlreadyAbsent,
}

/// Outcome of `stash_changes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StashOutcome {
    /// The working tree was already clean; nothing stashed.
    AlreadyClean,
    /// Uncommitted changes were saved aside.
    Stashed,
}

/// Outcome of `apply_stash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StashApplyOutcome {
    /// No stash existed; nothing applied.
    NoStash,
    /// The most recent stash was reapplied (and dropped).
    Applied,
}

/// Result of `cleanup_orphaned_task`.
#[derive(Debug, Clone)]
pub struct CleanupOutcome {
    /// The task that was cleaned up.
    pub task_id: String,
    /// What `delete_branch` found to do.
    pub branch: DeleteBranchOutcome,
}

impl CleanupOutcome {
    /// Format a summary for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let branch = match self.branch {
            DeleteBranchOutcome::Deleted => "branch deleted",
            DeleteBranchOutcome::AlreadyAbsent => "branch already absent",
        };
        format!("task {} discarded ({})", self.task_id, branch)
    }
}

/// Result of `post_work_recovery`.
#[derive(Debug, Clone)]
pub struct PostWorkOutcome {
    /// The task that was recovered.
    pub task_id: String,
    /// Whether uncommitted changes had to be stashed.
    pub stashed: bool,
    /// Whether a stash was reapplied after the rebase.
    pub reapplied: bool,
}

impl PostWorkOutcome {
    /// Format a summary for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let stash = match (self.stashed, self.reapplied) {
            (true, true) => "uncommitted changes carried across",
            (true, false) => "stash saved but not reapplied",
            _ => "working tree was clean",
        };
        format!("task {} rebased onto reference ({})", self.task_id, stash)
    }
}

// ============================================================================
// Recovery Executor
// ============================================================================

/// Runs recovery actions against one workspace.
///
/// Holds the store, a read-only inspector, and the review host; mutating
/// git commands run through its own checked wrapper. The note store is
/// optional: when attached, composite procedures leave a cross-session
/// audit entry on completion or failure.
pub struct RecoveryExecutor<'a> {
    store: &'a TaskStore,
    git: &'a GitInspector,
    review: Option<&'a dyn ReviewHost>,
    notes: Option<&'a NoteStore>,
    reference_branch: String,
}

impl<'a> RecoveryExecutor<'a> {
    /// Create an executor over the given collaborators.
    ///
    /// Without a review host, the review-facing actions fail rather than
    /// guessing at remote state.
    #[must_use]
    pub fn new(store: &'a TaskStore, git: &'a GitInspector) -> Self {
        Self {
            store,
            git,
            review: None,
            notes: None,
            reference_branch: crate::git::DEFAULT_REFERENCE_BRANCH.to_string(),
        }
    }

    /// Attach a review host for review-request actions.
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

    /// Attach a note store for cross-session audit entries.
    #[must_use]
    pub fn with_note_store(mut self, notes: &'a NoteStore) -> Self {
        self.notes = Some(notes);
        self
    }

    // ------------------------------------------------------------------------
    // Atomic actions
    // ------------------------------------------------------------------------

    /// Hard-reset the working tree and history pointer to `commit`.
    ///
    /// Post-condition: the head commit equals `commit` exactly.
    pub fn reset_to_commit(&self, record: &TaskRecord, commit: &str) -> Result<()> {
        // Resolve up front so a bad target is a git error, not a
        // post-condition failure after a destructive reset.
        let revspec = format!("{}^{{commit}}", commit);
        let target = self.git_cmd("reset_to_commit", &["rev-parse", "--verify", &revspec])?;

        info!(task = %record.id, commit = %target, "hard reset");
        self.git_cmd("reset_to_commit", &["reset", "--hard", &target])?;

        let head = self.git.head_commit()?;
        if head != target {
            return Err(SalvorError::postcondition(
                "reset_to_commit",
                format!("HEAD at {}", target),
                format!("HEAD at {}", head),
            ));
        }
        Ok(())
    }

    /// Remove the record's branch if present.
    ///
    /// Idempotent: succeeds without repository change when the record has no
    /// branch or the branch no longer exists.
    ///
    /// Post-condition: the branch no longer exists.
    pub fn delete_branch(&self, record: &TaskRecord) -> Result<DeleteBranchOutcome> {
        let branch = match &record.branch_name {
            Some(b) => b.clone(),
            None => {
                debug!(task = %record.id, "no branch recorded, nothing to delete");
                return Ok(DeleteBranchOutcome::AlreadyAbsent);
            }
        };

        if !self.git.branch_exists(&branch)? {
            debug!(task = %record.id, %branch, "branch already absent");
            return Ok(DeleteBranchOutcome::AlreadyAbsent);
        }

        info!(task = %record.id, %branch, "deleting branch");
        self.git_cmd("delete_branch", &["branch", "-D", &branch])?;

        if self.git.branch_exists(&branch)? {
            return Err(SalvorError::postcondition(
                "delete_branch",
                format!("branch '{}' absent", branch),
                "branch still exists".to_string(),
            ));
        }
        Ok(DeleteBranchOutcome::Deleted)
    }

    /// Set the record's status to discarded and append an audit note.
    ///
    /// Durability is the store's own guarantee; no extra check here.
    pub fn mark_discarded(&self, record: &TaskRecord) -> Result<()> {
        self.store.write_field(&record.id, "status", "discarded")?;
        self.store
            .append_note(&record.id, "discarded during crash recovery")?;
        info!(task = %record.id, "marked discarded");
        Ok(())
    }

    /// Append an audit note documenting cleanup. Never deletes the record.
    ///
    /// Post-condition: the record is still present and readable.
    pub fn cleanup_record(&self, record: &TaskRecord) -> Result<()> {
        self.store
            .append_note(&record.id, "cleanup completed, record retained for audit")?;

        if !self.store.validate(&record.id) {
            return Err(SalvorError::postcondition(
                "cleanup_record",
                "record present and readable",
                "record missing or failing integrity check",
            ));
        }
        Ok(())
    }

    /// Save uncommitted changes aside.
    ///
    /// No-op success when the tree is already clean.
    ///
    /// Post-condition: the working tree reports clean.
    pub fn stash_changes(&self, record: &TaskRecord) -> Result<StashOutcome> {
        if self.git.is_clean()? {
            debug!(task = %record.id, "working tree already clean, skipping stash");
            return Ok(StashOutcome::AlreadyClean);
        }

        let message = format!("salvor stash for {}", record.id);
        info!(task = %record.id, "stashing uncommitted changes");
        self.git_cmd(
            "stash_changes",
            &["stash", "push", "--include-untracked", "-m", &message],
        )?;

        if !self.git.is_clean()? {
            return Err(SalvorError::postcondition(
                "stash_changes",
                "clean working tree",
                "uncommitted changes remain",
            ));
        }
        Ok(StashOutcome::Stashed)
    }

    /// Fetch the latest reference branch and replay the record's branch
    /// commits onto it.
    ///
    /// On conflict the rebase is aborted and reported as failure; the
    /// repository is never left mid-rebase.
    ///
    /// Post-condition: HEAD is resolvable and no rebase state remains.
    pub fn rebase_on_main(&self, record: &TaskRecord) -> Result<()> {
        let branch = record.branch_name.as_deref().ok_or_else(|| {
            SalvorError::invalid_argument("branch_name", "no branch allocated for this task")
        })?;
        if !self.git.branch_exists(branch)? {
            return Err(SalvorError::branch_not_found(branch));
        }

        if self.has_remote("origin")? {
            info!(reference = %self.reference_branch, "fetching reference branch");
            self.git_cmd(
                "rebase_on_main",
                &["fetch", "origin", &self.reference_branch],
            )?;
        }

        info!(task = %record.id, branch, reference = %self.reference_branch, "rebasing");
        let rebase = self.git_cmd("rebase_on_main", &["rebase", &self.reference_branch, branch]);

        if let Err(e) = rebase {
            warn!(task = %record.id, error = %e, "rebase failed, aborting");
            if let Err(abort_err) = self.git_cmd("rebase_abort", &["rebase", "--abort"]) {
                debug!(error = %abort_err, "rebase --abort reported an error");
            }
            if self.rebase_in_progress()? {
                return Err(SalvorError::postcondition(
                    "rebase_on_main",
                    "no rebase in progress after abort",
                    "repository still mid-rebase",
                ));
            }
            return Err(e);
        }

        let _head = self.git.head_commit()?;
        if self.rebase_in_progress()? {
            return Err(SalvorError::postcondition(
                "rebase_on_main",
                "rebase fully completed",
                "rebase state still present",
            ));
        }
        Ok(())
    }

    /// Reapply the most recently saved stash.
    ///
    /// No-op success when no stash exists. On conflict git retains the
    /// stash and the failure is reported with that fact.
    pub fn apply_stash(&self, record: &TaskRecord) -> Result<StashApplyOutcome> {
        let list = self.git_cmd("apply_stash", &["stash", "list"])?;
        if list.is_empty() {
            debug!(task = %record.id, "no stash to apply");
            return Ok(StashApplyOutcome::NoStash);
        }

        info!(task = %record.id, "reapplying stashed changes");
        match self.git_cmd("apply_stash", &["stash", "pop"]) {
            Ok(_) => Ok(StashApplyOutcome::Applied),
            Err(e) => Err(SalvorError::git(
                "apply_stash",
                format!("stash apply conflicted; stash retained: {}", e),
            )),
        }
    }

    /// Open a remote review request for the record's branch and persist the
    /// returned identifier.
    ///
    /// Post-condition: `review_ref` is present on the stored record.
    pub fn create_review_request(&self, record: &TaskRecord) -> Result<String> {
        let branch = record.branch_name.as_deref().ok_or_else(|| {
            SalvorError::invalid_argument("branch_name", "no branch allocated for this task")
        })?;

        let title = record
            .prompt
            .lines()
            .next()
            .unwrap_or(&record.id)
            .to_string();
        let body = format!(
            "Automated work for task {} (model: {}).\n\n{}",
            record.id, record.model, record.prompt
        );

        let host = self.review.ok_or_else(|| {
            SalvorError::review_host("create_review_request", "no review host configured")
        })?;
        let review_ref = host.create_review_request(branch, &title, &body)?;
        self.store
            .write_field(&record.id, "review_ref", &review_ref)?;
        self.store.append_note(
            &record.id,
            &format!("review request {} created for {}", review_ref, branch),
        )?;

        let stored = self.store.read(&record.id)?;
        if stored.review_ref.as_deref() != Some(review_ref.as_str()) {
            return Err(SalvorError::postcondition(
                "create_review_request",
                format!("review_ref '{}' persisted", review_ref),
                "record does not carry the new review_ref",
            ));
        }
        info!(task = %record.id, %review_ref, "review request created");
        Ok(review_ref)
    }

    /// Query remote review state. Never mutates the record.
    pub fn check_review_status(&self, record: &TaskRecord) -> Result<ReviewStatus> {
        let review_ref = record
            .review_ref
            .as_deref()
            .ok_or_else(|| SalvorError::field_not_found("review_ref"))?;
        let host = self.review.ok_or_else(|| {
            SalvorError::review_host("check_review_status", "no review host configured")
        })?;
        host.review_status(review_ref)
    }

    // ------------------------------------------------------------------------
    // Composite procedures
    // ------------------------------------------------------------------------

    /// `delete_branch` -> `mark_discarded` -> `cleanup_record`.
    ///
    /// The first failed step aborts the remainder.
    pub fn cleanup_orphaned_task(&self, record: &TaskRecord) -> Result<CleanupOutcome> {
        let result: Result<CleanupOutcome> = (|| {
            let branch = self.delete_branch(record)?;
            self.mark_discarded(record)?;
            self.cleanup_record(record)?;
            Ok(CleanupOutcome {
                task_id: record.id.clone(),
                branch,
            })
        })();

        match &result {
            Ok(outcome) => self.audit_note(record, "cleanup_orphaned_task", &outcome.summary()),
            Err(e) => self.audit_note(
                record,
                "cleanup_orphaned_task failed",
                &format!("aborted: {}", e),
            ),
        }
        result
    }

    /// `stash_changes` -> `rebase_on_main` -> `apply_stash`.
    ///
    /// If the rebase fails after changes were stashed, the stash remains
    /// saved and the failure says so instead of silently dropping it.
    pub fn post_work_recovery(&self, record: &TaskRecord) -> Result<PostWorkOutcome> {
        let stashed = self.stash_changes(record)? == StashOutcome::Stashed;

        if let Err(e) = self.rebase_on_main(record) {
            self.audit_note(
                record,
                "post_work_recovery failed",
                &format!("rebase aborted: {}", e),
            );
            if stashed {
                return Err(SalvorError::Other(anyhow::Error::new(e).context(
                    "rebase failed; stashed changes are retained (see `git stash list`)",
                )));
            }
            return Err(e);
        }

        let reapplied = self.apply_stash(record)? == StashApplyOutcome::Applied;

        let outcome = PostWorkOutcome {
            task_id: record.id.clone(),
            stashed,
            reapplied,
        };
        self.audit_note(record, "post_work_recovery", &outcome.summary());
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Leave a cross-session audit entry when a note store is attached.
    /// Failures here must not mask the recovery result.
    fn audit_note(&self, record: &TaskRecord, hint: &str, content: &str) {
        if let Some(notes) = self.notes {
            if let Err(e) = notes.append("salvor", hint, format!("{}: {}", record.id, content)) {
                warn!(task = %record.id, error = %e, "failed to write audit note");
            }
        }
    }

    fn has_remote(&self, name: &str) -> Result<bool> {
        let remotes = self.git_cmd("remote", &["remote"])?;
        Ok(remotes.lines().any(|r| r.trim() == name))
    }

    fn rebase_in_progress(&self) -> Result<bool> {
        for state_dir in ["rebase-merge", "rebase-apply"] {
            let path = self.git_cmd("rebase_state", &["rev-parse", "--git-path", state_dir])?;
            if self.git.repo_dir().join(&path).exists() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run a mutating git command, mapping failure to a git error.
    fn git_cmd(&self, operation: &str, args: &[&str]) -> Result<String> {
        debug!(?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(self.git.repo_dir())
            .output()
            .map_err(|e| {
                SalvorError::repository_unavailable(format!("failed to execute git: {}", e))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SalvorError::git(operation, stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::MockReviewHost;
    use crate::store::TaskStatus;
    use std::path::Path;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .expect("run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn git_stdout(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .expect("run git");
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// A workspace with a git repo, a task store, and one active record.
    struct Fixture {
        dir: TempDir,
        store: TaskStore,
        git: GitInspector,
        review: MockReviewHost,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().expect("create temp dir");
            git(dir.path(), &["init"]);
            git(dir.path(), &["config", "user.email", "test@test.com"]);
            git(dir.path(), &["config", "user.name", "Test"]);
            std::fs::write(dir.path().join("README.md"), "# Test").expect("write readme");
            git(dir.path(), &["add", "."]);
            git(dir.path(), &["commit", "-m", "Initial commit"]);
            git(dir.path(), &["branch", "-M", "main"]);

            let store =
                TaskStore::open(dir.path().join(".salvor").join("tasks")).expect("open store");
            let git = GitInspector::open(dir.path()).expect("open inspector");
            Self {
                dir,
                store,
                git,
                review: MockReviewHost::new().with_created_id("42"),
            }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn executor(&self) -> RecoveryExecutor<'_> {
            RecoveryExecutor::new(&self.store, &self.git).with_review_host(&self.review)
        }

        fn spawn_task(&self, id: &str, branch: Option<&str>) -> TaskRecord {
            self.store
                .create(id, "Do the work.\n\nDetails here.", "sonnet", 0, None)
                .expect("create record");
            if let Some(branch) = branch {
                self.store
                    .write_field(id, "branch_name", branch)
                    .expect("set branch");
            }
            self.store.read(id).expect("read record")
        }

        fn commit_file(&self, name: &str, content: &str, message: &str) {
            std::fs::write(self.path().join(name), content).expect("write file");
            git(self.path(), &["add", "."]);
            git(self.path(), &["commit", "-m", message]);
        }
    }

    // ------------------------------------------------------------------------
    // reset_to_commit
    // ------------------------------------------------------------------------

    #[test]
    fn test_reset_to_commit_restores_head() {
        let fx = Fixture::new();
        let record = fx.spawn_task("t-1", None);
        let anchor = git_stdout(fx.path(), &["rev-parse", "HEAD"]);

        fx.commit_file("extra.txt", "x", "extra work");
        assert_ne!(git_stdout(fx.path(), &["rev-parse", "HEAD"]), anchor);

        fx.executor().reset_to_commit(&record, &anchor).unwrap();
        assert_eq!(git_stdout(fx.path(), &["rev-parse", "HEAD"]), anchor);
    }

    #[test]
    fn test_reset_to_commit_unknown_target() {
        let fx = Fixture::new();
        let record = fx.spawn_task("t-1", None);
        let head_before = git_stdout(fx.path(), &["rev-parse", "HEAD"]);

        let err = fx
            .executor()
            .reset_to_commit(&record, &"f".repeat(40))
            .unwrap_err();
        assert!(matches!(err, SalvorError::Git { .. }));
        // A bad target must not move HEAD.
        assert_eq!(git_stdout(fx.path(), &["rev-parse", "HEAD"]), head_before);
    }

    // ------------------------------------------------------------------------
    // delete_branch
    // ------------------------------------------------------------------------

    #[test]
    fn test_delete_branch_removes_branch() {
        let fx = Fixture::new();
        git(fx.path(), &["branch", "task/t-1"]);
        let record = fx.spawn_task("t-1", Some("task/t-1"));

        let outcome = fx.executor().delete_branch(&record).unwrap();
        assert_eq!(outcome, DeleteBranchOutcome::Deleted);
        assert!(!fx.git.branch_exists("task/t-1").unwrap());
    }

    #[test]
    fn test_delete_branch_idempotent() {
        let fx = Fixture::new();
        git(fx.path(), &["branch", "task/t-1"]);
        let record = fx.spawn_task("t-1", Some("task/t-1"));

        assert_eq!(
            fx.executor().delete_branch(&record).unwrap(),
            DeleteBranchOutcome::Deleted
        );
        // Second call and a never-existed branch both succeed quietly.
        assert_eq!(
            fx.executor().delete_branch(&record).unwrap(),
            DeleteBranchOutcome::AlreadyAbsent
        );
        let ghost = fx.spawn_task("t-2", Some("task/never-created"));
        assert_eq!(
            fx.executor().delete_branch(&ghost).unwrap(),
            DeleteBranchOutcome::AlreadyAbsent
        );
    }

    #[test]
    fn test_delete_branch_without_recorded_branch() {
        let fx = Fixture::new();
        let record = fx.spawn_task("t-1", None);
        assert_eq!(
            fx.executor().delete_branch(&record).unwrap(),
            DeleteBranchOutcome::AlreadyAbsent
        );
    }

    // ------------------------------------------------------------------------
    // mark_discarded / cleanup_record
    // ------------------------------------------------------------------------

    #[test]
    fn test_mark_discarded_sets_status_and_note() {
        let fx = Fixture::new();
        let record = fx.spawn_task("t-1", None);
        fx.executor().mark_discarded(&record).unwrap();

        let stored = fx.store.read("t-1").unwrap();
        assert_eq!(stored.status, TaskStatus::Discarded);
        assert!(stored.notes.iter().any(|n| n.text.contains("discarded")));
    }

    #[test]
    fn test_cleanup_record_keeps_record() {
        let fx = Fixture::new();
        let record = fx.spawn_task("t-1", None);
        fx.executor().cleanup_record(&record).unwrap();

        assert!(fx.store.validate("t-1"));
        let stored = fx.store.read("t-1").unwrap();
        assert!(stored.notes.iter().any(|n| n.text.contains("cleanup")));
    }

    // ------------------------------------------------------------------------
    // stash_changes / apply_stash
    // ------------------------------------------------------------------------

    #[test]
    fn test_stash_changes_noop_when_clean() {
        let fx = Fixture::new();
        let record = fx.spawn_task("t-1", None);
        assert_eq!(
            fx.executor().stash_changes(&record).unwrap(),
            StashOutcome::AlreadyClean
        );
    }

    #[test]
    fn test_stash_then_apply_roundtrip() {
        let fx = Fixture::new();
        let record = fx.spawn_task("t-1", None);
        std::fs::write(fx.path().join("wip.txt"), "work in progress").unwrap();

        assert_eq!(
            fx.executor().stash_changes(&record).unwrap(),
            StashOutcome::Stashed
        );
        assert!(fx.git.is_clean().unwrap());
        assert!(!fx.path().join("wip.txt").exists());

        assert_eq!(
            fx.executor().apply_stash(&record).unwrap(),
            StashApplyOutcome::Applied
        );
        assert!(fx.path().join("wip.txt").exists());
    }

    #[test]
    fn test_apply_stash_noop_without_stash() {
        let fx = Fixture::new();
        let record = fx.spawn_task("t-1", None);
        assert_eq!(
            fx.executor().apply_stash(&record).unwrap(),
            StashApplyOutcome::NoStash
        );
    }

    // ------------------------------------------------------------------------
    // rebase_on_main
    // ------------------------------------------------------------------------

    #[test]
    fn test_rebase_replays_branch_commits() {
        let fx = Fixture::new();
        git(fx.path(), &["checkout", "-b", "task/t-1"]);
        fx.commit_file("feature.txt", "feature", "task work");
        git(fx.path(), &["checkout", "main"]);
        fx.commit_file("mainline.txt", "mainline", "main advanced");

        let record = fx.spawn_task("t-1", Some("task/t-1"));
        fx.executor().rebase_on_main(&record).unwrap();

        // Branch now sits on top of main: exactly one commit ahead.
        assert_eq!(fx.git.commits_ahead("task/t-1", "main").unwrap(), 1);
        assert!(fx.path().join("mainline.txt").exists());
    }

    #[test]
    fn test_rebase_conflict_aborts_cleanly() {
        let fx = Fixture::new();
        git(fx.path(), &["checkout", "-b", "task/t-1"]);
        fx.commit_file("README.md", "# task version", "task change");
        git(fx.path(), &["checkout", "main"]);
        fx.commit_file("README.md", "# main version", "main change");

        let record = fx.spawn_task("t-1", Some("task/t-1"));
        let err = fx.executor().rebase_on_main(&record).unwrap_err();
        assert!(matches!(err, SalvorError::Git { .. }));

        // No rebase state left behind; HEAD still resolvable.
        assert!(!fx.path().join(".git/rebase-merge").exists());
        assert!(!fx.path().join(".git/rebase-apply").exists());
        assert!(!git_stdout(fx.path(), &["rev-parse", "HEAD"]).is_empty());
    }

    #[test]
    fn test_rebase_requires_branch() {
        let fx = Fixture::new();
        let record = fx.spawn_task("t-1", None);
        let err = fx.executor().rebase_on_main(&record).unwrap_err();
        assert!(matches!(err, SalvorError::InvalidArgument { .. }));

        let ghost = fx.spawn_task("t-2", Some("task/never-created"));
        let err = fx.executor().rebase_on_main(&ghost).unwrap_err();
        assert!(matches!(err, SalvorError::NotFound { .. }));
    }

    // ------------------------------------------------------------------------
    // review actions
    // ------------------------------------------------------------------------

    #[test]
    fn test_create_review_request_persists_ref() {
        let fx = Fixture::new();
        git(fx.path(), &["branch", "task/t-1"]);
        let record = fx.spawn_task("t-1", Some("task/t-1"));

        let review_ref = fx.executor().create_review_request(&record).unwrap();
        assert_eq!(review_ref, "42");

        let stored = fx.store.read("t-1").unwrap();
        assert_eq!(stored.review_ref.as_deref(), Some("42"));
        assert!(stored.notes.iter().any(|n| n.text.contains("42")));
    }

    #[test]
    fn test_create_review_request_requires_branch() {
        let fx = Fixture::new();
        let record = fx.spawn_task("t-1", None);
        let err = fx.executor().create_review_request(&record).unwrap_err();
        assert!(matches!(err, SalvorError::InvalidArgument { .. }));
    }

    #[test]
    fn test_create_review_request_host_failure_leaves_record() {
        let fx = Fixture::new();
        let review = MockReviewHost::new().with_create_error("rate limited");
        let record = fx.spawn_task("t-1", Some("task/t-1"));

        let executor = RecoveryExecutor::new(&fx.store, &fx.git).with_review_host(&review);
        assert!(executor.create_review_request(&record).is_err());
        assert!(fx.store.read("t-1").unwrap().review_ref.is_none());
    }

    #[test]
    fn test_check_review_status_reads_only() {
        let fx = Fixture::new();
        let review = MockReviewHost::new().with_status(ReviewStatus::Merged);
        let record = fx.spawn_task("t-1", Some("task/t-1"));
        fx.store.write_field("t-1", "review_ref", "42").unwrap();
        let record = fx.store.read("t-1").unwrap();
        let before = record.clone();

        let executor = RecoveryExecutor::new(&fx.store, &fx.git).with_review_host(&review);
        assert_eq!(
            executor.check_review_status(&record).unwrap(),
            ReviewStatus::Merged
        );
        assert_eq!(fx.store.read("t-1").unwrap(), before);
    }

    #[test]
    fn test_check_review_status_requires_ref() {
        let fx = Fixture::new();
        let record = fx.spawn_task("t-1", None);
        let err = fx.executor().check_review_status(&record).unwrap_err();
        assert!(matches!(err, SalvorError::NotFound { .. }));
    }

    // ------------------------------------------------------------------------
    // composite procedures
    // ------------------------------------------------------------------------

    #[test]
    fn test_cleanup_orphaned_task_with_missing_branch() {
        let fx = Fixture::new();
        let record = fx.spawn_task("t-1", Some("task/never-created"));

        let outcome = fx.executor().cleanup_orphaned_task(&record).unwrap();
        assert_eq!(outcome.branch, DeleteBranchOutcome::AlreadyAbsent);
        assert_eq!(fx.store.read("t-1").unwrap().status, TaskStatus::Discarded);
        assert!(fx.store.validate("t-1"));
    }

    #[test]
    fn test_cleanup_orphaned_task_deletes_real_branch() {
        let fx = Fixture::new();
        git(fx.path(), &["branch", "task/t-1"]);
        let record = fx.spawn_task("t-1", Some("task/t-1"));

        let outcome = fx.executor().cleanup_orphaned_task(&record).unwrap();
        assert_eq!(outcome.branch, DeleteBranchOutcome::Deleted);
        assert!(!fx.git.branch_exists("task/t-1").unwrap());
        assert_eq!(fx.store.read("t-1").unwrap().status, TaskStatus::Discarded);
    }

    #[test]
    fn test_cleanup_writes_audit_note_when_attached() {
        let fx = Fixture::new();
        let notes = NoteStore::open(fx.path().join(".salvor/notes.jsonl")).unwrap();
        let record = fx.spawn_task("t-1", None);

        let executor = fx.executor();
        let executor = executor.with_note_store(&notes);
        executor.cleanup_orphaned_task(&record).unwrap();

        let entries = notes.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].short_hint.contains("cleanup_orphaned_task"));
        assert!(entries[0].content.contains("t-1"));
    }

    #[test]
    fn test_post_work_recovery_clean_tree() {
        let fx = Fixture::new();
        git(fx.path(), &["checkout", "-b", "task/t-1"]);
        fx.commit_file("feature.txt", "feature", "task work");
        git(fx.path(), &["checkout", "main"]);
        fx.commit_file("mainline.txt", "mainline", "main advanced");

        let record = fx.spawn_task("t-1", Some("task/t-1"));
        let outcome = fx.executor().post_work_recovery(&record).unwrap();

        assert!(!outcome.stashed);
        assert!(!outcome.reapplied);
        assert_eq!(fx.git.commits_ahead("task/t-1", "main").unwrap(), 1);
    }

    #[test]
    fn test_post_work_recovery_carries_dirty_tree() {
        let fx = Fixture::new();
        git(fx.path(), &["checkout", "-b", "task/t-1"]);
        fx.commit_file("feature.txt", "feature", "task work");
        git(fx.path(), &["checkout", "main"]);
        fx.commit_file("mainline.txt", "mainline", "main advanced");
        git(fx.path(), &["checkout", "task/t-1"]);
        std::fs::write(fx.path().join("wip.txt"), "uncommitted").unwrap();

        let record = fx.spawn_task("t-1", Some("task/t-1"));
        let outcome = fx.executor().post_work_recovery(&record).unwrap();

        assert!(outcome.stashed);
        assert!(outcome.reapplied);
        assert!(fx.path().join("wip.txt").exists());
    }

    #[test]
    fn test_post_work_recovery_rebase_failure_retains_stash() {
        let fx = Fixture::new();
        git(fx.path(), &["checkout", "-b", "task/t-1"]);
        fx.commit_file("README.md", "# task version", "task change");
        git(fx.path(), &["checkout", "main"]);
        fx.commit_file("README.md", "# main version", "main change");
        git(fx.path(), &["checkout", "task/t-1"]);
        std::fs::write(fx.path().join("wip.txt"), "uncommitted").unwrap();

        let record = fx.spawn_task("t-1", Some("task/t-1"));
        let status_before = fx.store.read("t-1").unwrap().status;

        let err = fx.executor().post_work_recovery(&record).unwrap_err();
        assert!(err.to_string().contains("retained"));

        // Stash survives for the caller, and status was not touched.
        let stashes = git_stdout(fx.path(), &["stash", "list"]);
        assert!(!stashes.is_empty());
        assert_eq!(fx.store.read("t-1").unwrap().status, status_before);
    }

    #[test]
    fn test_post_work_recovery_rebase_failure_clean_tree_keeps_status() {
        let fx = Fixture::new();
        git(fx.path(), &["checkout", "-b", "task/t-1"]);
        fx.commit_file("README.md", "# task version", "task change");
        git(fx.path(), &["checkout", "main"]);
        fx.commit_file("README.md", "# main version", "main change");

        let record = fx.spawn_task("t-1", Some("task/t-1"));
        let err = fx.executor().post_work_recovery(&record).unwrap_err();
        assert!(matches!(err, SalvorError::Git { .. }));
        assert_eq!(fx.store.read("t-1").unwrap().status, TaskStatus::Active);
    }

    // ------------------------------------------------------------------------
    // outcome summaries
    // ------------------------------------------------------------------------

    #[test]
    fn test_outcome_summaries() {
        let cleanup = CleanupOutcome {
            task_id: "t-1".to_string(),
            branch: DeleteBranchOutcome::Deleted,
        };
        assert!(cleanup.summary().contains("branch deleted"));

        let post = PostWorkOutcome {
            task_id: "t-1".to_string(),
            stashed: true,
            reapplied: true,
        };
        assert!(post.summary().contains("carried across"));
    }
}
