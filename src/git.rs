//! Read-only git state inspection.
//!
//! [`GitInspector`] is the query facade the classifier and reporter depend
//! on. Every operation is a pure query against current repository state;
//! the only fatal condition is the repository (or the `git` binary) being
//! unavailable, which aborts the whole report rather than producing a
//! partial one.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SalvorError};

/// Reference branch used for divergence counts unless overridden.
pub const DEFAULT_REFERENCE_BRANCH: &str = "main";

/// Ephemeral snapshot of repository state. Recomputed on every inspection,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStateSnapshot {
    /// Currently checked-out branch (or "HEAD" when detached).
    pub current_branch: String,
    /// True when the working tree has no uncommitted changes.
    pub is_clean: bool,
    /// Commits on the current branch that are not on the reference branch.
    pub commits_ahead_of_reference: u32,
    /// Number of changed files in the working tree.
    pub files_changed: u32,
}

/// Read-only facade over a git repository.
#[derive(Debug, Clone)]
pub struct GitInspector {
    repo_dir: PathBuf,
}

impl GitInspector {
    /// Open an inspector over `repo_dir`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryUnavailable` if the `git` binary cannot be found
    /// or `repo_dir` is not inside a git repository.
    pub fn open(repo_dir: impl AsRef<Path>) -> Result<Self> {
        let repo_dir = repo_dir.as_ref().to_path_buf();

        if which::which("git").is_err() {
            return Err(SalvorError::repository_unavailable(
                "git binary not found on PATH",
            ));
        }

        let inspector = Self { repo_dir };
        let probe = inspector.git(&["rev-parse", "--git-dir"])?;
        if !probe.status.success() {
            return Err(SalvorError::repository_unavailable(format!(
                "{} is not a git repository: {}",
                inspector.repo_dir.display(),
                String::from_utf8_lossy(&probe.stderr).trim()
            )));
        }
        Ok(inspector)
    }

    /// The repository directory this inspector queries.
    #[must_use]
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Name of the currently checked-out branch ("HEAD" when detached).
    pub fn current_branch(&self) -> Result<String> {
        self.run("current_branch", &["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// True when the working tree has no uncommitted changes, tracked or
    /// untracked.
    pub fn is_clean(&self) -> Result<bool> {
        let status = self.run("is_clean", &["status", "--porcelain"])?;
        Ok(status.is_empty())
    }

    /// Whether a local branch with the given name exists.
    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{}", name);
        let output = self.git(&["rev-parse", "--verify", "--quiet", &refname])?;
        Ok(output.status.success())
    }

    /// Number of commits on `branch` that are not on `reference`.
    ///
    /// Returns 0 if `branch` does not exist.
    pub fn commits_ahead(&self, branch: &str, reference: &str) -> Result<u32> {
        if !self.branch_exists(branch)? {
            return Ok(0);
        }
        let range = format!("{}..{}", self.resolve_reference(reference)?, branch);
        let count = self.run("commits_ahead", &["rev-list", "--count", &range])?;
        count
            .parse()
            .map_err(|e| SalvorError::git("commits_ahead", format!("bad rev-list count: {}", e)))
    }

    /// Full-length commit id of HEAD.
    ///
    /// Full length because recovery uses it for exact-match rollback
    /// verification; an abbreviated id would make the post-condition
    /// comparison ambiguous.
    pub fn head_commit(&self) -> Result<String> {
        let hash = self.run("head_commit", &["rev-parse", "HEAD"])?;
        let shape = Regex::new(r"^[0-9a-f]{40,64}$").expect("static regex");
        if !shape.is_match(&hash) {
            return Err(SalvorError::git(
                "head_commit",
                format!("unexpected commit id '{}'", hash),
            ));
        }
        Ok(hash)
    }

    /// Number of changed files in the working tree.
    pub fn files_changed_count(&self) -> Result<u32> {
        let status = self.run("files_changed_count", &["status", "--porcelain"])?;
        Ok(status.lines().count() as u32)
    }

    /// Take a full snapshot relative to `reference`.
    pub fn snapshot(&self, reference: &str) -> Result<GitStateSnapshot> {
        let current_branch = self.current_branch()?;
        let commits_ahead_of_reference = if current_branch == "HEAD" {
            0
        } else {
            self.commits_ahead(&current_branch, reference)?
        };
        Ok(GitStateSnapshot {
            is_clean: self.is_clean()?,
            files_changed: self.files_changed_count()?,
            commits_ahead_of_reference,
            current_branch,
        })
    }

    /// Resolve the reference branch to a usable rev: the local branch when
    /// it exists, otherwise its origin tracking ref.
    fn resolve_reference(&self, reference: &str) -> Result<String> {
        if self.branch_exists(reference)? {
            return Ok(reference.to_string());
        }
        let remote = format!("refs/remotes/origin/{}", reference);
        let output = self.git(&["rev-parse", "--verify", "--quiet", &remote])?;
        if output.status.success() {
            return Ok(format!("origin/{}", reference));
        }
        Err(SalvorError::git(
            "resolve_reference",
            format!("reference branch '{}' not found", reference),
        ))
    }

    // ------------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------------

    /// Run git and return trimmed stdout, mapping failure to a git error.
    fn run(&self, operation: &str, args: &[&str]) -> Result<String> {
        let output = self.git(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SalvorError::git(operation, stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        debug!(?args, "git");
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| {
                SalvorError::repository_unavailable(format!("failed to execute git: {}", e))
            })
    }
}

// ============================================================================
// Tests
// ============================================================================
