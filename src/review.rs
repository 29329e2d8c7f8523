//! Remote review-request integration.
//!
//! The core only ever needs two facts from the code-hosting service: an
//! opaque identifier for a newly created review request, and whether an
//! existing one is merged. [`ReviewHost`] abstracts that seam so recovery
//! logic is testable without network access; [`GhReviewHost`] is the
//! production implementation shelling out to the `gh` CLI.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SalvorError};

/// Remote state of a review request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// The review request was merged.
    Merged,
    /// The review request is open.
    Open,
    /// The service reported something other than open/merged (closed,
    /// draft, still processing).
    Pending,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewStatus::Merged => "merged",
            ReviewStatus::Open => "open",
            ReviewStatus::Pending => "pending",
        };
        write!(f, "{}", s)
    }
}

/// Abstraction over the remote review service.
pub trait ReviewHost {
    /// Open a review request for `branch` and return its opaque identifier.
    fn create_review_request(&self, branch: &str, title: &str, body: &str) -> Result<String>;

    /// Query the current state of an existing review request.
    fn review_status(&self, review_ref: &str) -> Result<ReviewStatus>;
}

// ============================================================================
// gh CLI implementation
// ============================================================================

/// Review host backed by the `gh` CLI.
#[derive(Debug, Clone)]
pub struct GhReviewHost {
    repo_dir: PathBuf,
}

impl GhReviewHost {
    /// Create a gh-backed review host for the repository at `repo_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `gh` binary is not on PATH.
    pub fn new(repo_dir: impl AsRef<Path>) -> Result<Self> {
        if which::which("gh").is_err() {
            return Err(SalvorError::review_host(
                "init",
                "gh CLI not found on PATH - required for review requests",
            ));
        }
        Ok(Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
        })
    }

    fn gh(&self, operation: &str, args: &[&str]) -> Result<String> {
        debug!(?args, "gh");
        let output = Command::new("gh")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| {
                SalvorError::review_host(operation, format!("failed to execute gh: {}", e))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SalvorError::review_host(operation, stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl ReviewHost for GhReviewHost {
    fn create_review_request(&self, branch: &str, title: &str, body: &str) -> Result<String> {
        let url = self.gh(
            "create_review_request",
            &[
                "pr", "create", "--head", branch, "--title", title, "--body", body,
            ],
        )?;
        // gh prints the PR URL; the trailing path segment is the number.
        let id = url
            .rsplit('/')
            .next()
            .filter(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_digit()))
            .map(|seg| seg.to_string())
            .unwrap_or(url);
        Ok(id)
    }

    fn review_status(&self, review_ref: &str) -> Result<ReviewStatus> {
        let raw = self.gh(
            "review_status",
            &["pr", "view", review_ref, "--json", "state"],
        )?;
        let parsed: serde_json::Value = serde_json::from_str(&raw)?;
        let state = parsed
            .get("state")
            .and_then(|s| s.as_str())
            .unwrap_or_default();
        Ok(match state {
            "MERGED" => ReviewStatus::Merged,
            "OPEN" => ReviewStatus::Open,
            _ => ReviewStatus::Pending,
        })
    }
}

// ============================================================================
// Mock implementation
// ============================================================================

/// Controllable test double for [`ReviewHost`].
#[derive(Debug, Clone)]
pub struct MockReviewHost {
    created_id: String,
    status: ReviewStatus,
    create_error: Option<String>,
    status_error: Option<String>,
}

impl Default for MockReviewHost {
    fn default() -> Self {
        Self {
            created_id: "1".to_string(),
            status: ReviewStatus::Open,
            create_error: None,
            status_error: None,
        }
    }
}

impl MockReviewHost {
    /// Create a new mock with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identifier returned on creation.
    #[must_use]
    pub fn with_created_id(mut self, id: &str) -> Self {
        self.created_id = id.to_string();
        self
    }

    /// Set the status returned by queries.
    #[must_use]
    pub fn with_status(mut self, status: ReviewStatus) -> Self {
        self.status = status;
        self
    }

    /// Configure creation to fail.
    #[must_use]
    pub fn with_create_error(mut self, error: &str) -> Self {
        self.create_error = Some(error.to_string());
        self
    }

    /// Configure status queries to fail.
    #[must_use]
    pub fn with_status_error(mut self, error: &str) -> Self {
        self.status_error = Some(error.to_string());
        self
    }
}

impl ReviewHost for MockReviewHost {
    fn create_review_request(&self, _branch: &str, _title: &str, _body: &str) -> Result<String> {
        match &self.create_error {
            Some(e) => Err(SalvorError::review_host("create_review_request", e.clone())),
            None => Ok(self.created_id.clone()),
        }
    }

    fn review_status(&self, _review_ref: &str) -> Result<ReviewStatus> {
        match &self.status_error {
            Some(e) => Err(SalvorError::review_host("review_status", e.clone())),
            None => Ok(self.status),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_defaults() {
        let host = MockReviewHost::new();
        assert_eq!(host.create_review_request("b", "t", "d").unwrap(), "1");
        assert_eq!(host.review_status("1").unwrap(), ReviewStatus::Open);
    }

    #[test]
    fn test_mock_builder() {
        let host = MockReviewHost::new()
            .with_created_id("42")
            .with_status(ReviewStatus::Merged);
        assert_eq!(host.create_review_request("b", "t", "d").unwrap(), "42");
        assert_eq!(host.review_status("42").unwrap(), ReviewStatus::Merged);
    }

    #[test]
    fn test_mock_errors() {
        let host = MockReviewHost::new()
            .with_create_error("rate limited")
            .with_status_error("not found");
        assert!(host.create_review_request("b", "t", "d").is_err());
        assert!(host.review_status("42").is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ReviewStatus::Merged.to_string(), "merged");
        assert_eq!(ReviewStatus::Open.to_string(), "open");
        assert_eq!(ReviewStatus::Pending.to_string(), "pending");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ReviewStatus::Merged).unwrap(),
            "\"merged\""
        );
    }
}
