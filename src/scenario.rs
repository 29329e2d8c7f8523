//! Crash scenario classification.
//!
//! A pure, total decision procedure: given what the task record claims and
//! what the repository actually shows, produce exactly one named scenario
//! and a ranked list of recovery options. No I/O happens here; callers feed
//! in a freshly computed snapshot and get the same answer for the same
//! inputs every time.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Scenario
// ============================================================================

/// Named classification of the crash state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Task spawned but no surviving work: branch never created, or created
    /// and still empty.
    PreWorkCrash,
    /// Work exists on the branch but no review request was opened.
    PostWorkNoReview,
    /// A review request is open and not yet known to be merged.
    ReviewPending,
    /// No rule matched; needs human investigation.
    Unknown,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scenario::PreWorkCrash => "pre_work_crash",
            Scenario::PostWorkNoReview => "post_work_no_review",
            Scenario::ReviewPending => "review_pending",
            Scenario::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Recovery Option
// ============================================================================

/// One selectable recovery path, presented in rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOption {
    Retry,
    ModifyPrompt,
    Cancel,
    CreateReviewRequest,
    ReviewWorkManually,
    ModifyApproach,
    CheckReviewStatus,
    AwaitMerge,
    AddressFeedback,
    Investigate,
    ManualRecovery,
}

impl fmt::Display for RecoveryOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryOption::Retry => "retry",
            RecoveryOption::ModifyPrompt => "modify_prompt",
            RecoveryOption::Cancel => "cancel",
            RecoveryOption::CreateReviewRequest => "create_review_request",
            RecoveryOption::ReviewWorkManually => "review_work_manually",
            RecoveryOption::ModifyApproach => "modify_approach",
            RecoveryOption::CheckReviewStatus => "check_review_status",
            RecoveryOption::AwaitMerge => "await_merge",
            RecoveryOption::AddressFeedback => "address_feedback",
            RecoveryOption::Investigate => "investigate",
            RecoveryOption::ManualRecovery => "manual_recovery",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Result of classifying one task's crash state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioAnalysis {
    pub scenario: Scenario,
    pub description: String,
    pub recovery_options: Vec<RecoveryOption>,
}

/// Classify a task's crash state.
///
/// Rules are evaluated in strict priority order; the first match wins and
/// later rules assume earlier ones did not fire. Rule 5 is a catch-all, so
/// every reachable input combination lands in exactly one scenario.
///
/// `branch_exists` and `commits_ahead` must be freshly computed for
/// `branch_name`; `commits_ahead` is ignored unless the branch exists.
#[must_use]
pub fn classify(
    branch_name: Option<&str>,
    branch_exists: bool,
    commits_ahead: u32,
    review_ref: Option<&str>,
) -> ScenarioAnalysis {
    // Rule 1: a branch was allocated but never created in the repository.
    if branch_name.is_some() && !branch_exists {
        return analysis(
            Scenario::PreWorkCrash,
            "task spawned, no work started - branch never created",
            vec![
                RecoveryOption::Retry,
                RecoveryOption::ModifyPrompt,
                RecoveryOption::Cancel,
            ],
        );
    }

    // Rule 2: the branch exists but holds no commits of its own.
    if branch_name.is_some() && branch_exists && commits_ahead == 0 {
        return analysis(
            Scenario::PreWorkCrash,
            "branch created but empty",
            vec![
                RecoveryOption::Retry,
                RecoveryOption::ModifyPrompt,
                RecoveryOption::Cancel,
            ],
        );
    }

    // Rule 3: work landed on the branch, no review request yet.
    if branch_exists && commits_ahead > 0 && review_ref.is_none() {
        return analysis(
            Scenario::PostWorkNoReview,
            "work done, no review request yet",
            vec![
                RecoveryOption::CreateReviewRequest,
                RecoveryOption::ReviewWorkManually,
                RecoveryOption::ModifyApproach,
            ],
        );
    }

    // Rule 4: a review request is recorded. Trusted as-is; rules 1-2 have
    // already claimed the cases where the branch went missing or empty.
    if review_ref.is_some() {
        return analysis(
            Scenario::ReviewPending,
            "review request open, not yet merged",
            vec![
                RecoveryOption::CheckReviewStatus,
                RecoveryOption::AwaitMerge,
                RecoveryOption::AddressFeedback,
            ],
        );
    }

    // Rule 5: catch-all.
    analysis(
        Scenario::Unknown,
        "state matches no known scenario",
        vec![RecoveryOption::Investigate, RecoveryOption::ManualRecovery],
    )
}

fn analysis(
    scenario: Scenario,
    description: &str,
    recovery_options: Vec<RecoveryOption>,
) -> ScenarioAnalysis {
    ScenarioAnalysis {
        scenario,
        description: description.to_string(),
        recovery_options,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_never_created() {
        let a = classify(Some("task/t-1"), false, 0, None);
        assert_eq!(a.scenario, Scenario::PreWorkCrash);
        assert!(a.description.contains("branch never created"));
        assert_eq!(
            a.recovery_options,
            vec![
                RecoveryOption::Retry,
                RecoveryOption::ModifyPrompt,
                RecoveryOption::Cancel
            ]
        );
    }

    #[test]
    fn test_branch_empty() {
        let a = classify(Some("task/t-1"), true, 0, None);
        assert_eq!(a.scenario, Scenario::PreWorkCrash);
        assert!(a.description.contains("empty"));
        assert_eq!(
            a.recovery_options,
            vec![
                RecoveryOption::Retry,
                RecoveryOption::ModifyPrompt,
                RecoveryOption::Cancel
            ]
        );
    }

    #[test]
    fn test_work_without_review() {
        let a = classify(Some("task/t-1"), true, 3, None);
        assert_eq!(a.scenario, Scenario::PostWorkNoReview);
        assert_eq!(
            a.recovery_options,
            vec![
                RecoveryOption::CreateReviewRequest,
                RecoveryOption::ReviewWorkManually,
                RecoveryOption::ModifyApproach
            ]
        );
    }

    #[test]
    fn test_review_pending() {
        let a = classify(Some("task/t-1"), true, 3, Some("42"));
        assert_eq!(a.scenario, Scenario::ReviewPending);
        assert_eq!(
            a.recovery_options,
            vec![
                RecoveryOption::CheckReviewStatus,
                RecoveryOption::AwaitMerge,
                RecoveryOption::AddressFeedback
            ]
        );
    }

    #[test]
    fn test_rule_order_missing_branch_beats_review_ref() {
        // A recorded review ref does not stop rule 1 from claiming a task
        // whose branch disappeared.
        let a = classify(Some("task/t-1"), false, 0, Some("42"));
        assert_eq!(a.scenario, Scenario::PreWorkCrash);
    }

    #[test]
    fn test_review_ref_without_branch_name() {
        let a = classify(None, false, 0, Some("42"));
        assert_eq!(a.scenario, Scenario::ReviewPending);
    }

    #[test]
    fn test_no_branch_no_review_is_unknown() {
        let a = classify(None, false, 0, None);
        assert_eq!(a.scenario, Scenario::Unknown);
        assert_eq!(
            a.recovery_options,
            vec![RecoveryOption::Investigate, RecoveryOption::ManualRecovery]
        );
    }

    #[test]
    fn test_total_and_deterministic() {
        // Every combination of the three boolean-ish inputs produces exactly
        // one scenario, and repeated runs agree.
        for branch_name in [None, Some("task/t-1")] {
            for branch_exists in [false, true] {
                for commits_ahead in [0, 3] {
                    for review_ref in [None, Some("42")] {
                        let first =
                            classify(branch_name, branch_exists, commits_ahead, review_ref);
                        let second =
                            classify(branch_name, branch_exists, commits_ahead, review_ref);
                        assert_eq!(first, second);
                        assert!(!first.recovery_options.is_empty());
                    }
                }
            }
        }
    }

    #[test]
    fn test_serialized_names_are_snake_case() {
        let json = serde_json::to_string(&Scenario::PreWorkCrash).unwrap();
        assert_eq!(json, "\"pre_work_crash\"");
        let json = serde_json::to_string(&RecoveryOption::CreateReviewRequest).unwrap();
        assert_eq!(json, "\"create_review_request\"");
    }
}
