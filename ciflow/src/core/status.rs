//! Stage status, run outcome and failure policy enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a failing stage affects the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the pipeline and mark the run as failed (default).
    #[default]
    Fatal,
    /// Record the failure, mark the run unstable and keep going.
    Logged,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Logged => write!(f, "logged"),
        }
    }
}

/// The recorded status of a stage after the executor visited it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The action completed successfully.
    Succeeded,
    /// The condition evaluated false; the action was not invoked.
    Skipped,
    /// The action failed under a fatal policy.
    Failed,
    /// The action failed under a logged policy.
    FailedNonfatal,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
            Self::FailedNonfatal => write!(f, "failed_nonfatal"),
        }
    }
}

impl StageStatus {
    /// Returns true if the action ran and failed, under either policy.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::FailedNonfatal)
    }

    /// Returns true if the action was invoked.
    #[must_use]
    pub const fn was_executed(&self) -> bool {
        !matches!(self, Self::Skipped)
    }

    /// Status recorded for a failure under the given policy.
    #[must_use]
    pub const fn for_failure(policy: FailurePolicy) -> Self {
        match policy {
            FailurePolicy::Fatal => Self::Failed,
            FailurePolicy::Logged => Self::FailedNonfatal,
        }
    }
}

/// The terminal classification of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The run has not been finalized.
    #[default]
    Pending,
    /// Every executed stage succeeded.
    Success,
    /// A fatal stage failed or the run timed out.
    Failure,
    /// At least one logged stage failed and nothing fatal happened.
    Unstable,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Unstable => write!(f, "unstable"),
        }
    }
}

impl Outcome {
    /// Severity rank; higher is worse.
    const fn rank(self) -> u8 {
        match self {
            Self::Pending | Self::Success => 0,
            Self::Unstable => 1,
            Self::Failure => 2,
        }
    }

    /// Returns the worse of the two outcomes.
    ///
    /// `Failure` is never downgraded to `Unstable`.
    #[must_use]
    pub const fn worsen(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// Returns true once the run has been finalized.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Outcome a failure under the given policy degrades the run to.
    #[must_use]
    pub const fn for_failure(policy: FailurePolicy) -> Self {
        match policy {
            FailurePolicy::Fatal => Self::Failure,
            FailurePolicy::Logged => Self::Unstable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policy_default() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::Fatal);
    }

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(StageStatus::Skipped.to_string(), "skipped");
        assert_eq!(StageStatus::Failed.to_string(), "failed");
        assert_eq!(StageStatus::FailedNonfatal.to_string(), "failed_nonfatal");
    }

    #[test]
    fn test_stage_status_for_failure() {
        assert_eq!(StageStatus::for_failure(FailurePolicy::Fatal), StageStatus::Failed);
        assert_eq!(
            StageStatus::for_failure(FailurePolicy::Logged),
            StageStatus::FailedNonfatal
        );
        assert!(StageStatus::FailedNonfatal.is_failure());
        assert!(!StageStatus::Skipped.was_executed());
    }

    #[test]
    fn test_outcome_worsen_never_downgrades_failure() {
        assert_eq!(Outcome::Pending.worsen(Outcome::Unstable), Outcome::Unstable);
        assert_eq!(Outcome::Unstable.worsen(Outcome::Failure), Outcome::Failure);
        assert_eq!(Outcome::Failure.worsen(Outcome::Unstable), Outcome::Failure);
        assert_eq!(Outcome::Unstable.worsen(Outcome::Pending), Outcome::Unstable);
    }

    #[test]
    fn test_outcome_serialize() {
        let json = serde_json::to_string(&Outcome::Unstable).unwrap();
        assert_eq!(json, r#""unstable""#);

        let status: StageStatus = serde_json::from_str(r#""failed_nonfatal""#).unwrap();
        assert_eq!(status, StageStatus::FailedNonfatal);
    }
}
