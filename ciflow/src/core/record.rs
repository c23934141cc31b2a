//! Per-stage execution records.

use super::StageStatus;
use serde::{Deserialize, Serialize};

/// What the executor recorded for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Recorded status.
    pub status: StageStatus,
    /// Error message if the stage failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Time spent in the action, in milliseconds. Zero for skipped stages.
    #[serde(default)]
    pub duration_ms: f64,
}

impl StageRecord {
    /// A stage whose action completed.
    #[must_use]
    pub fn succeeded(name: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Succeeded,
            error_message: None,
            duration_ms,
        }
    }

    /// A stage whose condition was false.
    #[must_use]
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Skipped,
            error_message: None,
            duration_ms: 0.0,
        }
    }

    /// A stage whose action failed. `status` must be a failure status.
    #[must_use]
    pub fn failed(
        name: impl Into<String>,
        status: StageStatus,
        error: impl Into<String>,
        duration_ms: f64,
    ) -> Self {
        debug_assert!(status.is_failure());
        Self {
            name: name.into(),
            status,
            error_message: Some(error.into()),
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_constructors() {
        let ok = StageRecord::succeeded("build", 12.0);
        assert_eq!(ok.status, StageStatus::Succeeded);
        assert!(ok.error_message.is_none());

        let skipped = StageRecord::skipped("push");
        assert_eq!(skipped.status, StageStatus::Skipped);
        assert_eq!(skipped.duration_ms, 0.0);

        let failed = StageRecord::failed("test", StageStatus::FailedNonfatal, "3 tests failed", 5.0);
        assert_eq!(failed.error_message.as_deref(), Some("3 tests failed"));
    }

    #[test]
    fn test_record_serialization_omits_missing_error() {
        let json = serde_json::to_value(StageRecord::skipped("push")).unwrap();
        assert_eq!(json["status"], "skipped");
        assert!(json.get("error_message").is_none());
    }
}
