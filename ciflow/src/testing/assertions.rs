//! Assertions over finished runs.

use crate::context::RunContext;
use crate::core::{Outcome, StageStatus};

/// Asserts the run's outcome.
pub fn assert_outcome(run: &RunContext, expected: Outcome) {
    assert_eq!(
        run.current_outcome(),
        expected,
        "Expected outcome {expected}, got {}. {}",
        run.current_outcome(),
        run.summary()
    );
}

/// Asserts the recorded stage statuses, in execution order.
pub fn assert_statuses(run: &RunContext, expected: &[(&str, StageStatus)]) {
    let actual = run.statuses();
    assert_eq!(
        actual.as_slice(),
        expected,
        "Stage statuses differ. {}",
        run.summary()
    );
}

/// Asserts that a stage was recorded with `status`.
pub fn assert_stage_status(run: &RunContext, stage: &str, status: StageStatus) {
    assert_eq!(
        run.status_of(stage),
        Some(status),
        "Stage '{stage}' has status {:?}, expected {status:?}",
        run.status_of(stage)
    );
}

/// Asserts that no stage with this name was recorded.
pub fn assert_not_recorded(run: &RunContext, stage: &str) {
    assert!(
        run.stage(stage).is_none(),
        "Stage '{stage}' should not have been recorded"
    );
}
