//! Stage entry conditions.

use crate::context::RunContext;
use crate::core::Outcome;
use std::fmt;
use std::sync::Arc;

type Predicate = dyn Fn(&RunContext) -> bool + Send + Sync;

/// Environment variable set on change-request (pull request) builds.
pub const CHANGE_ID_VAR: &str = "CHANGE_ID";

/// Environment variable holding the branch being built.
pub const BRANCH_NAME_VAR: &str = "BRANCH_NAME";

/// A predicate deciding whether a stage runs.
///
/// Conditions see the run as it stands when the stage is reached: the
/// environment snapshot plus every stage recorded before it. A condition
/// that evaluates false makes the executor record the stage as skipped.
#[derive(Clone)]
pub struct Condition {
    label: String,
    predicate: Arc<Predicate>,
}

impl Condition {
    /// Builds a condition from a closure.
    pub fn custom<F>(label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Always true.
    #[must_use]
    pub fn always() -> Self {
        Self::custom("always", |_| true)
    }

    /// Always false.
    #[must_use]
    pub fn never() -> Self {
        Self::custom("never", |_| false)
    }

    /// True when `key` is set to exactly `value`.
    #[must_use]
    pub fn env_equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        Self::custom(format!("env {key} == {value}"), move |run| {
            run.environment().get(&key) == Some(value.as_str())
        })
    }

    /// True when `key` is set to a non-blank value.
    #[must_use]
    pub fn env_present(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::custom(format!("env {key} present"), move |run| {
            run.environment().is_set(&key)
        })
    }

    /// True when building the named branch.
    #[must_use]
    pub fn branch(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::custom(format!("branch {name}"), move |run| {
            run.environment().get(BRANCH_NAME_VAR) == Some(name.as_str())
        })
    }

    /// False for change-request builds (`CHANGE_ID` set), true otherwise.
    #[must_use]
    pub fn not_change_request() -> Self {
        Self::custom("not a change request", |run| {
            !run.environment().is_set(CHANGE_ID_VAR)
        })
    }

    /// True unless a fatal failure has already been recorded.
    ///
    /// Fatal failures stop the pipeline, so this only matters for stages
    /// consulted after a timeout or in custom executors built on top.
    #[must_use]
    pub fn outcome_is_not_failure() -> Self {
        Self::custom("outcome is not failure", |run| {
            run.current_outcome() != Outcome::Failure
        })
    }

    /// Both conditions must hold.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let label = format!("({}) and ({})", self.label, other.label);
        Self::custom(label, move |run| self.evaluate(run) && other.evaluate(run))
    }

    /// Negates the condition.
    #[must_use]
    pub fn negate(self) -> Self {
        let label = format!("not ({})", self.label);
        Self::custom(label, move |run| !self.evaluate(run))
    }

    /// Human readable description.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Evaluates the predicate.
    #[must_use]
    pub fn evaluate(&self, run: &RunContext) -> bool {
        (self.predicate)(run)
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Condition").field(&self.label).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EnvironmentSnapshot;
    use crate::core::{StageRecord, StageStatus};

    fn run_with(pairs: &[(&str, &str)]) -> RunContext {
        RunContext::new("test", EnvironmentSnapshot::from_pairs(pairs.iter().copied()))
    }

    #[test]
    fn test_always_and_never() {
        let run = run_with(&[]);
        assert!(Condition::always().evaluate(&run));
        assert!(!Condition::never().evaluate(&run));
        assert!(Condition::default().evaluate(&run));
    }

    #[test]
    fn test_env_conditions() {
        let run = run_with(&[("DEPLOY", "yes"), ("EMPTY", " ")]);

        assert!(Condition::env_equals("DEPLOY", "yes").evaluate(&run));
        assert!(!Condition::env_equals("DEPLOY", "no").evaluate(&run));
        assert!(Condition::env_present("DEPLOY").evaluate(&run));
        assert!(!Condition::env_present("EMPTY").evaluate(&run));
        assert!(!Condition::env_present("MISSING").evaluate(&run));
    }

    #[test]
    fn test_not_change_request() {
        let pr = run_with(&[(CHANGE_ID_VAR, "123")]);
        let branch = run_with(&[(BRANCH_NAME_VAR, "main")]);

        assert!(!Condition::not_change_request().evaluate(&pr));
        assert!(Condition::not_change_request().evaluate(&branch));
        assert!(Condition::branch("main").evaluate(&branch));
        assert!(!Condition::branch("main").evaluate(&pr));
    }

    #[test]
    fn test_combinators() {
        let run = run_with(&[(BRANCH_NAME_VAR, "main")]);

        let push = Condition::branch("main").and(Condition::not_change_request());
        assert!(push.evaluate(&run));
        assert!(!push.clone().negate().evaluate(&run));
        assert_eq!(push.label(), "(branch main) and (not a change request)");
    }

    #[test]
    fn test_outcome_is_not_failure_tracks_running_outcome() {
        let mut run = run_with(&[]);
        let cond = Condition::outcome_is_not_failure();
        assert!(cond.evaluate(&run));

        run.record(StageRecord::failed("a", StageStatus::FailedNonfatal, "x", 0.0));
        assert!(cond.evaluate(&run));

        run.record(StageRecord::failed("b", StageStatus::Failed, "x", 0.0));
        assert!(!cond.evaluate(&run));
    }

    #[test]
    fn test_debug_shows_label() {
        assert_eq!(format!("{:?}", Condition::never()), "Condition(\"never\")");
    }
}
