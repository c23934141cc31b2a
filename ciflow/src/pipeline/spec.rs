//! Stage definitions.

use super::Condition;
use crate::core::FailurePolicy;
use crate::errors::PipelineValidationError;
use crate::stages::Stage;
use std::sync::Arc;

/// Definition of a single stage in a pipeline.
///
/// A stage is immutable once the pipeline is built. Its position in the
/// pipeline is its execution order.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// Decides whether the stage runs.
    pub condition: Condition,
    /// How a failure of this stage affects the run.
    pub failure_policy: FailurePolicy,
}

impl StageSpec {
    /// Creates a stage that always runs and fails fatally.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            runner,
            condition: Condition::always(),
            failure_policy: FailurePolicy::Fatal,
        }
    }

    /// Sets the entry condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Marks failures of this stage as non-fatal.
    #[must_use]
    pub fn logged(self) -> Self {
        self.with_policy(FailurePolicy::Logged)
    }

    /// Marks failures of this stage as fatal.
    #[must_use]
    pub fn fatal(self) -> Self {
        self.with_policy(FailurePolicy::Fatal)
    }

    /// Validates the stage definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or whitespace-only.
    pub fn validate(&self, position: usize) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::empty_stage_name(position));
        }
        Ok(())
    }
}
