//! Post-run hooks.
//!
//! Hooks run after the outcome is fixed: the `always` slot first, then the
//! slot matching the outcome. A hook cannot change the outcome; its errors
//! are logged and recorded as [`HookRun`]s.

use crate::context::RunContext;
use crate::core::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Selects a hook slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookSelector {
    /// Runs for every outcome.
    Always,
    /// Runs when the outcome is success.
    Success,
    /// Runs when the outcome is failure.
    Failure,
    /// Runs when the outcome is unstable.
    Unstable,
}

impl HookSelector {
    /// The outcome-specific slot for a final outcome.
    #[must_use]
    pub const fn for_outcome(outcome: Outcome) -> Option<Self> {
        match outcome {
            Outcome::Success => Some(Self::Success),
            Outcome::Failure => Some(Self::Failure),
            Outcome::Unstable => Some(Self::Unstable),
            Outcome::Pending => None,
        }
    }
}

impl fmt::Display for HookSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Always => "always",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Unstable => "unstable",
        };
        f.write_str(s)
    }
}

/// Record of one hook invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookRun {
    /// The slot that was invoked.
    pub selector: HookSelector,
    /// Error message if the hook failed or panicked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration.
    pub duration_ms: f64,
}

impl HookRun {
    /// Returns true if the hook completed without error.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A post-run procedure.
#[async_trait]
pub trait Hook: Send + Sync + fmt::Debug {
    /// Runs the hook against the finalized run.
    async fn run(&self, run: &RunContext) -> anyhow::Result<()>;
}

/// A hook backed by a synchronous closure.
pub struct FnHook<F>
where
    F: Fn(&RunContext) -> anyhow::Result<()> + Send + Sync,
{
    label: String,
    func: F,
}

impl<F> FnHook<F>
where
    F: Fn(&RunContext) -> anyhow::Result<()> + Send + Sync,
{
    /// Creates a new function-based hook.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for FnHook<F>
where
    F: Fn(&RunContext) -> anyhow::Result<()> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHook").field("label", &self.label).finish()
    }
}

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(&RunContext) -> anyhow::Result<()> + Send + Sync,
{
    async fn run(&self, run: &RunContext) -> anyhow::Result<()> {
        (self.func)(run)
    }
}

/// The hook table of a pipeline.
///
/// At most one hook per slot. Setting a slot twice replaces the earlier hook.
#[derive(Debug, Clone, Default)]
pub struct PostHooks {
    always: Option<Arc<dyn Hook>>,
    success: Option<Arc<dyn Hook>>,
    failure: Option<Arc<dyn Hook>>,
    unstable: Option<Arc<dyn Hook>>,
}

impl PostHooks {
    /// Creates an empty hook table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hook that runs for every outcome.
    #[must_use]
    pub fn always(mut self, hook: Arc<dyn Hook>) -> Self {
        self.always = Some(hook);
        self
    }

    /// Sets the success hook.
    #[must_use]
    pub fn on_success(mut self, hook: Arc<dyn Hook>) -> Self {
        self.success = Some(hook);
        self
    }

    /// Sets the failure hook.
    #[must_use]
    pub fn on_failure(mut self, hook: Arc<dyn Hook>) -> Self {
        self.failure = Some(hook);
        self
    }

    /// Sets the unstable hook.
    #[must_use]
    pub fn on_unstable(mut self, hook: Arc<dyn Hook>) -> Self {
        self.unstable = Some(hook);
        self
    }

    /// Sets a slot by selector.
    #[must_use]
    pub fn with(self, selector: HookSelector, hook: Arc<dyn Hook>) -> Self {
        match selector {
            HookSelector::Always => self.always(hook),
            HookSelector::Success => self.on_success(hook),
            HookSelector::Failure => self.on_failure(hook),
            HookSelector::Unstable => self.on_unstable(hook),
        }
    }

    /// Returns the hook in a slot.
    #[must_use]
    pub fn get(&self, selector: HookSelector) -> Option<&Arc<dyn Hook>> {
        match selector {
            HookSelector::Always => self.always.as_ref(),
            HookSelector::Success => self.success.as_ref(),
            HookSelector::Failure => self.failure.as_ref(),
            HookSelector::Unstable => self.unstable.as_ref(),
        }
    }

    /// Returns true if no slot is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.always.is_none()
            && self.success.is_none()
            && self.failure.is_none()
            && self.unstable.is_none()
    }
}
