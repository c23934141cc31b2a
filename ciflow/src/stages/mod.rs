//! Stage action trait and implementations.
//!
//! A stage action is the side-effecting part of a stage. The executor owns
//! the name, condition and failure policy; the action only does the work
//! and reports success or failure.

use crate::context::{EnvironmentSnapshot, StageContext};
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// Trait for stage actions.
///
/// An `Err` is a stage failure; the executor classifies it according to
/// the stage's failure policy. Panics are caught and treated the same way.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Executes the stage.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Read-only view of the run plus a place to declare archives
    async fn execute(&self, ctx: &StageContext<'_>) -> anyhow::Result<()>;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    label: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("label", &self.label).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    async fn execute(&self, ctx: &StageContext<'_>) -> anyhow::Result<()> {
        (self.func)(ctx)
    }
}

/// An async function-based stage.
///
/// The closure receives an owned copy of the environment snapshot so the
/// returned future does not borrow from the run.
pub struct AsyncFnStage<F, Fut>
where
    F: Fn(EnvironmentSnapshot) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    label: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnStage<F, Fut>
where
    F: Fn(EnvironmentSnapshot) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    /// Creates a new async function-based stage.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnStage<F, Fut>
where
    F: Fn(EnvironmentSnapshot) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnStage")
            .field("label", &self.label)
            .finish()
    }
}

#[async_trait]
impl<F, Fut> Stage for AsyncFnStage<F, Fut>
where
    F: Fn(EnvironmentSnapshot) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn execute(&self, ctx: &StageContext<'_>) -> anyhow::Result<()> {
        (self.func)(ctx.environment().clone()).await
    }
}

/// A stage that does nothing and succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStage;

#[async_trait]
impl Stage for NoOpStage {
    async fn execute(&self, _ctx: &StageContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}
