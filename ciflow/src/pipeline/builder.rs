//! Pipeline builder with validation.

use super::{Condition, ExecutorConfig, Hook, HookSelector, Pipeline, PostHooks, StageSpec};
use crate::archive::ArtifactSink;
use crate::core::FailurePolicy;
use crate::errors::PipelineValidationError;
use crate::events::{EventSink, NoOpEventSink};
use crate::stages::Stage;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating validated pipelines.
///
/// Stages are kept in insertion order, which is their execution order.
/// Nothing is validated until [`PipelineBuilder::build`].
#[derive(Clone)]
pub struct PipelineBuilder {
    stages: Vec<StageSpec>,
    hooks: PostHooks,
    config: ExecutorConfig,
    event_sink: Arc<dyn EventSink>,
    archive_sink: Option<Arc<dyn ArtifactSink>>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            stages: Vec::new(),
            hooks: PostHooks::new(),
            config: ExecutorConfig::new().with_pipeline_name(name),
            event_sink: Arc::new(NoOpEventSink),
            archive_sink: None,
        }
    }

    /// Adds an unconditional, fatal stage.
    #[must_use]
    pub fn stage(self, name: impl Into<String>, runner: Arc<dyn Stage>) -> Self {
        self.add(StageSpec::new(name, runner))
    }

    /// Adds an unconditional stage whose failures are only logged.
    #[must_use]
    pub fn logged_stage(self, name: impl Into<String>, runner: Arc<dyn Stage>) -> Self {
        self.add(StageSpec::new(name, runner).with_policy(FailurePolicy::Logged))
    }

    /// Adds a fatal stage guarded by a condition.
    #[must_use]
    pub fn conditional_stage(
        self,
        name: impl Into<String>,
        runner: Arc<dyn Stage>,
        condition: Condition,
    ) -> Self {
        self.add(StageSpec::new(name, runner).with_condition(condition))
    }

    /// Adds a fully specified stage.
    #[must_use]
    pub fn add(mut self, spec: StageSpec) -> Self {
        self.stages.push(spec);
        self
    }

    /// Adds a fully specified stage in place.
    pub fn add_stage_spec(&mut self, spec: StageSpec) {
        self.stages.push(spec);
    }

    /// Adds several stages, preserving their order.
    #[must_use]
    pub fn with_stages(mut self, specs: impl IntoIterator<Item = StageSpec>) -> Self {
        self.stages.extend(specs);
        self
    }

    /// Replaces the hook table.
    #[must_use]
    pub fn with_hooks(mut self, hooks: PostHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets one hook slot.
    #[must_use]
    pub fn hook(mut self, selector: HookSelector, hook: Arc<dyn Hook>) -> Self {
        self.hooks = self.hooks.with(selector, hook);
        self
    }

    /// Replaces the executor configuration, including the pipeline name.
    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the wall-clock timeout for the stage phase.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    /// Sets the workspace directory.
    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_workspace(workspace);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets the sink that receives archive requests.
    #[must_use]
    pub fn with_archive_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.archive_sink = Some(sink);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.pipeline_name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Checks the stage list without consuming the builder.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no stages, a stage name is blank, or
    /// two stages share a name.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::empty_pipeline());
        }

        let mut seen = HashSet::with_capacity(self.stages.len());
        for (position, spec) in self.stages.iter().enumerate() {
            spec.validate(position)?;
            if !seen.insert(spec.name.as_str()) {
                return Err(PipelineValidationError::duplicate_stage(&spec.name));
            }
        }

        Ok(())
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails. No stage or hook runs in that
    /// case.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        self.validate()?;

        Ok(Pipeline::new(
            self.stages,
            self.hooks,
            self.config,
            self.event_sink,
            self.archive_sink,
        ))
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.config.pipeline_name)
            .field("stages", &self.stages.iter().map(|s| &s.name).collect::<Vec<_>>())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}
