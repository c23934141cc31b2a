//! Sequential pipeline execution.
//!
//! A run visits stages strictly in order on the caller's task. Each stage is
//! either skipped by its condition or invoked; failures are classified by the
//! stage's [`FailurePolicy`] and a fatal one stops the loop. Whatever happens
//! in the stage phase, the run is then finalized, archived and handed to the
//! hooks exactly once.

use super::{ExecutorConfig, HookRun, HookSelector, PipelineBuilder, PostHooks, StageSpec};
use crate::archive::{ArchiveResult, ArtifactArchiveRequest, ArtifactSink};
use crate::context::{EnvironmentSnapshot, RunContext, StageContext};
use crate::core::{FailurePolicy, StageRecord, StageStatus};
use crate::errors::{panic_message, PipelineValidationError, StageFailure};
use crate::events::{EventSink, PipelineEvent};
use crate::observability::StageTimer;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// A validated, ready-to-run pipeline.
///
/// Built with [`PipelineBuilder`]. A pipeline can be run any number of
/// times; each run gets its own [`RunContext`].
pub struct Pipeline {
    stages: Vec<StageSpec>,
    hooks: PostHooks,
    config: ExecutorConfig,
    event_sink: Arc<dyn EventSink>,
    archive_sink: Option<Arc<dyn ArtifactSink>>,
}

/// What invoking one stage produced.
struct Invocation {
    result: Result<(), StageFailure>,
    duration_ms: f64,
    archive_requests: Vec<ArtifactArchiveRequest>,
}

impl Pipeline {
    pub(crate) fn new(
        stages: Vec<StageSpec>,
        hooks: PostHooks,
        config: ExecutorConfig,
        event_sink: Arc<dyn EventSink>,
        archive_sink: Option<Arc<dyn ArtifactSink>>,
    ) -> Self {
        Self {
            stages,
            hooks,
            config,
            event_sink,
            archive_sink,
        }
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

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// The stage definitions in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// The hook table.
    #[must_use]
    pub fn hooks(&self) -> &PostHooks {
        &self.hooks
    }

    /// The executor configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs the pipeline against an environment snapshot.
    ///
    /// Never fails: stage errors, panics and timeouts are recorded on the
    /// returned context, whose outcome is always terminal.
    pub async fn run(&self, environment: EnvironmentSnapshot) -> RunContext {
        let mut run = RunContext::new(self.config.pipeline_name.clone(), environment);
        let deadline = self.config.timeout().map(|budget| Instant::now() + budget);
        let timer = StageTimer::start(self.name());

        info!(
            pipeline = %self.name(),
            run_id = %run.run_id(),
            stages = self.stages.len(),
            "Pipeline started"
        );
        self.emit(
            "pipeline.started",
            serde_json::json!({
                "pipeline": self.name(),
                "run_id": run.run_id().to_string(),
                "stages": self.stage_names(),
            }),
        );

        for spec in &self.stages {
            if !self.evaluate_condition(spec, &run) {
                debug!(stage = %spec.name, condition = %spec.condition.label(), "Stage skipped");
                run.record(StageRecord::skipped(&spec.name));
                self.emit(
                    "stage.skipped",
                    serde_json::json!({
                        "stage": &spec.name,
                        "reason": spec.condition.label(),
                    }),
                );
                continue;
            }

            let invocation = self.invoke(spec, &run, deadline).await;
            run.add_archive_requests(invocation.archive_requests);

            match invocation.result {
                Ok(()) => {
                    info!(stage = %spec.name, duration_ms = invocation.duration_ms, "Stage succeeded");
                    run.record(StageRecord::succeeded(&spec.name, invocation.duration_ms));
                    self.emit(
                        "stage.succeeded",
                        serde_json::json!({
                            "stage": &spec.name,
                            "duration_ms": invocation.duration_ms,
                        }),
                    );
                }
                Err(failure) => {
                    let policy = if failure.is_timeout() {
                        FailurePolicy::Fatal
                    } else {
                        spec.failure_policy
                    };
                    let status = StageStatus::for_failure(policy);
                    let message = failure.to_string();

                    run.record(StageRecord::failed(
                        &spec.name,
                        status,
                        message.clone(),
                        invocation.duration_ms,
                    ));

                    if failure.is_timeout() {
                        error!(stage = %spec.name, error = %message, "Pipeline timed out");
                        self.emit(
                            "pipeline.timed_out",
                            serde_json::json!({
                                "stage": &spec.name,
                                "timeout_seconds": self.config.timeout_seconds,
                            }),
                        );
                    }

                    match policy {
                        FailurePolicy::Fatal => {
                            error!(
                                stage = %spec.name,
                                duration_ms = invocation.duration_ms,
                                error = %message,
                                "Stage failed, stopping pipeline"
                            );
                            self.emit(
                                "stage.failed",
                                serde_json::json!({
                                    "stage": &spec.name,
                                    "error": &message,
                                    "duration_ms": invocation.duration_ms,
                                }),
                            );
                            break;
                        }
                        FailurePolicy::Logged => {
                            warn!(
                                stage = %spec.name,
                                duration_ms = invocation.duration_ms,
                                error = %message,
                                "Stage failed, continuing"
                            );
                            self.emit(
                                "stage.failed_nonfatal",
                                serde_json::json!({
                                    "stage": &spec.name,
                                    "error": &message,
                                    "duration_ms": invocation.duration_ms,
                                }),
                            );
                        }
                    }
                }
            }
        }

        let outcome = run.finalize();
        self.archive(&mut run).await;
        self.run_hooks(&mut run).await;

        let duration_ms = timer.finish();
        info!(
            pipeline = %self.name(),
            run_id = %run.run_id(),
            outcome = %outcome,
            duration_ms,
            "Pipeline finished"
        );
        self.emit(
            "pipeline.finished",
            serde_json::json!({
                "pipeline": self.name(),
                "run_id": run.run_id().to_string(),
                "outcome": outcome,
                "duration_ms": duration_ms,
            }),
        );

        run
    }

    /// Evaluates a stage condition. A panicking condition counts as false.
    fn evaluate_condition(&self, spec: &StageSpec, run: &RunContext) -> bool {
        match std::panic::catch_unwind(AssertUnwindSafe(|| spec.condition.evaluate(run))) {
            Ok(result) => result,
            Err(payload) => {
                warn!(
                    stage = %spec.name,
                    condition = %spec.condition.label(),
                    error = %panic_message(payload.as_ref()),
                    "Stage condition panicked, skipping stage"
                );
                false
            }
        }
    }

    /// Invokes one stage action under the run deadline.
    async fn invoke(
        &self,
        spec: &StageSpec,
        run: &RunContext,
        deadline: Option<Instant>,
    ) -> Invocation {
        let budget = self.config.timeout().unwrap_or_default();

        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Invocation {
                result: Err(StageFailure::TimedOut(budget)),
                duration_ms: 0.0,
                archive_requests: Vec::new(),
            };
        }

        let ctx = StageContext::new(run, &spec.name, &self.config.workspace);
        debug!(stage = %spec.name, "Stage started");
        self.emit("stage.started", serde_json::json!({ "stage": &spec.name }));

        let timer = StageTimer::start(&spec.name);
        let action = AssertUnwindSafe(spec.runner.execute(&ctx)).catch_unwind();

        let outcome = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, action).await.ok(),
            None => Some(action.await),
        };

        // A blocking action can return after the deadline without yielding.
        let overran = deadline.is_some_and(|d| Instant::now() >= d);
        let result = match outcome {
            None => Err(StageFailure::TimedOut(budget)),
            Some(_) if overran => {
                warn!(stage = %spec.name, "Stage returned after the pipeline deadline");
                Err(StageFailure::TimedOut(budget))
            }
            Some(Ok(Ok(()))) => Ok(()),
            Some(Ok(Err(e))) => Err(StageFailure::Action(e)),
            Some(Err(payload)) => Err(StageFailure::from_panic(payload.as_ref())),
        };

        Invocation {
            result,
            duration_ms: timer.finish(),
            archive_requests: ctx.into_archive_requests(),
        }
    }

    /// Hands collected archive requests to the sink.
    async fn archive(&self, run: &mut RunContext) {
        let requests = run.archive_requests().to_vec();
        if requests.is_empty() {
            return;
        }

        let Some(sink) = self.archive_sink.as_ref() else {
            debug!(requests = requests.len(), "No archive sink configured, keeping requests");
            return;
        };

        for request in requests {
            let archived = AssertUnwindSafe(sink.archive(&request, &self.config.workspace))
                .catch_unwind()
                .await;

            let result = match archived {
                Ok(Ok(archived)) => {
                    info!(
                        pattern = %request.glob_pattern,
                        files = archived.files.len(),
                        "Archived artifacts"
                    );
                    ArchiveResult {
                        request,
                        files: archived.files,
                        error: None,
                    }
                }
                Ok(Err(e)) => self.archive_failed(request, e.to_string()),
                Err(payload) => self.archive_failed(
                    request,
                    format!("archive sink panicked: {}", panic_message(payload.as_ref())),
                ),
            };
            run.add_archive_result(result);
        }
    }

    fn archive_failed(&self, request: ArtifactArchiveRequest, message: String) -> ArchiveResult {
        warn!(pattern = %request.glob_pattern, error = %message, "Archiving failed");
        self.emit(
            "archive.failed",
            serde_json::json!({
                "pattern": &request.glob_pattern,
                "error": &message,
            }),
        );
        ArchiveResult {
            request,
            files: Vec::new(),
            error: Some(message),
        }
    }

    /// Runs the `always` hook, then the hook for the final outcome.
    async fn run_hooks(&self, run: &mut RunContext) {
        self.invoke_hook(HookSelector::Always, run).await;
        if let Some(selector) = HookSelector::for_outcome(run.outcome()) {
            self.invoke_hook(selector, run).await;
        }
    }

    async fn invoke_hook(&self, selector: HookSelector, run: &mut RunContext) {
        let Some(hook) = self.hooks.get(selector).cloned() else {
            return;
        };

        debug!(hook = %selector, "Invoking hook");
        self.emit("hook.invoked", serde_json::json!({ "hook": selector }));

        let timer = StageTimer::start(selector.to_string());
        let result = AssertUnwindSafe(hook.run(run)).catch_unwind().await;
        let error = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(payload) => Some(format!("hook panicked: {}", panic_message(payload.as_ref()))),
        };

        if let Some(ref message) = error {
            warn!(hook = %selector, error = %message, "Hook failed");
            self.emit(
                "hook.failed",
                serde_json::json!({
                    "hook": selector,
                    "error": message,
                }),
            );
        }

        run.add_hook_run(HookRun {
            selector,
            error,
            duration_ms: timer.finish(),
        });
    }

    fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.event_sink
            .emit(&PipelineEvent::new(&self.config.pipeline_name, event_type, data));
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.config.pipeline_name)
            .field("stages", &self.stage_names())
            .field("hooks", &self.hooks)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Validates and runs a stage sequence in one call.
///
/// Equivalent to building a pipeline with [`PipelineBuilder`] and calling
/// [`Pipeline::run`].
///
/// # Errors
///
/// Returns a [`PipelineValidationError`] if the stage list is empty, a name
/// is blank, or names repeat. No stage or hook runs in that case.
pub async fn run(
    stages: Vec<StageSpec>,
    hooks: PostHooks,
    environment: EnvironmentSnapshot,
    config: ExecutorConfig,
) -> Result<RunContext, PipelineValidationError> {
    let pipeline = PipelineBuilder::new(config.pipeline_name.clone())
        .with_config(config)
        .with_stages(stages)
        .with_hooks(hooks)
        .build()?;

    Ok(pipeline.run(environment).await)
}
