//! The run context threaded through a pipeline run.

use super::EnvironmentSnapshot;
use crate::archive::{ArchiveResult, ArtifactArchiveRequest};
use crate::core::{Outcome, StageRecord, StageStatus};
use crate::pipeline::HookRun;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// State of a single pipeline run.
///
/// Only the executor mutates a `RunContext`. Stage records are append-only
/// and [`RunContext::outcome`] leaves [`Outcome::Pending`] exactly once,
/// when the run is finalized.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    run_id: Uuid,
    pipeline_name: String,
    environment: EnvironmentSnapshot,
    outcome: Outcome,
    #[serde(skip)]
    running_outcome: Outcome,
    executed_stages: Vec<StageRecord>,
    archive_requests: Vec<ArtifactArchiveRequest>,
    archive_results: Vec<ArchiveResult>,
    hook_runs: Vec<HookRun>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl RunContext {
    pub(crate) fn new(pipeline_name: impl Into<String>, environment: EnvironmentSnapshot) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
            environment,
            outcome: Outcome::Pending,
            running_outcome: Outcome::Pending,
            executed_stages: Vec::new(),
            archive_requests: Vec::new(),
            archive_results: Vec::new(),
            hook_runs: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Unique identifier of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Name of the pipeline being run.
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    /// The environment the run was started with.
    #[must_use]
    pub fn environment(&self) -> &EnvironmentSnapshot {
        &self.environment
    }

    /// The final outcome; [`Outcome::Pending`] until the run is finalized.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// The worst outcome observed so far.
    ///
    /// While stages are running this reflects fatal and logged failures
    /// recorded up to now; after finalization it equals [`Self::outcome`].
    #[must_use]
    pub fn current_outcome(&self) -> Outcome {
        if self.outcome.is_terminal() {
            self.outcome
        } else {
            self.running_outcome
        }
    }

    /// Stages visited so far, in execution order.
    #[must_use]
    pub fn executed_stages(&self) -> &[StageRecord] {
        &self.executed_stages
    }

    /// Looks up the record of a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.executed_stages.iter().find(|r| r.name == name)
    }

    /// Status of a stage, if it was visited.
    #[must_use]
    pub fn status_of(&self, name: &str) -> Option<StageStatus> {
        self.stage(name).map(|r| r.status)
    }

    /// Recorded statuses in execution order.
    #[must_use]
    pub fn statuses(&self) -> Vec<(&str, StageStatus)> {
        self.executed_stages
            .iter()
            .map(|r| (r.name.as_str(), r.status))
            .collect()
    }

    /// Archive requests collected from stages.
    #[must_use]
    pub fn archive_requests(&self) -> &[ArtifactArchiveRequest] {
        &self.archive_requests
    }

    /// Results of the archiving step.
    #[must_use]
    pub fn archive_results(&self) -> &[ArchiveResult] {
        &self.archive_results
    }

    /// Hooks invoked during finalization.
    #[must_use]
    pub fn hook_runs(&self) -> &[HookRun] {
        &self.hook_runs
    }

    /// When the run started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the run was finalized.
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Wall-clock duration in milliseconds, once finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    /// Returns true if any stage was recorded as a fatal failure.
    #[must_use]
    pub fn has_fatal_failure(&self) -> bool {
        self.executed_stages
            .iter()
            .any(|r| r.status == StageStatus::Failed)
    }

    /// Counts stages with the given status.
    #[must_use]
    pub fn count(&self, status: StageStatus) -> usize {
        self.executed_stages
            .iter()
            .filter(|r| r.status == status)
            .count()
    }

    /// One-line human readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} [{}]: {} ({} succeeded, {} skipped, {} failed, {} failed non-fatally)",
            self.pipeline_name,
            self.run_id,
            self.current_outcome(),
            self.count(StageStatus::Succeeded),
            self.count(StageStatus::Skipped),
            self.count(StageStatus::Failed),
            self.count(StageStatus::FailedNonfatal),
        )
    }

    pub(crate) fn record(&mut self, record: StageRecord) {
        let degraded = match record.status {
            StageStatus::Failed => Outcome::Failure,
            StageStatus::FailedNonfatal => Outcome::Unstable,
            StageStatus::Succeeded | StageStatus::Skipped => Outcome::Pending,
        };
        self.running_outcome = self.running_outcome.worsen(degraded);
        self.executed_stages.push(record);
    }

    pub(crate) fn add_archive_requests(
        &mut self,
        requests: impl IntoIterator<Item = ArtifactArchiveRequest>,
    ) {
        self.archive_requests.extend(requests);
    }

    pub(crate) fn add_archive_result(&mut self, result: ArchiveResult) {
        self.archive_results.push(result);
    }

    pub(crate) fn add_hook_run(&mut self, run: HookRun) {
        self.hook_runs.push(run);
    }

    /// Fixes the outcome. Subsequent calls leave it untouched.
    pub(crate) fn finalize(&mut self) -> Outcome {
        if self.outcome.is_terminal() {
            return self.outcome;
        }

        self.outcome = match self.running_outcome {
            Outcome::Pending if self.has_fatal_failure() => Outcome::Failure,
            Outcome::Pending => Outcome::Success,
            other => other,
        };
        self.finished_at = Some(Utc::now());
        self.outcome
    }
}
