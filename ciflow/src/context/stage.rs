//! The per-stage view handed to stage actions.

use super::{EnvironmentSnapshot, RunContext};
use crate::actions::expand_variables;
use crate::archive::ArtifactArchiveRequest;
use parking_lot::Mutex;
use std::path::Path;

/// What a stage action can see and produce.
///
/// The run itself is read-only here. The only side effect a stage can
/// declare through its context is an archive request; the executor moves
/// those into the run after the action returns.
#[derive(Debug)]
pub struct StageContext<'a> {
    run: &'a RunContext,
    stage_name: &'a str,
    workspace: &'a Path,
    archive_requests: Mutex<Vec<ArtifactArchiveRequest>>,
}

impl<'a> StageContext<'a> {
    /// Creates a stage view over a run.
    #[must_use]
    pub fn new(run: &'a RunContext, stage_name: &'a str, workspace: &'a Path) -> Self {
        Self {
            run,
            stage_name,
            workspace,
            archive_requests: Mutex::new(Vec::new()),
        }
    }

    /// The run being executed.
    #[must_use]
    pub fn run(&self) -> &RunContext {
        self.run
    }

    /// The name of the stage being executed.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        self.stage_name
    }

    /// The workspace directory commands run in.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        self.workspace
    }

    /// The run's environment snapshot.
    #[must_use]
    pub fn environment(&self) -> &EnvironmentSnapshot {
        self.run.environment()
    }

    /// Shorthand for reading one environment variable.
    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.run.environment().get(key)
    }

    /// Expands `$NAME` and `${NAME}` references against the environment.
    #[must_use]
    pub fn expand(&self, template: &str) -> String {
        expand_variables(template, self.run.environment())
    }

    /// Declares files to archive once the run finishes.
    pub fn archive(&self, request: ArtifactArchiveRequest) {
        self.archive_requests.lock().push(request);
    }

    /// Archive requests declared so far.
    #[must_use]
    pub fn pending_archive_requests(&self) -> Vec<ArtifactArchiveRequest> {
        self.archive_requests.lock().clone()
    }

    pub(crate) fn into_archive_requests(self) -> Vec<ArtifactArchiveRequest> {
        self.archive_requests.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_context_reads_environment() {
        let run = RunContext::new(
            "ci",
            EnvironmentSnapshot::from_pairs([("IMAGE_NAME", "web"), ("TAG", "42")]),
        );
        let ctx = StageContext::new(&run, "build", Path::new("."));

        assert_eq!(ctx.stage_name(), "build");
        assert_eq!(ctx.env("IMAGE_NAME"), Some("web"));
        assert_eq!(ctx.expand("${IMAGE_NAME}:$TAG"), "web:42");
    }

    #[test]
    fn test_archive_requests_are_collected() {
        let run = RunContext::new("ci", EnvironmentSnapshot::new());
        let ctx = StageContext::new(&run, "test", Path::new("."));

        ctx.archive(ArtifactArchiveRequest::new("reports/*.xml").allow_empty());
        assert_eq!(ctx.pending_archive_requests().len(), 1);

        let requests = ctx.into_archive_requests();
        assert_eq!(requests[0].glob_pattern, "reports/*.xml");
        assert!(requests[0].allow_empty);
    }
}
