//! Assembly of the reference CI pipeline.

use super::config::CiConfig;
use crate::actions::{
    ArchiveStage, BuildImageStage, CommandHook, CommandRunner, CommandScanner, CommandSpec,
    CommandTestRunner, ContainerEngine, CredentialProvider, DockerEngine, EnvCredentialProvider,
    EnvironmentCheckStage, InstallDependenciesStage, NpmPackageManager, PackageManager,
    PushImageStage, RunTestsStage, SecurityScanStage, SummaryHook, TestRunner,
    VulnerabilityScanner,
};
use crate::archive::ArtifactArchiveRequest;
use crate::errors::PipelineValidationError;
use crate::pipeline::{Condition, Pipeline, PipelineBuilder, PostHooks, StageSpec};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

/// Stage names of the reference pipeline, in execution order.
pub const CI_STAGES: [&str; 7] = [
    "check-environment",
    "install-dependencies",
    "run-tests",
    "security-scan",
    "build-image",
    "push-image",
    "archive-dist",
];

/// The external tools a CI run talks to.
#[derive(Clone)]
pub struct CiCollaborators {
    /// Runs tool version checks and the cleanup hook.
    pub runner: Arc<dyn CommandRunner>,
    /// Installs dependencies.
    pub packages: Arc<dyn PackageManager>,
    /// Runs the tests.
    pub tests: Arc<dyn TestRunner>,
    /// Primary vulnerability scanner.
    pub scanner: Arc<dyn VulnerabilityScanner>,
    /// Used when the primary scanner errors.
    pub fallback_scanner: Option<Arc<dyn VulnerabilityScanner>>,
    /// Builds and pushes images.
    pub engine: Arc<dyn ContainerEngine>,
    /// Registry credentials.
    pub credentials: Arc<dyn CredentialProvider>,
    /// Directory commands run in and artifacts are collected from.
    pub workspace: PathBuf,
}

impl CiCollaborators {
    /// Command-backed collaborators sharing one runner.
    #[must_use]
    pub fn from_commands(
        runner: Arc<dyn CommandRunner>,
        config: &CiConfig,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        let workspace = workspace.into();
        let scanner = |command: &str| -> Arc<dyn VulnerabilityScanner> {
            Arc::new(
                CommandScanner::new(Arc::clone(&runner), command, &workspace)
                    .with_report_path(&config.scan_report_path),
            )
        };

        Self {
            packages: Arc::new(NpmPackageManager::new(Arc::clone(&runner), &workspace)),
            tests: Arc::new(CommandTestRunner::new(
                Arc::clone(&runner),
                &config.test_command,
                &workspace,
            )),
            scanner: scanner(&config.scan_command),
            fallback_scanner: config.fallback_scan_command.as_deref().map(scanner),
            engine: Arc::new(DockerEngine::new(Arc::clone(&runner), &workspace)),
            credentials: Arc::new(EnvCredentialProvider::new(
                &config.registry_username_var,
                &config.registry_password_var,
            )),
            runner,
            workspace,
        }
    }
}

impl fmt::Debug for CiCollaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CiCollaborators")
            .field("runner", &self.runner)
            .field("has_fallback_scanner", &self.fallback_scanner.is_some())
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}

/// Builder for the reference pipeline, open for further configuration
/// such as a timeout or an event sink.
pub fn ci_pipeline_builder(
    config: &CiConfig,
    collaborators: CiCollaborators,
) -> Result<PipelineBuilder, PipelineValidationError> {
    config.validate()?;

    let [check, install, tests, scan, build, push, archive] = CI_STAGES;

    let mut environment_check =
        EnvironmentCheckStage::new(Arc::clone(&collaborators.runner), &config.required_env);
    for command in &config.tool_version_commands {
        environment_check = environment_check.with_tool_check(CommandSpec::shell(command));
    }

    let mut security_scan = SecurityScanStage::new(collaborators.scanner, config.severity_threshold)
        .with_reports(&config.scan_report_glob);
    if let Some(fallback) = collaborators.fallback_scanner {
        security_scan = security_scan.with_fallback(fallback);
    }

    let image = config.image();
    let hooks = PostHooks::new()
        .always(Arc::new(CommandHook::new(
            Arc::clone(&collaborators.runner),
            &config.cleanup_command,
            &collaborators.workspace,
        )))
        .on_success(Arc::new(SummaryHook::new(Level::INFO)))
        .on_failure(Arc::new(SummaryHook::new(Level::ERROR)))
        .on_unstable(Arc::new(SummaryHook::new(Level::WARN)));

    Ok(PipelineBuilder::new("ci")
        .add(StageSpec::new(check, Arc::new(environment_check)))
        .add(StageSpec::new(
            install,
            Arc::new(InstallDependenciesStage::new(
                collaborators.packages,
                config.lockfile_strict,
            )),
        ))
        .add(
            StageSpec::new(
                tests,
                Arc::new(RunTestsStage::new(collaborators.tests).with_reports(&config.test_report_glob)),
            )
            .logged(),
        )
        .add(StageSpec::new(scan, Arc::new(security_scan)).logged())
        .add(StageSpec::new(
            build,
            Arc::new(
                BuildImageStage::new(Arc::clone(&collaborators.engine), image.clone())
                    .with_readiness(config.daemon_ready_attempts, config.daemon_ready_interval()),
            ),
        ))
        .add(
            StageSpec::new(
                push,
                Arc::new(PushImageStage::new(
                    collaborators.engine,
                    collaborators.credentials,
                    image,
                )),
            )
            .with_condition(Condition::not_change_request()),
        )
        .add(
            StageSpec::new(
                archive,
                Arc::new(ArchiveStage::new([
                    ArtifactArchiveRequest::new(&config.dist_glob).allow_empty(),
                ])),
            )
            .logged(),
        )
        .with_hooks(hooks)
        .with_workspace(collaborators.workspace))
}

/// Assembles the reference CI pipeline.
pub fn build_ci_pipeline(
    config: &CiConfig,
    collaborators: CiCollaborators,
) -> Result<Pipeline, PipelineValidationError> {
    ci_pipeline_builder(config, collaborators)?.build()
}
