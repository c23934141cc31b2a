//! Stage actions and hooks for a CI pipeline.
//!
//! Every action here is a thin shell around a collaborator port. Archive
//! requests are declared before the work starts so that a failing test or
//! scan still leaves its report behind.

use super::command::{expand_variables, CommandRunner, CommandSpec};
use super::ports::{
    ContainerEngine, CredentialProvider, ImageRef, PackageManager, Severity, TestRunner,
    VulnerabilityScanner,
};
use super::retry::wait_until_ready;
use crate::archive::{ArtifactArchiveRequest, GlobPattern};
use crate::context::{RunContext, StageContext};
use crate::pipeline::Hook;
use crate::stages::Stage;
use anyhow::Context as _;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};

/// Fails when required variables are missing, then records tool versions.
#[derive(Debug, Clone)]
pub struct EnvironmentCheckStage {
    runner: Arc<dyn CommandRunner>,
    required: Vec<String>,
    tool_checks: Vec<CommandSpec>,
}

impl EnvironmentCheckStage {
    /// Creates a check for the given variables.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, required: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            runner,
            required: required.into_iter().map(Into::into).collect(),
            tool_checks: Vec::new(),
        }
    }

    /// Adds a command whose first output line is logged as a tool version.
    #[must_use]
    pub fn with_tool_check(mut self, spec: CommandSpec) -> Self {
        self.tool_checks.push(spec);
        self
    }
}

#[async_trait]
impl Stage for EnvironmentCheckStage {
    async fn execute(&self, ctx: &StageContext<'_>) -> anyhow::Result<()> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .map(String::as_str)
            .filter(|var| !ctx.environment().is_set(var))
            .collect();
        anyhow::ensure!(
            missing.is_empty(),
            "missing required environment variables: {}",
            missing.join(", ")
        );

        for check in &self.tool_checks {
            let spec = check.clone().current_dir(ctx.workspace());
            let output = self.runner.run_checked(&spec).await?;
            info!(stage = %ctx.stage_name(), tool = %spec, version = %output.first_line(), "Tool available");
        }
        Ok(())
    }
}

/// Installs dependencies through a [`PackageManager`].
#[derive(Clone)]
pub struct InstallDependenciesStage {
    manager: Arc<dyn PackageManager>,
    lockfile_strict: bool,
}

impl InstallDependenciesStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(manager: Arc<dyn PackageManager>, lockfile_strict: bool) -> Self {
        Self {
            manager,
            lockfile_strict,
        }
    }
}

impl fmt::Debug for InstallDependenciesStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallDependenciesStage")
            .field("lockfile_strict", &self.lockfile_strict)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for InstallDependenciesStage {
    async fn execute(&self, _ctx: &StageContext<'_>) -> anyhow::Result<()> {
        self.manager
            .install(self.lockfile_strict)
            .await
            .context("dependency installation failed")
    }
}

/// Runs the test suite and archives its reports.
#[derive(Clone)]
pub struct RunTestsStage {
    runner: Arc<dyn TestRunner>,
    report_glob: Option<String>,
}

impl RunTestsStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(runner: Arc<dyn TestRunner>) -> Self {
        Self {
            runner,
            report_glob: None,
        }
    }

    /// Archives reports matching `glob`; an empty match is fine.
    #[must_use]
    pub fn with_reports(mut self, glob: impl Into<String>) -> Self {
        self.report_glob = Some(glob.into());
        self
    }
}

impl fmt::Debug for RunTestsStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunTestsStage")
            .field("report_glob", &self.report_glob)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for RunTestsStage {
    async fn execute(&self, ctx: &StageContext<'_>) -> anyhow::Result<()> {
        if let Some(ref glob) = self.report_glob {
            ctx.archive(ArtifactArchiveRequest::new(glob.clone()).allow_empty());
        }
        self.runner.run().await.context("tests failed")
    }
}

/// Scans for vulnerabilities, falling back to a second scanner on error.
#[derive(Clone)]
pub struct SecurityScanStage {
    primary: Arc<dyn VulnerabilityScanner>,
    fallback: Option<Arc<dyn VulnerabilityScanner>>,
    threshold: Severity,
    report_glob: Option<String>,
}

impl SecurityScanStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(primary: Arc<dyn VulnerabilityScanner>, threshold: Severity) -> Self {
        Self {
            primary,
            fallback: None,
            threshold,
            report_glob: None,
        }
    }

    /// Scanner used only when the primary one errors.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn VulnerabilityScanner>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Archives reports matching `glob`; an empty match is fine.
    #[must_use]
    pub fn with_reports(mut self, glob: impl Into<String>) -> Self {
        self.report_glob = Some(glob.into());
        self
    }
}

impl fmt::Debug for SecurityScanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityScanStage")
            .field("threshold", &self.threshold)
            .field("has_fallback", &self.fallback.is_some())
            .field("report_glob", &self.report_glob)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for SecurityScanStage {
    async fn execute(&self, ctx: &StageContext<'_>) -> anyhow::Result<()> {
        if let Some(ref glob) = self.report_glob {
            ctx.archive(ArtifactArchiveRequest::new(glob.clone()).allow_empty());
        }

        let report = match self.primary.scan(self.threshold).await {
            Ok(report) => report,
            Err(primary_error) => {
                let Some(ref fallback) = self.fallback else {
                    return Err(primary_error.context("security scan failed"));
                };
                warn!(
                    stage = %ctx.stage_name(),
                    error = %format!("{primary_error:#}"),
                    "Primary scanner failed, trying fallback"
                );
                fallback
                    .scan(self.threshold)
                    .await
                    .context("fallback security scan failed")?
            }
        };

        info!(
            stage = %ctx.stage_name(),
            scanner = %report.scanner,
            threshold = %report.threshold,
            "Security scan completed"
        );
        Ok(())
    }
}

/// Expands `$VAR` references in each part of an image reference.
fn expand_image(image: &ImageRef, ctx: &StageContext<'_>) -> anyhow::Result<ImageRef> {
    let expanded = ImageRef::new(
        ctx.expand(&image.registry),
        ctx.expand(&image.name),
        ctx.expand(&image.tag),
    );
    anyhow::ensure!(!expanded.name.is_empty(), "image name is empty");
    anyhow::ensure!(!expanded.tag.is_empty(), "image tag for {} is empty", expanded.name);
    Ok(expanded)
}

/// Waits for the container engine, builds the image and tags an alias.
#[derive(Clone)]
pub struct BuildImageStage {
    engine: Arc<dyn ContainerEngine>,
    image: ImageRef,
    alias_tag: Option<String>,
    ready_attempts: usize,
    ready_interval: Duration,
}

impl BuildImageStage {
    /// Creates the stage. Parts of `image` may reference run variables.
    #[must_use]
    pub fn new(engine: Arc<dyn ContainerEngine>, image: ImageRef) -> Self {
        Self {
            engine,
            image,
            alias_tag: Some("latest".to_string()),
            ready_attempts: 5,
            ready_interval: Duration::from_secs(2),
        }
    }

    /// Tag added after the build; `None` disables aliasing.
    #[must_use]
    pub fn with_alias_tag(mut self, tag: Option<String>) -> Self {
        self.alias_tag = tag;
        self
    }

    /// How long to wait for the engine to answer.
    #[must_use]
    pub fn with_readiness(mut self, attempts: usize, interval: Duration) -> Self {
        self.ready_attempts = attempts;
        self.ready_interval = interval;
        self
    }
}

impl fmt::Debug for BuildImageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildImageStage")
            .field("image", &self.image)
            .field("alias_tag", &self.alias_tag)
            .field("ready_attempts", &self.ready_attempts)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for BuildImageStage {
    async fn execute(&self, ctx: &StageContext<'_>) -> anyhow::Result<()> {
        let image = expand_image(&self.image, ctx)?;

        wait_until_ready("container engine", self.ready_attempts, self.ready_interval, || {
            self.engine.ping()
        })
        .await?;

        let built = self
            .engine
            .build(&image)
            .await
            .with_context(|| format!("building {image}"))?;

        if let Some(ref alias) = self.alias_tag {
            let aliased = built.with_tag(alias.clone());
            self.engine
                .tag(&built, &aliased)
                .await
                .with_context(|| format!("tagging {built} as {aliased}"))?;
        }

        info!(stage = %ctx.stage_name(), image = %built, "Image ready");
        Ok(())
    }
}

/// Pushes the image and its alias using freshly resolved credentials.
#[derive(Clone)]
pub struct PushImageStage {
    engine: Arc<dyn ContainerEngine>,
    credentials: Arc<dyn CredentialProvider>,
    image: ImageRef,
    alias_tag: Option<String>,
}

impl PushImageStage {
    /// Creates the stage. Parts of `image` may reference run variables.
    #[must_use]
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        credentials: Arc<dyn CredentialProvider>,
        image: ImageRef,
    ) -> Self {
        Self {
            engine,
            credentials,
            image,
            alias_tag: Some("latest".to_string()),
        }
    }

    /// Alias tag pushed after the main tag; `None` pushes only the main tag.
    #[must_use]
    pub fn with_alias_tag(mut self, tag: Option<String>) -> Self {
        self.alias_tag = tag;
        self
    }
}

impl fmt::Debug for PushImageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushImageStage")
            .field("image", &self.image)
            .field("alias_tag", &self.alias_tag)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for PushImageStage {
    async fn execute(&self, ctx: &StageContext<'_>) -> anyhow::Result<()> {
        let image = expand_image(&self.image, ctx)?;
        let credentials = self.credentials.credentials(ctx.environment()).await?;

        let mut targets = vec![image.clone()];
        if let Some(ref alias) = self.alias_tag {
            targets.push(image.with_tag(alias.clone()));
        }

        for target in &targets {
            self.engine
                .push(target, &image.registry, &credentials)
                .await
                .with_context(|| format!("pushing {target}"))?;
            info!(stage = %ctx.stage_name(), image = %target, "Image pushed");
        }
        Ok(())
    }
}

/// Declares archive requests without doing any other work.
#[derive(Debug, Clone, Default)]
pub struct ArchiveStage {
    requests: Vec<ArtifactArchiveRequest>,
}

impl ArchiveStage {
    /// Creates a stage archiving the given requests.
    #[must_use]
    pub fn new(requests: impl IntoIterator<Item = ArtifactArchiveRequest>) -> Self {
        Self {
            requests: requests.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Stage for ArchiveStage {
    async fn execute(&self, ctx: &StageContext<'_>) -> anyhow::Result<()> {
        for request in &self.requests {
            GlobPattern::new(&request.glob_pattern)?;
            ctx.archive(request.clone());
        }
        Ok(())
    }
}

/// Runs a shell command as a post-run hook, for example workspace cleanup.
#[derive(Debug, Clone)]
pub struct CommandHook {
    runner: Arc<dyn CommandRunner>,
    command: String,
    workspace: PathBuf,
}

impl CommandHook {
    /// Creates a hook for a shell command line. `$VAR` references are
    /// expanded against the run environment.
    #[must_use]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        command: impl Into<String>,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            command: command.into(),
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl Hook for CommandHook {
    async fn run(&self, run: &RunContext) -> anyhow::Result<()> {
        let line = expand_variables(&self.command, run.environment());
        let spec = CommandSpec::shell(line).current_dir(&self.workspace);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }
}

/// Logs the run summary at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct SummaryHook {
    level: Level,
}

impl SummaryHook {
    /// Creates a hook logging at `level`.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }
}

#[async_trait]
impl Hook for SummaryHook {
    async fn run(&self, run: &RunContext) -> anyhow::Result<()> {
        let summary = run.summary();
        match self.level {
            Level::ERROR => error!(run_id = %run.run_id(), "{summary}"),
            Level::WARN => warn!(run_id = %run.run_id(), "{summary}"),
            _ => info!(run_id = %run.run_id(), "{summary}"),
        }
        Ok(())
    }
}
