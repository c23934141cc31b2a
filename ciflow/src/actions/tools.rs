//! Command-backed collaborator adapters.
//!
//! Each adapter renders the tool's command line and hands it to a
//! [`CommandRunner`]. None of them interprets tool output beyond exit status.

use super::command::{CommandRunner, CommandSpec};
use super::ports::{
    ContainerEngine, Credentials, ImageRef, PackageManager, ScanReport, Severity, TestRunner,
    VulnerabilityScanner,
};
use anyhow::Context as _;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// `npm ci` / `npm install`.
#[derive(Debug, Clone)]
pub struct NpmPackageManager {
    runner: Arc<dyn CommandRunner>,
    workspace: PathBuf,
}

impl NpmPackageManager {
    /// Creates an npm adapter running in `workspace`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl PackageManager for NpmPackageManager {
    async fn install(&self, lockfile_strict: bool) -> anyhow::Result<()> {
        let subcommand = if lockfile_strict { "ci" } else { "install" };
        let spec = CommandSpec::new("npm")
            .arg(subcommand)
            .current_dir(&self.workspace);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }
}

/// Runs a test command line through the shell.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    runner: Arc<dyn CommandRunner>,
    command: String,
    workspace: PathBuf,
}

impl CommandTestRunner {
    /// Creates a test runner for a shell command line.
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
impl TestRunner for CommandTestRunner {
    async fn run(&self) -> anyhow::Result<()> {
        let spec = CommandSpec::shell(&self.command).current_dir(&self.workspace);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }
}

/// Runs a scanner command line with `--severity <threshold>` appended.
#[derive(Debug, Clone)]
pub struct CommandScanner {
    runner: Arc<dyn CommandRunner>,
    command: String,
    workspace: PathBuf,
    report_path: Option<PathBuf>,
}

impl CommandScanner {
    /// Creates a scanner for a shell command line.
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
            report_path: None,
        }
    }

    /// Writes the scanner's stdout to `path`, relative to the workspace.
    #[must_use]
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }
}

#[async_trait]
impl VulnerabilityScanner for CommandScanner {
    async fn scan(&self, threshold: Severity) -> anyhow::Result<ScanReport> {
        let line = format!("{} --severity {threshold}", self.command);
        let spec = CommandSpec::shell(line).current_dir(&self.workspace);
        let output = self.runner.run_checked(&spec).await?;

        if let Some(ref relative) = self.report_path {
            let path = self.workspace.join(relative);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            tokio::fs::write(&path, output.stdout.as_bytes())
                .await
                .with_context(|| format!("writing scan report {}", path.display()))?;
        }

        Ok(ScanReport {
            scanner: self.command.clone(),
            threshold,
            report_path: self.report_path.clone(),
        })
    }
}

/// Drives the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    runner: Arc<dyn CommandRunner>,
    context_dir: PathBuf,
}

impl DockerEngine {
    /// Creates an engine that builds from `context_dir`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, context_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            context_dir: context_dir.into(),
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> anyhow::Result<()> {
        self.runner
            .run_checked(&CommandSpec::new("docker").arg("info"))
            .await?;
        Ok(())
    }

    async fn build(&self, image: &ImageRef) -> anyhow::Result<ImageRef> {
        let spec = CommandSpec::new("docker")
            .args(["build", "-t"])
            .arg(image.to_string())
            .arg(".")
            .current_dir(&self.context_dir);
        self.runner.run_checked(&spec).await?;
        info!(image = %image, "Built image");
        Ok(image.clone())
    }

    async fn tag(&self, image: &ImageRef, alias: &ImageRef) -> anyhow::Result<()> {
        let spec = CommandSpec::new("docker")
            .arg("tag")
            .arg(image.to_string())
            .arg(alias.to_string());
        self.runner.run_checked(&spec).await?;
        Ok(())
    }

    async fn push(
        &self,
        image: &ImageRef,
        registry: &str,
        credentials: &Credentials,
    ) -> anyhow::Result<()> {
        let login = CommandSpec::new("docker")
            .args(["login", registry, "-u", credentials.username.as_str(), "--password-stdin"])
            .stdin(credentials.password());
        self.runner
            .run_checked(&login)
            .await
            .with_context(|| format!("logging in to {registry}"))?;

        let push = CommandSpec::new("docker").arg("push").arg(image.to_string());
        self.runner.run_checked(&push).await?;
        info!(image = %image, "Pushed image");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCommandRunner;

    #[tokio::test]
    async fn test_npm_strict_uses_ci() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        let npm = NpmPackageManager::new(runner.clone(), "/ws");

        npm.install(true).await.unwrap();
        npm.install(false).await.unwrap();

        assert_eq!(runner.commands(), vec!["npm ci", "npm install"]);
        assert_eq!(runner.specs()[0].cwd, Some(PathBuf::from("/ws")));
    }

    #[tokio::test]
    async fn test_test_runner_failure_propagates() {
        let runner = Arc::new(ScriptedCommandRunner::new().fail_on("sh -c npm test", 1, "2 failing"));
        let tests = CommandTestRunner::new(runner, "npm test", ".");

        let err = tests.run().await.unwrap_err();
        assert!(err.to_string().contains("2 failing"));
    }

    #[tokio::test]
    async fn test_scanner_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            ScriptedCommandRunner::new().respond("sh -c audit", crate::actions::CommandOutput::ok("{\"vulns\":0}")),
        );
        let scanner = CommandScanner::new(runner.clone(), "audit", dir.path())
            .with_report_path("reports/scan.json");

        let report = scanner.scan(Severity::Critical).await.unwrap();
        assert_eq!(report.threshold, Severity::Critical);
        assert_eq!(runner.commands(), vec!["sh -c audit --severity critical"]);

        let written = std::fs::read_to_string(dir.path().join("reports/scan.json")).unwrap();
        assert_eq!(written, "{\"vulns\":0}");
    }

    #[tokio::test]
    async fn test_docker_push_logs_in_via_stdin() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        let docker = DockerEngine::new(runner.clone(), ".");
        let image = ImageRef::new("registry.local", "web", "7");

        docker.ping().await.unwrap();
        docker.build(&image).await.unwrap();
        docker.tag(&image, &image.with_tag("latest")).await.unwrap();
        docker
            .push(&image, "registry.local", &Credentials::new("bot", "pw123"))
            .await
            .unwrap();

        let commands = runner.commands();
        assert_eq!(
            commands,
            vec![
                "docker info",
                "docker build -t registry.local/web:7 .",
                "docker tag registry.local/web:7 registry.local/web:latest",
                "docker login registry.local -u bot --password-stdin",
                "docker push registry.local/web:7",
            ]
        );
        assert!(commands.iter().all(|c| !c.contains("pw123")));
        assert_eq!(runner.specs()[3].stdin.as_deref(), Some("pw123"));
    }
}
