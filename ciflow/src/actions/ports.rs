//! Collaborator ports.
//!
//! The CI stages talk to external tools only through these traits. The
//! command-backed adapters live in [`super::tools`]; tests substitute
//! generated mocks.

use crate::context::EnvironmentSnapshot;
use crate::errors::CredentialError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Installs project dependencies.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Installs dependencies. `lockfile_strict` refuses to touch the lockfile.
    async fn install(&self, lockfile_strict: bool) -> anyhow::Result<()>;
}

/// Runs the project's test suite.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Runs the tests.
    async fn run(&self) -> anyhow::Result<()>;
}

/// Minimum severity a scanner reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low.
    Low,
    /// Medium.
    Medium,
    /// High.
    #[default]
    High,
    /// Critical.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// What a scanner produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Which scanner produced the report.
    pub scanner: String,
    /// The threshold the scan ran with.
    pub threshold: Severity,
    /// Report file, relative to the workspace, if one was written.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

/// Scans the project for known vulnerabilities.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VulnerabilityScanner: Send + Sync {
    /// Scans at or above `threshold`.
    async fn scan(&self, threshold: Severity) -> anyhow::Result<ScanReport>;
}

/// A container image reference, `registry/name:tag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    /// Registry host, possibly empty for local images.
    pub registry: String,
    /// Repository name.
    pub name: String,
    /// Tag.
    pub tag: String,
}

impl ImageRef {
    /// Creates an image reference.
    #[must_use]
    pub fn new(registry: impl Into<String>, name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// The same image under another tag.
    #[must_use]
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            registry: self.registry.clone(),
            name: self.name.clone(),
            tag: tag.into(),
        }
    }

    /// `registry/name`, or `name` without a registry.
    #[must_use]
    pub fn repository(&self) -> String {
        let registry = self.registry.trim_end_matches('/');
        if registry.is_empty() {
            self.name.clone()
        } else {
            format!("{registry}/{}", self.name)
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository(), self.tag)
    }
}

/// A username and password pair for a registry.
///
/// `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Registry user.
    pub username: String,
    password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The secret.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Builds, tags and pushes container images.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Checks that the engine daemon answers.
    async fn ping(&self) -> anyhow::Result<()>;

    /// Builds an image tagged `image`.
    async fn build(&self, image: &ImageRef) -> anyhow::Result<ImageRef>;

    /// Adds `alias` as another name for `image`.
    async fn tag(&self, image: &ImageRef, alias: &ImageRef) -> anyhow::Result<()>;

    /// Pushes `image` to `registry`.
    async fn push(
        &self,
        image: &ImageRef,
        registry: &str,
        credentials: &Credentials,
    ) -> anyhow::Result<()>;
}

/// Supplies registry credentials for the push stage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolves credentials for the current run.
    async fn credentials(&self, env: &EnvironmentSnapshot) -> Result<Credentials, CredentialError>;
}

/// Reads credentials from two environment variables of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvCredentialProvider {
    username_var: String,
    password_var: String,
}

impl EnvCredentialProvider {
    /// Creates a provider reading the given variables.
    #[must_use]
    pub fn new(username_var: impl Into<String>, password_var: impl Into<String>) -> Self {
        Self {
            username_var: username_var.into(),
            password_var: password_var.into(),
        }
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new("REGISTRY_USERNAME", "REGISTRY_PASSWORD")
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn credentials(&self, env: &EnvironmentSnapshot) -> Result<Credentials, CredentialError> {
        let read = |var: &str| {
            env.get(var)
                .filter(|v| !v.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| CredentialError::Missing(var.to_string()))
        };

        Ok(Credentials::new(read(&self.username_var)?, read(&self.password_var)?))
    }
}
