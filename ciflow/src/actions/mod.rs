//! Stage actions for CI pipelines.
//!
//! - [`command`]: command specs and the process runner
//! - [`ports`]: collaborator traits (package manager, scanner, container engine)
//! - [`tools`]: command-backed collaborator adapters
//! - [`stages`]: the stages and hooks a CI pipeline is assembled from

mod command;
mod ports;
pub mod retry;
mod stages;
mod tools;

pub use command::{
    expand_variables, CommandOutput, CommandRunner, CommandSpec, ShellCommandRunner,
};
pub use ports::{
    ContainerEngine, CredentialProvider, Credentials, EnvCredentialProvider, ImageRef,
    PackageManager, ScanReport, Severity, TestRunner, VulnerabilityScanner,
};
pub use retry::{wait_until_ready, with_retry, RetryConfig};
pub use stages::{
    ArchiveStage, BuildImageStage, CommandHook, EnvironmentCheckStage, InstallDependenciesStage,
    PushImageStage, RunTestsStage, SecurityScanStage, SummaryHook,
};
pub use tools::{CommandScanner, CommandTestRunner, DockerEngine, NpmPackageManager};

