//! Executor configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_pipeline_name() -> String {
    "pipeline".to_string()
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

/// Settings that apply to a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Name used in logs, events and the run context.
    #[serde(default = "default_pipeline_name")]
    pub pipeline_name: String,
    /// Wall-clock budget for all stages, in seconds.
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
    /// Directory stage commands run in and artifacts are collected from.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pipeline_name: default_pipeline_name(),
            timeout_seconds: None,
            workspace: default_workspace(),
        }
    }
}

impl ExecutorConfig {
    /// Creates a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = name.into();
        self
    }

    /// Sets the wall-clock timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = Some(timeout.as_secs_f64());
        self
    }

    /// Sets the wall-clock timeout in seconds.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Sets the workspace directory.
    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// The timeout as a duration.
    ///
    /// Negative, NaN and infinite values mean no timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}
