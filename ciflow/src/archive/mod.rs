//! Artifact archiving.
//!
//! Stages describe what to keep with [`ArtifactArchiveRequest`]s; the
//! executor hands them to an [`ArtifactSink`] once the run's outcome is
//! fixed. Archive failures are logged and recorded, never fatal.

mod glob;
mod sink;

pub use glob::GlobPattern;
pub use sink::{ArtifactSink, FileSystemArchiveSink};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A declarative request to archive files matching a glob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactArchiveRequest {
    /// Glob pattern relative to the workspace. Comma-separated lists allowed.
    pub glob_pattern: String,
    /// Whether an empty match is acceptable.
    #[serde(default)]
    pub allow_empty: bool,
}

impl ArtifactArchiveRequest {
    /// Creates a request that fails when nothing matches.
    #[must_use]
    pub fn new(glob_pattern: impl Into<String>) -> Self {
        Self {
            glob_pattern: glob_pattern.into(),
            allow_empty: false,
        }
    }

    /// Allows the request to match nothing.
    #[must_use]
    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }
}

/// Files a sink archived for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedArtifacts {
    /// The pattern that was archived.
    pub pattern: String,
    /// Archived files, relative to the workspace.
    pub files: Vec<PathBuf>,
}

/// The recorded result of archiving one request during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveResult {
    /// The originating request.
    pub request: ArtifactArchiveRequest,
    /// Archived files, empty on failure.
    pub files: Vec<PathBuf>,
    /// Error message if archiving failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ArchiveResult {
    /// Returns true if archiving this request succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
