//! Error types for the ciflow executor.
//!
//! Configuration problems surface as [`PipelineValidationError`] before a run
//! starts. Everything that goes wrong inside a stage is classified as a
//! [`StageFailure`] and recorded on the run instead of being returned.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for ciflow operations.
#[derive(Debug, Error)]
pub enum CiflowError {
    /// The pipeline definition is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// An external command failed.
    #[error("{0}")]
    Command(#[from] CommandError),

    /// Archiving artifacts failed.
    #[error("{0}")]
    Archive(#[from] ArchiveError),

    /// Registry credentials could not be resolved.
    #[error("{0}")]
    Credential(#[from] CredentialError),

    /// Logging could not be initialized.
    #[error("Logging initialization failed: {0}")]
    Logging(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata about a configuration error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONFIG-DUPLICATE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Renders the info as a JSON object, omitting an absent hint and empty context.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Error raised when a pipeline definition is rejected before execution.
///
/// No stage runs and no hook is invoked when this error is returned.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// The pipeline has no stages.
    #[must_use]
    pub fn empty_pipeline() -> Self {
        Self::new("Pipeline has no stages").with_error_info(
            ContractErrorInfo::new("CONFIG-EMPTY", "Cannot run an empty pipeline")
                .with_fix_hint("Add at least one stage to the pipeline before building."),
        )
    }

    /// Two stages share a name.
    #[must_use]
    pub fn duplicate_stage(name: &str) -> Self {
        Self::new(format!("Duplicate stage name '{name}'"))
            .with_stages(vec![name.to_string()])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONFIG-DUPLICATE",
                    format!("Stage '{name}' is defined more than once"),
                )
                .with_fix_hint("Stage names must be unique within a pipeline."),
            )
    }

    /// A stage has an empty name.
    #[must_use]
    pub fn empty_stage_name(position: usize) -> Self {
        Self::new(format!("Stage at position {position} has an empty name")).with_error_info(
            ContractErrorInfo::new("CONFIG-EMPTY-NAME", "Stage names must not be blank")
                .with_context_entry("position", position.to_string()),
        )
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Why a stage action did not succeed.
///
/// The executor turns every one of these into a recorded status according to
/// the stage's failure policy. None of them escapes a run.
#[derive(Debug, Error)]
pub enum StageFailure {
    /// The action returned an error.
    #[error("{0:#}")]
    Action(anyhow::Error),

    /// The action panicked.
    #[error("stage panicked: {0}")]
    Panicked(String),

    /// The pipeline deadline elapsed while (or before) the stage ran.
    #[error("pipeline timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),
}

impl StageFailure {
    /// Builds a panic failure from a caught unwind payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        Self::Panicked(panic_message(payload))
    }

    /// Returns true if this failure was injected by the executor deadline.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Errors from running external commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be started.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully.
    #[error("'{command}' exited with status {code:?}: {stderr_tail}")]
    NonZeroExit {
        /// Rendered command line.
        command: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Last lines of stderr.
        stderr_tail: String,
    },

    /// The command line was empty.
    #[error("empty command")]
    Empty,
}

/// Errors from the artifact archive sink.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Nothing matched and the request does not allow empty archives.
    #[error("no artifacts matched '{pattern}'")]
    NoMatches {
        /// The glob pattern.
        pattern: String,
    },

    /// The glob pattern could not be compiled.
    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The glob pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Copying or walking failed.
    #[error("archive IO error at {path}: {source}")]
    Io {
        /// The path being processed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from credential providers.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// A required variable is absent or empty.
    #[error("credential variable '{0}' is not set")]
    Missing(String),
}
