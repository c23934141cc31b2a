//! # Ciflow
//!
//! A sequential CI pipeline executor.
//!
//! Ciflow runs an ordered list of named stages against an immutable
//! environment snapshot:
//!
//! - **Conditional stages**: a stage runs only when its [`Condition`] holds,
//!   otherwise it is recorded as skipped
//! - **Failure policies**: a `Fatal` failure stops the run, a `Logged` one
//!   marks it unstable and execution continues
//! - **Post hooks**: an `always` hook plus one hook per final outcome
//! - **Timeouts**: a wall-clock budget that aborts the running stage
//! - **Artifact archiving**: stages declare glob requests, a sink copies the
//!   matching files once the run ends
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ciflow::prelude::*;
//!
//! let pipeline = PipelineBuilder::new("ci")
//!     .stage("build", Arc::new(BuildStage::new()))
//!     .logged_stage("lint", Arc::new(LintStage::new()))
//!     .conditional_stage("deploy", Arc::new(DeployStage::new()), Condition::branch("main"))
//!     .with_hooks(PostHooks::new().always(Arc::new(CleanupHook)))
//!     .build()?;
//!
//! let run = pipeline.run(EnvironmentSnapshot::from_process_env()).await;
//! println!("{}", run.summary());
//! ```
//!
//! [`Condition`]: pipeline::Condition

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod actions;
pub mod archive;
pub mod ci;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::archive::{ArtifactArchiveRequest, ArtifactSink, FileSystemArchiveSink};
    pub use crate::context::{EnvironmentSnapshot, RunContext, StageContext};
    pub use crate::core::{FailurePolicy, Outcome, StageRecord, StageStatus};
    pub use crate::errors::{
        CiflowError, ContractErrorInfo, PipelineValidationError, StageFailure,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_logging, LoggingConfig};
    pub use crate::pipeline::{
        Condition, ExecutorConfig, FnHook, Hook, HookSelector, Pipeline, PipelineBuilder,
        PostHooks, StageSpec,
    };
    pub use crate::stages::{AsyncFnStage, FnStage, Stage};
    pub use std::sync::Arc;
}
