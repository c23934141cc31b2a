//! Context management for pipeline runs.
//!
//! This module provides:
//! - Immutable environment snapshots captured at run start
//! - The run context owned and mutated by the executor
//! - The read-only per-stage view handed to stage actions

mod environment;
mod run;
mod stage;

pub use environment::EnvironmentSnapshot;
pub use run::RunContext;
pub use stage::StageContext;
