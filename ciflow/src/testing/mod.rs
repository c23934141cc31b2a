//! Testing utilities for ciflow pipelines.
//!
//! This module provides:
//! - Scripted stages and hooks
//! - A command runner that records instead of executing
//! - Assertions over finished runs

mod assertions;
mod mocks;

pub use assertions::{assert_not_recorded, assert_outcome, assert_stage_status, assert_statuses};
pub use mocks::{MockStage, PanickingStage, RecordingHook, ScriptedCommandRunner, SlowStage};
