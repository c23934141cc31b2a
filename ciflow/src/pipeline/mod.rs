//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage definitions with entry conditions and failure policies
//! - Post-run hooks selected by outcome
//! - A pipeline builder with validation
//! - The sequential executor

mod builder;
mod condition;
mod config;
mod executor;
mod hooks;
mod spec;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use condition::{Condition, BRANCH_NAME_VAR, CHANGE_ID_VAR};
pub use config::ExecutorConfig;
pub use executor::{run, Pipeline};
pub use hooks::{FnHook, Hook, HookRun, HookSelector, PostHooks};
pub use spec::StageSpec;
