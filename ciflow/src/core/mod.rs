//! Core domain model types for ciflow.
//!
//! This module contains the fundamental types used throughout the executor:
//! - Stage status, run outcome and failure policy enums
//! - Per-stage execution records

mod record;
mod status;

pub use record::StageRecord;
pub use status::{FailurePolicy, Outcome, StageStatus};
