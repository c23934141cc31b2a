//! Event sink system for observability.
//!
//! The executor reports lifecycle events (`pipeline.started`,
//! `stage.skipped`, `stage.failed_nonfatal`, `hook.invoked`, ...) to an
//! [`EventSink`]. Events carry no semantic weight; the returned
//! [`RunContext`](crate::context::RunContext) is the result of a run.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
