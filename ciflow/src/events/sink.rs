//! Pipeline events and the sinks that receive them.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::Level;

/// One lifecycle event reported by the executor.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineEvent {
    /// Name of the pipeline that produced the event.
    pub pipeline: String,
    /// Dotted event type, e.g. `stage.skipped`.
    pub event_type: String,
    /// Event payload.
    pub data: serde_json::Value,
    /// When the executor emitted the event.
    pub emitted_at: DateTime<Utc>,
}

impl PipelineEvent {
    /// Creates an event stamped with the current time.
    pub fn new(
        pipeline: impl Into<String>,
        event_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            pipeline: pipeline.into(),
            event_type: event_type.into(),
            data,
            emitted_at: Utc::now(),
        }
    }

    /// Returns true if the event type starts with `prefix`.
    pub fn is(&self, prefix: &str) -> bool {
        self.event_type.starts_with(prefix)
    }
}

/// Receives pipeline events.
///
/// Emission happens inline on the executor's task, so implementations must
/// return quickly and must not panic. The run result never depends on a sink.
pub trait EventSink: Send + Sync {
    /// Accepts one event.
    fn emit(&self, event: &PipelineEvent);
}

/// Discards every event. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

/// Writes events to `tracing`.
///
/// Failure events (`*.failed*`, `*.timed_out`) are raised to WARN regardless
/// of the configured level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level`.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a DEBUG sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn effective_level(&self, event: &PipelineEvent) -> Level {
        let failure =
            event.event_type.contains(".failed") || event.event_type.ends_with("timed_out");
        if failure && self.level > Level::WARN {
            Level::WARN
        } else {
            self.level
        }
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        let level = self.effective_level(event);
        macro_rules! log_at {
            ($macro:ident) => {
                tracing::$macro!(
                    pipeline = %event.pipeline,
                    event_type = %event.event_type,
                    data = %event.data,
                    "pipeline event"
                )
            };
        }
        match level {
            Level::ERROR => log_at!(error),
            Level::WARN => log_at!(warn),
            Level::INFO => log_at!(info),
            Level::DEBUG => log_at!(debug),
            Level::TRACE => log_at!(trace),
        }
    }
}

/// Keeps every event in memory. Used by tests to assert on the event stream.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every collected event.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    /// Returns the collected event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Returns events whose type starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<PipelineEvent> {
        self.events.lock().iter().filter(|e| e.is(prefix)).cloned().collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drops every collected event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events.lock().push(event.clone());
    }
}
