//! Observability utilities.
//!
//! Logging goes through `tracing`; [`init_logging`] installs a
//! `tracing-subscriber` formatter for binaries and tests that want output.

mod logging;
mod timer;

pub use logging::{init_logging, LoggingConfig};
pub use timer::StageTimer;
