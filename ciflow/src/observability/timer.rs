//! Wall-clock timing for stages and hooks.

use std::time::Instant;

/// Simple stage timing helper.
#[derive(Debug)]
pub struct StageTimer {
    start: Instant,
    name: String,
}

impl StageTimer {
    /// Starts a new timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the name being timed.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the timer and returns the duration in milliseconds.
    #[must_use]
    pub fn finish(self) -> f64 {
        let elapsed = self.elapsed_ms();
        tracing::trace!(name = %self.name, duration_ms = elapsed, "Timer finished");
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timer_measures_elapsed() {
        let timer = StageTimer::start("build");
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(timer.name(), "build");
        assert!(timer.elapsed_ms() >= 5.0);
        assert!(timer.finish() >= 5.0);
    }
}
