//! Bounded retries inside stage actions.
//!
//! The executor never retries a stage. Actions that wait on something
//! outside their control, like a container daemon coming up, poll with
//! these helpers and fail once the attempts run out.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// A fixed number of attempts at a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: usize,
    /// Pause between attempts.
    pub interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(5, Duration::from_secs(2))
    }
}

impl RetryConfig {
    /// Creates a config polling `max_attempts` times, `interval` apart.
    #[must_use]
    pub const fn fixed(max_attempts: usize, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }
}

/// Runs `operation` until it succeeds or the attempts run out.
///
/// # Errors
///
/// Returns the last error once `config.max_attempts` attempts have failed.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    what: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= config.attempts() => {
                warn!(what, attempts = attempt, error = %e, "Giving up after retries");
                return Err(e);
            }
            Err(e) => {
                debug!(what, attempt, error = %e, "Not ready, retrying");
                tokio::time::sleep(config.interval).await;
            }
        }
    }
}

/// Polls `probe` at a fixed interval until it succeeds.
///
/// # Errors
///
/// Returns an error naming `what` once `attempts` probes have failed.
pub async fn wait_until_ready<F, Fut>(
    what: &str,
    attempts: usize,
    interval: Duration,
    probe: F,
) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let config = RetryConfig::fixed(attempts, interval);
    with_retry(&config, what, probe)
        .await
        .map_err(|e| e.context(format!("{what} not ready after {} attempts", config.attempts())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_with_retry_success_after_failures() {
        let config = RetryConfig::fixed(5, Duration::from_millis(1));
        let mut calls = 0;

        let result: Result<i32, String> = with_retry(&config, "flaky", || {
            calls += 1;
            let current = calls;
            async move {
                if current < 3 {
                    Err(format!("attempt {current}"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_with_retry_makes_exactly_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));

        for (max_attempts, expected) in [(3, 3), (0, 1)] {
            calls.store(0, Ordering::SeqCst);
            let config = RetryConfig::fixed(max_attempts, Duration::from_millis(1));
            let result: Result<(), String> = with_retry(&config, "broken", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("always fails".to_string())
                }
            })
            .await;

            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), expected);
        }
    }

    #[tokio::test]
    async fn test_attempts_are_spaced_by_interval() {
        let start = std::time::Instant::now();
        let config = RetryConfig::fixed(3, Duration::from_millis(10));

        let _: Result<(), &str> = with_retry(&config, "daemon", || async { Err("down") }).await;

        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_wait_until_ready() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe_calls = Arc::clone(&calls);

        wait_until_ready("daemon", 5, Duration::from_millis(1), move || {
            let n = probe_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                anyhow::ensure!(n >= 2, "not yet");
                Ok(())
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let err = wait_until_ready("daemon", 2, Duration::from_millis(1), || async {
            Err::<(), _>(anyhow::anyhow!("connection refused"))
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("daemon not ready after 2 attempts"));
        assert!(format!("{err:#}").contains("connection refused"));
    }
}
