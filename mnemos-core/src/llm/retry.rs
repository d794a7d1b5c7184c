//! Retry logic for collaborator calls
//!
//! Implements exponential backoff with jitter and an optional per-attempt timeout.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: usize,
    /// Initial delay before first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add jitter to prevent thundering herd
    pub add_jitter: bool,
    /// Abandon an attempt that runs longer than this
    #[serde(default, with = "humantime_serde")]
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
            attempt_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryConfig {
    /// Create a config with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Builder: set max attempts
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Builder: set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Builder: set max delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Builder: set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Builder: enable/disable jitter
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Builder: set or clear the per-attempt timeout
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Backoff before retry number `retry` (0 is the first retry).
    ///
    /// Grows by `backoff_multiplier` per retry, clamped to `max_delay`, then
    /// stretched by up to 25% when jitter is on.
    pub fn delay_for_attempt(&self, retry: usize) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let grown = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let clamped = grown.min(self.max_delay.as_secs_f64());

        let stretched = if self.add_jitter {
            clamped * (1.0 + 0.25 * unit_jitter())
        } else {
            clamped
        };

        Duration::try_from_secs_f64(stretched)
            .map(|d| Duration::from_millis(d.as_millis() as u64))
            .unwrap_or(self.max_delay)
    }
}

/// Uniform value in `[0, 1)` drawn from a v4 UUID's random bits.
fn unit_jitter() -> f64 {
    let bits = uuid::Uuid::new_v4().as_u128() as u64 >> 11;
    bits as f64 / (1u64 << 53) as f64
}

/// Why [`with_retry`] gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The operation failed on its final attempt
    Failed(E),
    /// The final attempt exceeded `attempt_timeout`
    TimedOut(Duration),
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{}", e),
            Self::TimedOut(d) => write!(f, "timed out after {}ms", d.as_millis()),
        }
    }
}

/// Run `operation` until it succeeds or `config.max_attempts` is spent.
///
/// Each attempt is bounded by `attempt_timeout` when set. The last failure is
/// returned.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, RetryError<E>>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = match config.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result.map_err(RetryError::Failed),
                Err(_) => Err(RetryError::TimedOut(limit)),
            },
            None => operation().await.map_err(RetryError::Failed),
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => return Err(err),
            Err(err) => err,
        };

        let delay = config.delay_for_attempt(attempt - 1);
        tracing::debug!(
            "Attempt {}/{} failed, retrying in {}ms: {}",
            attempt,
            attempts,
            delay.as_millis(),
            err
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert!(config.add_jitter);
    }

    #[test]
    fn test_retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig::default().with_jitter(false);

        // Exponential backoff: 500ms, 1000ms, 2000ms
        assert_eq!(config.delay_for_attempt(0).as_millis(), 500);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 1000);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 2000);
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::default()
            .with_jitter(false)
            .with_max_delay(Duration::from_secs(1));

        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let config = RetryConfig::default().with_initial_delay(Duration::from_millis(400));

        for _ in 0..50 {
            let delay = config.delay_for_attempt(0).as_millis();
            assert!((400..=500).contains(&delay), "delay {}ms out of range", delay);
        }
    }

    #[test]
    fn test_config_deserializes_humantime() {
        let config: RetryConfig = serde_json::from_value(serde_json::json!({
            "max_attempts": 4,
            "initial_delay": "250ms",
            "max_delay": "10s",
            "backoff_multiplier": 1.5,
            "add_jitter": false,
            "attempt_timeout": "2s"
        }))
        .unwrap();

        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.attempt_timeout, Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_with_retry_eventual_success() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let attempts = AtomicUsize::new(0);
        let config = RetryConfig::default()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(10));

        let result = with_retry(&config, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err("transient error")
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausted() {
        let config = RetryConfig::default()
            .with_max_attempts(2)
            .with_initial_delay(Duration::from_millis(10));

        let result: Result<(), _> = with_retry(&config, || async { Err("persistent error") }).await;

        assert_eq!(result, Err(RetryError::Failed("persistent error")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_times_out() {
        let config = RetryConfig::no_retry().with_attempt_timeout(Some(Duration::from_millis(50)));

        let result: Result<(), RetryError<&str>> = with_retry(&config, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(RetryError::TimedOut(Duration::from_millis(50))));
    }
}
