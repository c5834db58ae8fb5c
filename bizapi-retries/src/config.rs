//! Retry configuration.

use crate::backoff::ExponentialBackoff;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay policy between attempts.
    pub backoff: ExponentialBackoff,
    /// Time limit for a single attempt.
    pub request_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max retries.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the initial backoff delay.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.backoff.initial_delay = delay;
        self
    }

    /// Set the backoff cap.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.backoff.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.backoff.multiplier = multiplier;
        self
    }

    /// Set the jitter factor.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.backoff.jitter = jitter;
        self
    }

    /// Set the per-attempt timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Use a fixed delay between attempts.
    pub fn fixed(mut self, delay: Duration) -> Self {
        self.backoff = ExponentialBackoff {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: 0.0,
        };
        self
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Create config that never retries.
    pub fn no_retry() -> Self {
        Self::new().max_retries(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_attempts(), 4);
        assert_eq!(config.backoff.initial_delay, Duration::from_secs(1));
        assert_eq!(config.backoff.max_delay, Duration::from_secs(30));
        assert_eq!(config.backoff.multiplier, 2.0);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_builder() {
        let config = RetryConfig::new()
            .max_retries(5)
            .initial_delay(Duration::from_millis(50))
            .max_delay(Duration::from_secs(2))
            .multiplier(3.0)
            .request_timeout(Duration::from_secs(5));

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.backoff.initial_delay, Duration::from_millis(50));
        assert_eq!(config.backoff.max_delay, Duration::from_secs(2));
        assert_eq!(config.backoff.multiplier, 3.0);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_fixed_delay() {
        let config = RetryConfig::new().fixed(Duration::from_millis(10));
        assert_eq!(config.backoff.delay(1), Duration::from_millis(10));
        assert_eq!(config.backoff.delay(4), Duration::from_millis(10));
    }

    #[test]
    fn test_no_retry() {
        assert_eq!(RetryConfig::no_retry().max_attempts(), 1);
        assert_eq!(RetryConfig::new().max_retries(u32::MAX).max_attempts(), u32::MAX);
    }
}
