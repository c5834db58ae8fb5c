//! Observability events emitted by the executor.
//!
//! Observers are side-effect only. Their return values are ignored and they
//! cannot change the outcome of a call.

use bizapi_core::{Bytes, Method};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why an attempt is being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryReason {
    /// The transport failed before a response arrived.
    Network,
    /// The attempt exceeded the request timeout.
    Timeout,
    /// HTTP 429.
    RateLimit,
    /// HTTP 5xx.
    ServerError,
    /// HTTP 401 recovered by the auth strategy.
    Unauthorized,
}

impl RetryReason {
    /// Stable short label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimit => "429",
            Self::ServerError => "5xx",
            Self::Unauthorized => "401",
        }
    }
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted after every attempt, successful or not.
#[derive(Debug, Clone)]
pub struct AttemptEvent {
    /// HTTP method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Response status, or 0 if no response arrived.
    pub status: u16,
    /// Time spent in the transport.
    pub duration: Duration,
    /// Attempt number (1-indexed).
    pub attempt: u32,
    /// Error description for failed attempts.
    pub error: Option<String>,
    /// Request body as sent.
    pub body: Option<Bytes>,
}

/// Emitted when the executor decides to try again.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    /// HTTP method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Status of the failed attempt, or 0.
    pub status: u16,
    /// The attempt that failed.
    pub attempt: u32,
    /// Why it is retried.
    pub reason: RetryReason,
    /// Delay before the next attempt.
    pub wait: Duration,
}

/// Emitted for every 429 response.
#[derive(Debug, Clone)]
pub struct RateLimitEvent {
    /// HTTP method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// The rate limited attempt.
    pub attempt: u32,
    /// Server supplied `Retry-After`.
    pub retry_after: Option<Duration>,
    /// Diagnostic correlation id.
    pub ray_id: Option<String>,
}

/// Callback for attempt events.
pub type AttemptObserver = Arc<dyn Fn(&AttemptEvent) + Send + Sync>;
/// Callback for retry events.
pub type RetryObserver = Arc<dyn Fn(&RetryEvent) + Send + Sync>;
/// Callback for rate limit events.
pub type RateLimitObserver = Arc<dyn Fn(&RateLimitEvent) + Send + Sync>;

/// Registered observers.
#[derive(Clone, Default)]
pub struct Observers {
    attempt: Vec<AttemptObserver>,
    retry: Vec<RetryObserver>,
    rate_limit: Vec<RateLimitObserver>,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("attempt", &self.attempt.len())
            .field("retry", &self.retry.len())
            .field("rate_limit", &self.rate_limit.len())
            .finish()
    }
}

impl Observers {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an attempt observer.
    pub fn on_attempt(mut self, f: impl Fn(&AttemptEvent) + Send + Sync + 'static) -> Self {
        self.attempt.push(Arc::new(f));
        self
    }

    /// Register a retry observer.
    pub fn on_retry(mut self, f: impl Fn(&RetryEvent) + Send + Sync + 'static) -> Self {
        self.retry.push(Arc::new(f));
        self
    }

    /// Register a rate limit observer.
    pub fn on_rate_limit(mut self, f: impl Fn(&RateLimitEvent) + Send + Sync + 'static) -> Self {
        self.rate_limit.push(Arc::new(f));
        self
    }

    /// Merge another set into this one.
    pub fn merge(mut self, other: Observers) -> Self {
        self.attempt.extend(other.attempt);
        self.retry.extend(other.retry);
        self.rate_limit.extend(other.rate_limit);
        self
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.attempt.is_empty() && self.retry.is_empty() && self.rate_limit.is_empty()
    }

    /// Number of attempt observers.
    pub fn attempt_count(&self) -> usize {
        self.attempt.len()
    }

    /// Number of retry observers.
    pub fn retry_count(&self) -> usize {
        self.retry.len()
    }

    /// Number of rate limit observers.
    pub fn rate_limit_count(&self) -> usize {
        self.rate_limit.len()
    }

    pub(crate) fn attempt(&self, event: &AttemptEvent) {
        for observer in &self.attempt {
            observer(event);
        }
    }

    pub(crate) fn retry(&self, event: &RetryEvent) {
        for observer in &self.retry {
            observer(event);
        }
    }

    pub(crate) fn rate_limit(&self, event: &RateLimitEvent) {
        for observer in &self.rate_limit {
            observer(event);
        }
    }
}
