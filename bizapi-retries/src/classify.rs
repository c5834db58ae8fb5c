//! Failure classification.
//!
//! Classification is split in two pure steps so the retry state machine can
//! be tested without a transport:
//!
//! 1. [`classify_response`] / [`classify_transport_error`] turn one attempt
//!    into a [`Verdict`].
//! 2. [`decide`] combines a verdict with the attempt budget into an
//!    [`Outcome`].

use crate::backoff::ExponentialBackoff;
use crate::events::RetryReason;
use crate::transport::TransportError;
use bizapi_core::{ApiError, ApiResponse, ErrorDetails};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// A failure worth another attempt.
#[derive(Debug, Clone)]
pub struct TransientFailure {
    /// Failure class.
    pub reason: RetryReason,
    /// Response status, or 0 for transport failures.
    pub status: u16,
    /// Server supplied `Retry-After`.
    pub retry_after: Option<Duration>,
    /// Diagnostic correlation id.
    pub ray_id: Option<String>,
    /// Parsed error body, for HTTP failures.
    pub details: Option<ErrorDetails>,
    /// Short description.
    pub message: String,
}

impl TransientFailure {
    /// Convert into the error reported once retries are exhausted.
    pub fn into_error(self, attempts: u32) -> ApiError {
        match self.reason {
            RetryReason::Network => ApiError::network(self.message, attempts),
            RetryReason::Timeout => ApiError::Timeout { attempts },
            RetryReason::RateLimit => {
                ApiError::rate_limited(self.retry_after, self.ray_id, attempts)
            }
            RetryReason::ServerError | RetryReason::Unauthorized => {
                let details = self
                    .details
                    .unwrap_or_else(|| ErrorDetails::new(self.status, self.message));
                ApiError::from_details(details)
            }
        }
    }
}

/// Classification of a single attempt.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// 2xx.
    Success,
    /// Retryable failure.
    Transient(TransientFailure),
    /// 401; the auth strategy may recover.
    Unauthorized(ErrorDetails),
    /// Non-retryable failure.
    Fatal(ApiError),
}

impl Verdict {
    /// Whether the verdict is terminal regardless of budget.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Fatal(_))
    }
}

/// What the executor does next.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Return the response.
    Success,
    /// Wait `delay`, then try again.
    Retry {
        /// Delay before the next attempt.
        delay: Duration,
        /// The failure being retried.
        failure: TransientFailure,
    },
    /// Retryable, but out of attempts.
    Exhausted(ApiError),
    /// Not retryable.
    Fatal(ApiError),
}

/// Classify an HTTP response.
pub fn classify_response(response: &ApiResponse) -> Verdict {
    let status = response.status.as_u16();
    if response.is_success() {
        return Verdict::Success;
    }

    let ray_id = response.ray_id();

    match status {
        429 => Verdict::Transient(TransientFailure {
            reason: RetryReason::RateLimit,
            status,
            retry_after: response
                .header("retry-after")
                .and_then(|v| parse_retry_after(v, Utc::now())),
            ray_id,
            details: None,
            message: "Too Many Requests".to_string(),
        }),
        401 => Verdict::Unauthorized(ErrorDetails::from_body(status, &response.body, ray_id)),
        500..=599 => {
            let details = ErrorDetails::from_body(status, &response.body, ray_id.clone());
            Verdict::Transient(TransientFailure {
                reason: RetryReason::ServerError,
                status,
                retry_after: None,
                ray_id,
                message: details.message.clone(),
                details: Some(details),
            })
        }
        _ => Verdict::Fatal(ApiError::from_details(ErrorDetails::from_body(
            status,
            &response.body,
            ray_id,
        ))),
    }
}

/// Classify a failure to get any response.
pub fn classify_transport_error(error: &TransportError) -> Verdict {
    let reason = match error {
        TransportError::Timeout => RetryReason::Timeout,
        TransportError::Connection(_) | TransportError::Other(_) => RetryReason::Network,
    };
    Verdict::Transient(TransientFailure {
        reason,
        status: 0,
        retry_after: None,
        ray_id: None,
        details: None,
        message: error.to_string(),
    })
}

/// Decide the next step for `attempt` (1-indexed) out of `max_attempts`.
pub fn decide(
    verdict: Verdict,
    attempt: u32,
    max_attempts: u32,
    backoff: &ExponentialBackoff,
) -> Outcome {
    match verdict {
        Verdict::Success => Outcome::Success,
        Verdict::Fatal(err) => Outcome::Fatal(err),
        Verdict::Unauthorized(details) => Outcome::Fatal(ApiError::Authentication(details)),
        Verdict::Transient(failure) => {
            if attempt >= max_attempts {
                return Outcome::Exhausted(failure.into_error(attempt));
            }
            let delay = failure
                .retry_after
                .unwrap_or_else(|| backoff.delay(attempt));
            Outcome::Retry { delay, failure }
        }
    }
}

/// Parse a `Retry-After` value: delta seconds or an HTTP date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(secs) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
