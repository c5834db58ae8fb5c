//! Observers that forward executor events to `tracing`.

use bizapi_retries::Observers;
use tracing::{debug, info, warn};

/// Observers that log every attempt, retry and rate limit.
///
/// Attempts log at `debug`, retries at `info` and rate limits at `warn`.
/// No subscriber is installed; events go wherever the application routes
/// `tracing` output.
pub fn tracing_observers() -> Observers {
    Observers::new()
        .on_attempt(|e| {
            debug!(
                method = %e.method,
                path = %e.path,
                status = e.status,
                attempt = e.attempt,
                duration_ms = e.duration.as_millis() as u64,
                error = e.error.as_deref(),
                "API attempt finished"
            );
        })
        .on_retry(|e| {
            info!(
                method = %e.method,
                path = %e.path,
                status = e.status,
                attempt = e.attempt,
                reason = %e.reason,
                wait_ms = e.wait.as_millis() as u64,
                "Retrying API call"
            );
        })
        .on_rate_limit(|e| {
            warn!(
                method = %e.method,
                path = %e.path,
                attempt = e.attempt,
                retry_after_ms = e.retry_after.map(|d| d.as_millis() as u64),
                ray_id = e.ray_id.as_deref(),
                "Rate limited by API"
            );
        })
}
