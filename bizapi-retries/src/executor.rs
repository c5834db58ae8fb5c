//! Request executor: the per-call retry loop.
//!
//! Each attempt walks `Throttled → AuthAttach → Sent → Classify`, then either
//! returns or backs off and starts over. A 401 recovered by the auth
//! strategy goes straight back to `Sent` without spending a backoff slot.

use crate::auth::{AuthStrategy, NoAuth, ResourceLocator};
use crate::classify::{classify_response, classify_transport_error, decide, Outcome, Verdict};
use crate::config::RetryConfig;
use crate::events::{AttemptEvent, Observers, RateLimitEvent, RetryEvent, RetryReason};
use crate::throttle::{NoThrottle, Throttle};
use crate::transport::{Transport, TransportError};
use bizapi_core::{ApiError, ApiRequest, ApiResponse, ErrorDetails, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// State of a call's retry loop.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Current attempt number (1-indexed).
    pub attempt: u32,
    /// Reason the last attempt was retried.
    pub last_reason: Option<RetryReason>,
    /// Last computed backoff delay.
    pub last_delay: Duration,
    /// Total time spent waiting between attempts.
    pub total_wait_time: Duration,
    /// Number of 401s recovered by the auth strategy.
    pub auth_refreshes: u32,
    /// History of attempts.
    pub history: Vec<AttemptInfo>,
}

/// Information about a single attempt.
#[derive(Debug, Clone)]
pub struct AttemptInfo {
    /// Attempt number.
    pub attempt: u32,
    /// Response status, or 0.
    pub status: u16,
    /// Whether it succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Time spent in the transport.
    pub duration: Duration,
}

enum SendResult {
    Response(ApiResponse),
    Failed(TransportError),
    Cancelled,
}

/// Runs requests through throttle, auth, transport and classifier.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthStrategy>,
    throttle: Arc<dyn Throttle>,
    locator: ResourceLocator,
    config: RetryConfig,
    observers: Observers,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("auth", &self.auth)
            .field("throttle", &self.throttle)
            .field("locator", &self.locator)
            .field("config", &self.config)
            .field("observers", &self.observers)
            .finish()
    }
}

impl RequestExecutor {
    /// Create an executor with no auth, no throttle and default retries.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            auth: Arc::new(NoAuth),
            throttle: Arc::new(NoThrottle),
            locator: ResourceLocator::default(),
            config: RetryConfig::default(),
            observers: Observers::default(),
        }
    }

    /// Set the auth strategy.
    pub fn with_auth(mut self, auth: Arc<dyn AuthStrategy>) -> Self {
        self.auth = auth;
        self
    }

    /// Set the throttle. Share one `Arc` between executors to share its window.
    pub fn with_throttle(mut self, throttle: Arc<dyn Throttle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Set the retry configuration.
    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Set how resource identifiers are found.
    pub fn with_locator(mut self, locator: ResourceLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Add observers.
    pub fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = std::mem::take(&mut self.observers).merge(observers);
        self
    }

    /// Register an attempt observer.
    pub fn on_attempt(mut self, f: impl Fn(&AttemptEvent) + Send + Sync + 'static) -> Self {
        self.observers = self.observers.on_attempt(f);
        self
    }

    /// Register a retry observer.
    pub fn on_retry(mut self, f: impl Fn(&RetryEvent) + Send + Sync + 'static) -> Self {
        self.observers = self.observers.on_retry(f);
        self
    }

    /// Register a rate limit observer.
    pub fn on_rate_limit(mut self, f: impl Fn(&RateLimitEvent) + Send + Sync + 'static) -> Self {
        self.observers = self.observers.on_rate_limit(f);
        self
    }

    /// Get the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute a request with retries.
    pub async fn execute(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse> {
        self.execute_with_state(request, cancel).await.0
    }

    /// Execute with retries and get state information.
    pub async fn execute_with_state(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> (Result<ApiResponse>, RetryState) {
        let mut state = RetryState::default();
        let result = self.run(request, cancel, &mut state).await;
        (result, state)
    }

    async fn run(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
        state: &mut RetryState,
    ) -> Result<ApiResponse> {
        let max_attempts = self.config.max_attempts();
        let resource_id = self.locator.locate(&request);
        let resource_id = resource_id.as_deref();

        loop {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }

            self.throttle.acquire(cancel).await?;
            state.attempt += 1;

            debug!(
                method = %request.method,
                path = %request.path,
                attempt = state.attempt,
                max_attempts,
                "Executing request attempt"
            );

            let mut token = self.auth.token(resource_id).await?;

            let (verdict, response) = loop {
                if cancel.is_cancelled() {
                    return Err(ApiError::Cancelled);
                }

                let mut attempt_request = request.clone();
                if let Some(ref token) = token {
                    self.auth.apply(&mut attempt_request, token);
                }

                let started = Instant::now();
                let sent = self.send(attempt_request, cancel).await;
                let duration = started.elapsed();

                let (verdict, response) = match sent {
                    SendResult::Cancelled => return Err(ApiError::Cancelled),
                    // A transport error racing a cancellation is reported as the cancellation.
                    SendResult::Failed(_) if cancel.is_cancelled() => {
                        return Err(ApiError::Cancelled)
                    }
                    SendResult::Failed(err) => {
                        self.record_attempt(state, &request, 0, duration, Some(err.to_string()));
                        (classify_transport_error(&err), None)
                    }
                    SendResult::Response(resp) => {
                        let status = resp.status.as_u16();
                        let verdict = classify_response(&resp);
                        let error = match verdict {
                            Verdict::Success => None,
                            _ => Some(format!("HTTP {}", status)),
                        };
                        self.record_attempt(state, &request, status, duration, error);
                        (verdict, Some(resp))
                    }
                };

                if let Verdict::Unauthorized(ref details) = verdict {
                    if let Some(fresh) = self
                        .recover_auth(details, resource_id, state, max_attempts, &request)
                        .await
                    {
                        token = Some(fresh);
                        continue;
                    }
                }

                break (verdict, response);
            };

            if let Verdict::Transient(ref failure) = verdict {
                if failure.reason == RetryReason::RateLimit {
                    self.observers.rate_limit(&RateLimitEvent {
                        method: request.method.clone(),
                        path: request.path.clone(),
                        attempt: state.attempt,
                        retry_after: failure.retry_after,
                        ray_id: failure.ray_id.clone(),
                    });
                }
            }

            match decide(verdict, state.attempt, max_attempts, &self.config.backoff) {
                Outcome::Success => {
                    return response.ok_or_else(|| {
                        ApiError::Decode("Success verdict without a response".to_string())
                    });
                }
                Outcome::Fatal(err) => {
                    debug!(attempt = state.attempt, error = %err, "Request failed");
                    return Err(err);
                }
                Outcome::Exhausted(err) => {
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        attempt = state.attempt,
                        error = %err,
                        "Retry exhausted"
                    );
                    return Err(err);
                }
                Outcome::Retry { delay, failure } => {
                    state.last_reason = Some(failure.reason);
                    state.last_delay = delay;
                    state.total_wait_time = state.total_wait_time.saturating_add(delay);

                    self.observers.retry(&RetryEvent {
                        method: request.method.clone(),
                        path: request.path.clone(),
                        status: failure.status,
                        attempt: state.attempt,
                        reason: failure.reason,
                        wait: delay,
                    });

                    debug!(
                        attempt = state.attempt,
                        reason = %failure.reason,
                        wait_ms = delay.as_millis() as u64,
                        "Waiting before retry"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn send(&self, request: ApiRequest, cancel: &CancellationToken) -> SendResult {
        let timeout = self.config.request_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => SendResult::Cancelled,
            result = tokio::time::timeout(timeout, self.transport.send(request)) => match result {
                Ok(Ok(response)) => SendResult::Response(response),
                Ok(Err(err)) => SendResult::Failed(err),
                Err(_) => SendResult::Failed(TransportError::Timeout),
            },
        }
    }

    /// Ask the auth strategy for a replacement token after a 401.
    ///
    /// Recoveries are bounded by `max_retries` so a strategy that keeps
    /// minting rejected tokens cannot loop forever.
    async fn recover_auth(
        &self,
        details: &ErrorDetails,
        resource_id: Option<&str>,
        state: &mut RetryState,
        max_attempts: u32,
        request: &ApiRequest,
    ) -> Option<String> {
        if state.auth_refreshes >= self.config.max_retries {
            return None;
        }

        match self
            .auth
            .on_auth_error(details.status, resource_id, state.attempt, max_attempts)
            .await
        {
            Ok(Some(token)) => {
                state.auth_refreshes += 1;
                state.last_reason = Some(RetryReason::Unauthorized);
                self.observers.retry(&RetryEvent {
                    method: request.method.clone(),
                    path: request.path.clone(),
                    status: details.status,
                    attempt: state.attempt,
                    reason: RetryReason::Unauthorized,
                    wait: Duration::ZERO,
                });
                debug!(attempt = state.attempt, "Retrying with refreshed credentials");
                Some(token)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "Auth recovery failed");
                None
            }
        }
    }

    fn record_attempt(
        &self,
        state: &mut RetryState,
        request: &ApiRequest,
        status: u16,
        duration: Duration,
        error: Option<String>,
    ) {
        state.history.push(AttemptInfo {
            attempt: state.attempt,
            status,
            success: error.is_none(),
            error: error.clone(),
            duration,
        });

        self.observers.attempt(&AttemptEvent {
            method: request.method.clone(),
            path: request.path.clone(),
            status,
            duration,
            attempt: state.attempt,
            error,
            body: request.body.clone(),
        });
    }
}
