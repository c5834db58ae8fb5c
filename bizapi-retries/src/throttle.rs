//! Admission control.
//!
//! A [`Throttle`] is consulted before every attempt. The executor only knows
//! the trait, so alternate policies can be substituted without touching the
//! retry loop.

use async_trait::async_trait;
use bizapi_core::{ApiError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Width of the trailing window the remote API counts requests in.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Limit used when a non-positive limit is configured.
pub const DEFAULT_THROTTLE_LIMIT: usize = 50;

/// Admission gate in front of every attempt.
#[async_trait]
pub trait Throttle: Send + Sync + fmt::Debug {
    /// Wait for a slot.
    ///
    /// Returns [`ApiError::Cancelled`] if `cancel` fires first.
    async fn acquire(&self, cancel: &CancellationToken) -> Result<()>;
}

/// Throttle that always admits immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoThrottle;

impl NoThrottle {
    /// Create a new no-op throttle.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Throttle for NoThrottle {
    async fn acquire(&self, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }
}

/// Sliding-window throttle.
///
/// Admits at most `limit` acquisitions within any trailing `window`.
/// Admission timestamps are kept in a deque guarded by a single lock that is
/// never held across an await point.
pub struct SlidingWindowThrottle {
    limit: usize,
    window: Duration,
    admissions: Mutex<VecDeque<Instant>>,
}

impl fmt::Debug for SlidingWindowThrottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingWindowThrottle")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("admitted", &self.admissions.lock().len())
            .finish()
    }
}

impl SlidingWindowThrottle {
    /// Create a throttle over the default 10 second window.
    pub fn new(limit: i64) -> Self {
        Self::with_window(limit, DEFAULT_WINDOW)
    }

    /// Create a throttle with a custom window.
    ///
    /// Non-positive limits fall back to [`DEFAULT_THROTTLE_LIMIT`].
    pub fn with_window(limit: i64, window: Duration) -> Self {
        let limit = if limit <= 0 {
            DEFAULT_THROTTLE_LIMIT
        } else {
            usize::try_from(limit).unwrap_or(usize::MAX)
        };
        Self {
            limit,
            window,
            admissions: Mutex::new(VecDeque::with_capacity(limit.min(1024))),
        }
    }

    /// Effective admission limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Window width.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of admissions currently inside the window.
    pub fn admitted(&self) -> usize {
        let mut admissions = self.admissions.lock();
        prune(&mut admissions, Instant::now(), self.window);
        admissions.len()
    }

    /// Try to take a slot at `now`.
    ///
    /// Returns `None` when admitted, or how long until the oldest admission
    /// leaves the window.
    fn try_admit(&self, now: Instant) -> Option<Duration> {
        let mut admissions = self.admissions.lock();
        prune(&mut admissions, now, self.window);

        if admissions.len() < self.limit {
            admissions.push_back(now);
            return None;
        }

        let oldest = admissions.front().copied().unwrap_or(now);
        Some((oldest + self.window).saturating_duration_since(now))
    }
}

fn prune(admissions: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = admissions.front() {
        if now.saturating_duration_since(oldest) >= window {
            admissions.pop_front();
        } else {
            break;
        }
    }
}

#[async_trait]
impl Throttle for SlidingWindowThrottle {
    async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }

            let wait = match self.try_admit(Instant::now()) {
                None => {
                    trace!(limit = self.limit, "Throttle slot granted");
                    return Ok(());
                }
                Some(wait) => wait,
            };

            debug!(
                limit = self.limit,
                wait_ms = wait.as_millis() as u64,
                "Throttle window full, waiting"
            );

            // Another waiter may take the freed slot first, so re-check on wake.
            tokio::select! {
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                _ = sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_non_positive_limit_uses_default() {
        assert_eq!(SlidingWindowThrottle::new(0).limit(), DEFAULT_THROTTLE_LIMIT);
        assert_eq!(SlidingWindowThrottle::new(-5).limit(), DEFAULT_THROTTLE_LIMIT);
        assert_eq!(SlidingWindowThrottle::new(7).limit(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_limit_immediately() {
        let throttle = SlidingWindowThrottle::new(3);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..3 {
            throttle.acquire(&cancel).await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(throttle.admitted(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_until_oldest_leaves_window() {
        let throttle = SlidingWindowThrottle::new(2);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        throttle.acquire(&cancel).await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        throttle.acquire(&cancel).await.unwrap();

        throttle.acquire(&cancel).await.unwrap();

        // The first admission happened at t=0, so the third waits until t=10.
        assert!(start.elapsed() >= DEFAULT_WINDOW);
        assert!(start.elapsed() < DEFAULT_WINDOW + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_is_pruned() {
        let throttle = SlidingWindowThrottle::with_window(2, Duration::from_secs(1));
        let cancel = CancellationToken::new();

        throttle.acquire(&cancel).await.unwrap();
        throttle.acquire(&cancel).await.unwrap();
        assert_eq!(throttle.admitted(), 2);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(throttle.admitted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_wait() {
        let throttle = Arc::new(SlidingWindowThrottle::new(1));
        let cancel = CancellationToken::new();
        throttle.acquire(&cancel).await.unwrap();

        let waiter = {
            let throttle = throttle.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { throttle.acquire(&cancel).await })
        };

        tokio::time::advance(Duration::from_secs(1)).await;
        cancel.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ApiError::Cancelled)));
        assert_eq!(throttle.admitted(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_acquire() {
        let throttle = SlidingWindowThrottle::new(10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = throttle.acquire(&cancel).await;
        assert!(matches!(result, Err(ApiError::Cancelled)));
        assert_eq!(throttle.admitted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_never_exceed_limit() {
        let throttle = Arc::new(SlidingWindowThrottle::new(2));
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let throttle = throttle.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                throttle.acquire(&cancel).await.unwrap();
                Instant::now()
            }));
        }

        let mut admitted_at = Vec::new();
        for handle in handles {
            admitted_at.push(handle.await.unwrap());
        }
        admitted_at.sort();

        for window in admitted_at.windows(3) {
            assert!(window[2].duration_since(window[0]) >= DEFAULT_WINDOW);
        }
    }

    #[tokio::test]
    async fn test_no_throttle_grants() {
        let cancel = CancellationToken::new();
        for _ in 0..1000 {
            NoThrottle::new().acquire(&cancel).await.unwrap();
        }
    }
}
