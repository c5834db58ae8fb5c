//! Exponential backoff with jitter.

use std::time::Duration;

/// Default jitter factor: delays vary by up to ±10%.
pub const DEFAULT_JITTER: f64 = 0.1;

/// Exponential backoff with symmetric jitter.
///
/// The delay before retrying after attempt `n` is
/// `initial_delay * multiplier^(n-1)`, capped at `max_delay`, then scaled by
/// a uniform random factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    /// Initial delay.
    pub initial_delay: Duration,
    /// Maximum delay before jitter.
    pub max_delay: Duration,
    /// Multiplier for each attempt.
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl ExponentialBackoff {
    /// Create a new exponential backoff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    /// Delay before jitter for an attempt (1-indexed).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = if base.is_finite() {
            base.min(self.max_delay.as_secs_f64())
        } else {
            self.max_delay.as_secs_f64()
        };
        Duration::try_from_secs_f64(capped.max(0.0)).unwrap_or(self.max_delay)
    }

    /// Jittered delay for an attempt (1-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = 1.0 + jitter * rand_jitter();
        Duration::try_from_secs_f64((base * factor).max(0.0)).unwrap_or(self.max_delay)
    }
}

/// Builder for ExponentialBackoff.
#[derive(Debug, Default)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
}

impl ExponentialBackoffBuilder {
    /// Set initial delay.
    #[must_use]
    pub fn initial_delay(mut self, d: Duration) -> Self {
        self.initial_delay = Some(d);
        self
    }

    /// Set max delay.
    #[must_use]
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_delay = Some(d);
        self
    }

    /// Set multiplier.
    #[must_use]
    pub fn multiplier(mut self, m: f64) -> Self {
        self.multiplier = Some(m);
        self
    }

    /// Set jitter factor.
    #[must_use]
    pub fn jitter(mut self, j: f64) -> Self {
        self.jitter = Some(j);
        self
    }

    /// Build the backoff strategy.
    #[must_use]
    pub fn build(self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff::default();
        if let Some(v) = self.initial_delay {
            backoff.initial_delay = v;
        }
        if let Some(v) = self.max_delay {
            backoff.max_delay = v;
        }
        if let Some(v) = self.multiplier {
            backoff.multiplier = v;
        }
        if let Some(v) = self.jitter {
            backoff.jitter = v;
        }
        backoff
    }
}

/// Generate a random jitter factor between -1.0 and 1.0.
fn rand_jitter() -> f64 {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    rng.gen_range(-1.0..=1.0)
}
