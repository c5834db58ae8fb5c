//! Client configuration.

use bizapi_core::{ApiError, Result};
use bizapi_retries::{NoThrottle, RetryConfig, SlidingWindowThrottle, Throttle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for [`ApiClient`](crate::ApiClient).
///
/// Durations are written as seconds (floats allowed) when deserialized:
///
/// ```json
/// {
///   "baseUrl": "https://api.example.com",
///   "maxRetries": 5,
///   "initialDelay": 0.5,
///   "throttleLimit": 40
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Base URL every request path is joined to.
    pub base_url: String,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff delay before the first retry.
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    /// Cap on any computed backoff delay.
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// Growth factor between consecutive backoff delays.
    pub backoff_multiplier: f64,
    /// Relative jitter applied to backoff delays.
    pub jitter: f64,
    /// Time limit for one attempt.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Requests admitted per 10 second window. `None` disables throttling.
    pub throttle_limit: Option<i64>,
    /// User agent sent with every request.
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            base_url: String::new(),
            max_retries: retry.max_retries,
            initial_delay: retry.backoff.initial_delay,
            max_delay: retry.backoff.max_delay,
            backoff_multiplier: retry.backoff.multiplier,
            jitter: retry.backoff.jitter,
            request_timeout: retry.request_timeout,
            throttle_limit: None,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    /// Environment variable for the base URL.
    pub const ENV_BASE_URL: &'static str = "BIZAPI_BASE_URL";
    /// Environment variable for the retry count.
    pub const ENV_MAX_RETRIES: &'static str = "BIZAPI_MAX_RETRIES";
    /// Environment variable for the initial backoff delay in seconds.
    pub const ENV_INITIAL_DELAY: &'static str = "BIZAPI_INITIAL_DELAY_SECS";
    /// Environment variable for the maximum backoff delay in seconds.
    pub const ENV_MAX_DELAY: &'static str = "BIZAPI_MAX_DELAY_SECS";
    /// Environment variable for the backoff multiplier.
    pub const ENV_BACKOFF_MULTIPLIER: &'static str = "BIZAPI_BACKOFF_MULTIPLIER";
    /// Environment variable for the per-attempt timeout in seconds.
    pub const ENV_REQUEST_TIMEOUT: &'static str = "BIZAPI_REQUEST_TIMEOUT_SECS";
    /// Environment variable for the throttle limit.
    pub const ENV_THROTTLE_LIMIT: &'static str = "BIZAPI_THROTTLE_LIMIT";

    /// Create a config with defaults and the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Read the config from `BIZAPI_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup, using the `BIZAPI_*` names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup(Self::ENV_BASE_URL) {
            config.base_url = url;
        }
        if let Some(value) = lookup(Self::ENV_MAX_RETRIES) {
            config.max_retries = parse(Self::ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = lookup(Self::ENV_INITIAL_DELAY) {
            config.initial_delay = parse_secs(Self::ENV_INITIAL_DELAY, &value)?;
        }
        if let Some(value) = lookup(Self::ENV_MAX_DELAY) {
            config.max_delay = parse_secs(Self::ENV_MAX_DELAY, &value)?;
        }
        if let Some(value) = lookup(Self::ENV_BACKOFF_MULTIPLIER) {
            config.backoff_multiplier = parse(Self::ENV_BACKOFF_MULTIPLIER, &value)?;
        }
        if let Some(value) = lookup(Self::ENV_REQUEST_TIMEOUT) {
            config.request_timeout = parse_secs(Self::ENV_REQUEST_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(Self::ENV_THROTTLE_LIMIT) {
            config.throttle_limit = Some(parse(Self::ENV_THROTTLE_LIMIT, &value)?);
        }

        Ok(config)
    }

    /// Set the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the retry count.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the initial backoff delay.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum backoff delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the backoff jitter.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the per-attempt timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enable throttling at `limit` requests per 10 seconds.
    pub fn throttle_limit(mut self, limit: i64) -> Self {
        self.throttle_limit = Some(limit);
        self
    }

    /// Set the user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Check the config for values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(ApiError::configuration("base URL is required"));
        }
        url::Url::parse(&self.base_url).map_err(|e| {
            ApiError::configuration(format!("invalid base URL '{}': {}", self.base_url, e))
        })?;
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ApiError::configuration(format!(
                "backoff multiplier must be at least 1, got {}",
                self.backoff_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ApiError::configuration(format!(
                "jitter must be within 0..=1, got {}",
                self.jitter
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(ApiError::configuration(
                "initial delay must not exceed max delay",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ApiError::configuration("request timeout must be positive"));
        }
        Ok(())
    }

    /// The retry subset of this config.
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_retries(self.max_retries)
            .initial_delay(self.initial_delay)
            .max_delay(self.max_delay)
            .multiplier(self.backoff_multiplier)
            .jitter(self.jitter)
            .request_timeout(self.request_timeout)
    }

    /// The throttle this config asks for.
    pub fn build_throttle(&self) -> Arc<dyn Throttle> {
        match self.throttle_limit {
            Some(limit) => Arc::new(SlidingWindowThrottle::new(limit)),
            None => Arc::new(NoThrottle),
        }
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ApiError::configuration(format!("{}={:?}: {}", key, value, e)))
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    let secs: f64 = parse(key, value)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ApiError::configuration(format!("{}={:?}: {}", key, value, e)))
}

mod duration_secs {
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizapi_retries::DEFAULT_THROTTLE_LIMIT;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.throttle_limit, None);
    }

    #[test]
    fn test_deserialize_camel_case_seconds() {
        let config: ClientConfig = serde_json::from_str(concat!(
            r#"{"baseUrl":"https://api.example.com","maxRetries":5,"#,
            r#""initialDelay":0.25,"throttleLimit":40}"#
        ))
        .unwrap();

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.throttle_limit, Some(40));
    }

    #[test]
    fn test_deserialize_rejects_negative_duration() {
        let result: std::result::Result<ClientConfig, _> =
            serde_json::from_str(r#"{"requestTimeout":-1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("BIZAPI_BASE_URL", "https://api.example.com"),
            ("BIZAPI_MAX_RETRIES", "7"),
            ("BIZAPI_INITIAL_DELAY_SECS", "0.5"),
            ("BIZAPI_THROTTLE_LIMIT", "25"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.throttle_limit, Some(25));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = ClientConfig::from_lookup(lookup(&[("BIZAPI_MAX_RETRIES", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
        assert!(err.to_string().contains("BIZAPI_MAX_RETRIES"));
    }

    #[test]
    fn test_validate_accepts_defaults_with_url() {
        assert!(ClientConfig::new("https://api.example.com").validate().is_ok());
    }

    #[rstest]
    #[case::missing_url(ClientConfig::default())]
    #[case::bad_url(ClientConfig::new("not a url"))]
    #[case::shrinking_backoff(ClientConfig::new("https://api.example.com").backoff_multiplier(0.5))]
    #[case::jitter_too_large(ClientConfig::new("https://api.example.com").jitter(1.5))]
    #[case::initial_above_max(
        ClientConfig::new("https://api.example.com").initial_delay(Duration::from_secs(60))
    )]
    #[case::zero_timeout(
        ClientConfig::new("https://api.example.com").request_timeout(Duration::ZERO)
    )]
    fn test_validate_rejects(#[case] config: ClientConfig) {
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
    }

    #[test]
    fn test_to_retry_config() {
        let retry = ClientConfig::new("https://api.example.com")
            .max_retries(1)
            .initial_delay(Duration::from_millis(100))
            .to_retry_config();

        assert_eq!(retry.max_retries, 1);
        assert_eq!(retry.backoff.initial_delay, Duration::from_millis(100));
        assert_eq!(retry.backoff.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_throttle_limit_coercion() {
        let config = ClientConfig::new("https://api.example.com").throttle_limit(-3);
        let throttle = SlidingWindowThrottle::new(config.throttle_limit.unwrap());
        assert_eq!(throttle.limit(), DEFAULT_THROTTLE_LIMIT);
    }
}
