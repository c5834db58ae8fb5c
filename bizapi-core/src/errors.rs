//! Error types for bizapi.
//!
//! Every failure that reaches a caller is an [`ApiError`]. Retryable
//! conditions (network failures, timeouts, rate limits and server errors)
//! only surface once the retry budget is spent; everything else surfaces on
//! the first attempt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The main error type for bizapi operations.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    #[error("Network error after {attempts} attempt(s): {message}")]
    Network {
        /// Transport error message of the last attempt.
        message: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Every attempt exceeded the per-request timeout.
    #[error("Request timed out after {attempts} attempt(s)")]
    Timeout {
        /// Number of attempts made.
        attempts: u32,
    },

    /// The server kept answering 429.
    #[error("Rate limited after {attempts} attempt(s){}", fmt_ray_id(.ray_id))]
    RateLimit {
        /// Last `Retry-After` value sent by the server.
        retry_after: Option<Duration>,
        /// Diagnostic correlation id.
        ray_id: Option<String>,
        /// Number of attempts made.
        attempts: u32,
    },

    /// 401 that the auth strategy could not recover from.
    #[error("Authentication failed: {0}")]
    Authentication(ErrorDetails),

    /// 403.
    #[error("Not authorized: {0}")]
    Authorization(ErrorDetails),

    /// 404.
    #[error("Not found: {0}")]
    NotFound(ErrorDetails),

    /// 400 or 422, usually with field-level errors.
    #[error("Validation failed: {0}")]
    Validation(ErrorDetails),

    /// 5xx after the retry budget was exhausted.
    #[error("Server error: {0}")]
    Server(ErrorDetails),

    /// Any other non-success status.
    #[error("HTTP error: {0}")]
    Status(ErrorDetails),

    /// The caller's cancel signal fired.
    #[error("Request cancelled")]
    Cancelled,

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A response body could not be decoded, or a request body encoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The server broke the pagination protocol.
    #[error("Pagination error: {0}")]
    Pagination(String),
}

fn fmt_ray_id(ray_id: &Option<String>) -> String {
    match ray_id {
        Some(id) => format!(" (ray id: {})", id),
        None => String::new(),
    }
}

/// Result type alias using ApiError.
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Map a non-success response into the matching typed error.
    ///
    /// 429 is not handled here since rate limits carry retry metadata.
    pub fn from_details(details: ErrorDetails) -> Self {
        match details.status {
            401 => Self::Authentication(details),
            403 => Self::Authorization(details),
            404 => Self::NotFound(details),
            400 | 422 => Self::Validation(details),
            500..=599 => Self::Server(details),
            _ => Self::Status(details),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>, attempts: u32) -> Self {
        Self::Network {
            message: message.into(),
            attempts,
        }
    }

    /// Create a rate limit error.
    pub fn rate_limited(
        retry_after: Option<Duration>,
        ray_id: Option<String>,
        attempts: u32,
    ) -> Self {
        Self::RateLimit {
            retry_after,
            ray_id,
            attempts,
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a pagination protocol error.
    pub fn pagination(message: impl Into<String>) -> Self {
        Self::Pagination(message.into())
    }

    /// Get the structured details, if the error came from a response.
    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            Self::Authentication(d)
            | Self::Authorization(d)
            | Self::NotFound(d)
            | Self::Validation(d)
            | Self::Server(d)
            | Self::Status(d) => Some(d),
            _ => None,
        }
    }

    /// Get the HTTP status if the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimit { .. } => Some(429),
            other => other.details().map(|d| d.status),
        }
    }

    /// Get the server-supplied diagnostic id.
    pub fn ray_id(&self) -> Option<&str> {
        match self {
            Self::RateLimit { ray_id, .. } => ray_id.as_deref(),
            other => other.details().and_then(|d| d.ray_id.as_deref()),
        }
    }

    /// Get the suggested retry-after duration.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Get field-level validation errors.
    pub fn field_errors(&self) -> &[FieldError] {
        self.details()
            .map(|d| d.field_errors.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the failure class is transient.
    ///
    /// Errors returned by the executor have already exhausted their retries;
    /// this reports the class, not whether another call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::RateLimit { .. } | Self::Server(_)
        )
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Structured information about a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// HTTP status code.
    pub status: u16,
    /// Human readable message.
    pub message: String,
    /// Server error code, if any.
    pub code: Option<String>,
    /// Field-level sub-errors.
    pub field_errors: Vec<FieldError>,
    /// Diagnostic correlation id.
    pub ray_id: Option<String>,
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)?;
        if let Some(ref code) = self.code {
            write!(f, " [{}]", code)?;
        }
        if !self.field_errors.is_empty() {
            write!(f, " ({} field error(s))", self.field_errors.len())?;
        }
        if let Some(ref ray_id) = self.ray_id {
            write!(f, " (ray id: {})", ray_id)?;
        }
        Ok(())
    }
}

impl ErrorDetails {
    /// Create details with just a status and message.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
            field_errors: Vec::new(),
            ray_id: None,
        }
    }

    /// Set the ray id.
    pub fn with_ray_id(mut self, ray_id: impl Into<String>) -> Self {
        self.ray_id = Some(ray_id.into());
        self
    }

    /// Add a field error.
    pub fn with_field_error(mut self, error: FieldError) -> Self {
        self.field_errors.push(error);
        self
    }

    /// Parse an error response body.
    ///
    /// Understands `{"message", "code", "errors"}` objects, optionally
    /// wrapped in `{"error": ...}`. Anything else becomes the message
    /// verbatim, truncated.
    pub fn from_body(status: u16, body: &[u8], ray_id: Option<String>) -> Self {
        let parsed = serde_json::from_slice::<ErrorEnvelope>(body)
            .ok()
            .map(ErrorEnvelope::into_body);

        let mut details = match parsed {
            Some(body) => Self {
                status,
                message: body
                    .message
                    .unwrap_or_else(|| default_message(status)),
                code: body.code.map(code_to_string),
                field_errors: body.errors,
                ray_id: None,
            },
            None => {
                let text = String::from_utf8_lossy(body);
                let text = text.trim();
                let message = if text.is_empty() {
                    default_message(status)
                } else {
                    truncate(text, MAX_MESSAGE_LEN)
                };
                Self::new(status, message)
            }
        };
        details.ray_id = ray_id;
        details
    }
}

/// A field-level validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field path, as reported by the server.
    #[serde(default, alias = "property", alias = "path")]
    pub field: Option<String>,
    /// Error message.
    #[serde(default, alias = "detail")]
    pub message: String,
    /// Error code.
    #[serde(default, deserialize_with = "deserialize_code")]
    pub code: Option<String>,
}

impl FieldError {
    /// Create a new field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
            code: None,
        }
    }
}

const MAX_MESSAGE_LEN: usize = 512;

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorEnvelope {
    Wrapped { error: ErrorBody },
    Flat(ErrorBody),
}

impl ErrorEnvelope {
    fn into_body(self) -> ErrorBody {
        match self {
            Self::Wrapped { error } => error,
            Self::Flat(body) => body,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "detail", alias = "title")]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default, alias = "fieldErrors", alias = "field_errors")]
    errors: Vec<FieldError>,
}

fn code_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

fn deserialize_code<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.map(code_to_string))
}

fn default_message(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown error")
        .to_string()
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(401, "Authentication")]
    #[case(403, "Authorization")]
    #[case(404, "NotFound")]
    #[case(400, "Validation")]
    #[case(422, "Validation")]
    #[case(500, "Server")]
    #[case(503, "Server")]
    #[case(409, "Status")]
    fn test_from_details_mapping(#[case] status: u16, #[case] variant: &str) {
        let err = ApiError::from_details(ErrorDetails::new(status, "boom"));
        assert!(format!("{:?}", err).starts_with(variant));
        assert_eq!(err.status(), Some(status));
    }

    #[test]
    fn test_parse_flat_body() {
        let body = concat!(
            r#"{"message":"Invalid input","code":"E100","#,
            r#""errors":[{"field":"name","message":"required"}]}"#
        );
        let details = ErrorDetails::from_body(400, body.as_bytes(), Some("ray-1".into()));

        assert_eq!(details.message, "Invalid input");
        assert_eq!(details.code.as_deref(), Some("E100"));
        assert_eq!(details.field_errors, vec![FieldError::new("name", "required")]);
        assert_eq!(details.ray_id.as_deref(), Some("ray-1"));
    }

    #[test]
    fn test_parse_wrapped_body_with_numeric_code() {
        let body = br#"{"error":{"message":"Nope","code":42}}"#;
        let details = ErrorDetails::from_body(403, body, None);

        assert_eq!(details.message, "Nope");
        assert_eq!(details.code.as_deref(), Some("42"));
        assert!(details.field_errors.is_empty());
    }

    #[test]
    fn test_parse_plain_text_body() {
        let details = ErrorDetails::from_body(502, b"  upstream exploded  ", None);
        assert_eq!(details.message, "upstream exploded");
    }

    #[test]
    fn test_parse_empty_body_uses_reason() {
        let details = ErrorDetails::from_body(404, b"", None);
        assert_eq!(details.message, "Not Found");
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(2000);
        let details = ErrorDetails::from_body(500, body.as_bytes(), None);
        assert_eq!(details.message.len(), MAX_MESSAGE_LEN + 3);
    }

    #[test]
    fn test_accessors() {
        let err = ApiError::rate_limited(Some(Duration::from_secs(5)), Some("abc".into()), 4);
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.ray_id(), Some("abc"));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("ray id: abc"));

        let err = ApiError::Validation(
            ErrorDetails::new(422, "bad").with_field_error(FieldError::new("email", "invalid")),
        );
        assert_eq!(err.field_errors().len(), 1);
        assert!(!err.is_retryable());
        assert!(!ApiError::Cancelled.is_retryable());
    }
}
