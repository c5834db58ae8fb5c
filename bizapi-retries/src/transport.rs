//! HTTP transport.
//!
//! The executor talks to the network through the [`Transport`] trait. A
//! transport returns any HTTP response it receives; classifying statuses is
//! the executor's job.

use async_trait::async_trait;
use bizapi_core::{ApiError, ApiRequest, ApiResponse};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure to obtain any HTTP response.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request timed out.
    #[error("Timeout")]
    Timeout,

    /// Connection could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connection(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Capability to send one request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return whatever response comes back.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest` connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Create a transport with a default reqwest client.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_client(Client::new(), base_url)
    }

    /// Create with a custom reqwest client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Result<Self, ApiError> {
        let base_url = base_url.into();
        url::Url::parse(&base_url).map_err(|e| {
            ApiError::configuration(format!("Invalid base URL '{}': {}", base_url, e))
        })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a builder.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Get a reference to the underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a request path against the base URL.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(&request.path);
        debug!(method = %request.method, url = %url, "Making HTTP request");

        let mut builder = self
            .client
            .request(request.method, &url)
            .headers(request.headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(ApiResponse::new(status, headers, body))
    }
}

/// Builder for creating a reqwest transport.
#[derive(Debug, Default)]
pub struct ReqwestTransportBuilder {
    client: Option<Client>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl ReqwestTransportBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the underlying HTTP client.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set a client-level timeout. Ignored when a client is supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent. Ignored when a client is supplied.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<ReqwestTransport, ApiError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ApiError::configuration("Base URL is required"))?;

        let client = match self.client {
            Some(client) => client,
            None => {
                let mut builder = Client::builder();
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                if let Some(user_agent) = self.user_agent {
                    builder = builder.user_agent(user_agent);
                }
                builder
                    .build()
                    .map_err(|e| ApiError::configuration(format!("Failed to build client: {}", e)))?
            }
        };

        ReqwestTransport::with_client(client, base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_url_for() {
        let transport = ReqwestTransport::new("https://api.example.com/v1/").unwrap();
        assert_eq!(transport.base_url(), "https://api.example.com/v1");
        assert_eq!(
            transport.url_for("/tenants/1/items"),
            "https://api.example.com/v1/tenants/1/items"
        );
        assert_eq!(
            transport.url_for("items"),
            "https://api.example.com/v1/items"
        );
        assert_eq!(
            transport.url_for("https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = ReqwestTransport::new("not a url").unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
    }

    #[test]
    fn test_builder_requires_base_url() {
        let err = ReqwestTransport::builder().build().unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_send_passes_query_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/items"))
            .and(query_param("top", "5"))
            .and(header("x-test", "yes"))
            .and(body_string("hello"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("x-ray-id", "ray-7")
                    .set_body_string("created"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::builder()
            .base_url(format!("{}/v1", server.uri()))
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let request = ApiRequest::post("/items")
            .query("top", 5)
            .header(
                reqwest::header::HeaderName::from_static("x-test"),
                reqwest::header::HeaderValue::from_static("yes"),
            )
            .body("hello");

        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status.as_u16(), 201);
        assert_eq!(response.ray_id().as_deref(), Some("ray-7"));
        assert_eq!(response.text(), "created");
    }

    #[tokio::test]
    async fn test_error_statuses_are_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(server.uri()).unwrap();
        let response = transport.send(ApiRequest::get("/anything")).await.unwrap();
        assert_eq!(response.status.as_u16(), 503);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let transport = ReqwestTransport::new("http://127.0.0.1:1").unwrap();
        let err = transport.send(ApiRequest::get("/")).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connection(_) | TransportError::Other(_)
        ));
    }
}
