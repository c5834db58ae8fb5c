//! Authentication strategies.
//!
//! Credentials are scoped to a resource identifier (a tenant) found in the
//! request. The executor asks the strategy for a token before each attempt,
//! attaches it to a fresh copy of the request, and gives the strategy a
//! chance to recover from a 401.

use async_trait::async_trait;
use bizapi_core::{ApiRequest, HeaderValue, Result};
use parking_lot::Mutex;
use reqwest::header::AUTHORIZATION;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Capability that supplies and refreshes credentials.
#[async_trait]
pub trait AuthStrategy: Send + Sync + fmt::Debug {
    /// Get a token for `resource_id`, or `None` to send the request unauthenticated.
    async fn token(&self, resource_id: Option<&str>) -> Result<Option<String>>;

    /// Attach a token to a request.
    fn apply(&self, request: &mut ApiRequest, token: &str) {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            request.headers.insert(AUTHORIZATION, value);
        }
    }

    /// React to an authentication failure.
    ///
    /// Returning a new token makes the executor resend the request with it.
    async fn on_auth_error(
        &self,
        _status: u16,
        _resource_id: Option<&str>,
        _attempt: u32,
        _max_attempts: u32,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Strategy that never attaches credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl AuthStrategy for NoAuth {
    async fn token(&self, _resource_id: Option<&str>) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Strategy that sends the same bearer token for every resource.
#[derive(Clone)]
pub struct StaticBearer {
    token: String,
}

impl StaticBearer {
    /// Create a new static bearer strategy.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticBearer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticBearer")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl AuthStrategy for StaticBearer {
    async fn token(&self, _resource_id: Option<&str>) -> Result<Option<String>> {
        Ok(Some(self.token.clone()))
    }
}

/// Source of per-resource tokens for [`RefreshingBearer`].
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Obtain a token for a resource.
    async fn fetch(&self, resource_id: Option<&str>) -> Result<String>;

    /// Obtain a replacement after the previous token was rejected.
    async fn refresh(&self, resource_id: Option<&str>) -> Result<String> {
        self.fetch(resource_id).await
    }
}

/// Bearer strategy that caches tokens per resource and refreshes on 401.
pub struct RefreshingBearer {
    source: Arc<dyn TokenSource>,
    cache: Mutex<HashMap<String, String>>,
}

impl fmt::Debug for RefreshingBearer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshingBearer")
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}

impl RefreshingBearer {
    /// Create a new refreshing strategy.
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Drop every cached token.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    fn key(resource_id: Option<&str>) -> String {
        resource_id.unwrap_or_default().to_string()
    }
}

#[async_trait]
impl AuthStrategy for RefreshingBearer {
    async fn token(&self, resource_id: Option<&str>) -> Result<Option<String>> {
        let key = Self::key(resource_id);
        let cached = self.cache.lock().get(&key).cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        let token = self.source.fetch(resource_id).await?;
        self.cache.lock().insert(key, token.clone());
        Ok(Some(token))
    }

    async fn on_auth_error(
        &self,
        status: u16,
        resource_id: Option<&str>,
        attempt: u32,
        max_attempts: u32,
    ) -> Result<Option<String>> {
        let key = Self::key(resource_id);
        self.cache.lock().remove(&key);

        if status != 401 || attempt > max_attempts {
            return Ok(None);
        }

        debug!(resource_id = ?resource_id, attempt, "Refreshing rejected token");
        let token = self.source.refresh(resource_id).await?;
        self.cache.lock().insert(key, token.clone());
        Ok(Some(token))
    }
}

/// Finds the resource identifier a request is scoped to.
///
/// Looks at the path segment after `path_marker`, then the `query_param`
/// query parameter, then the top-level `body_field` of a JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocator {
    /// Path segment preceding the identifier.
    pub path_marker: String,
    /// Query parameter holding the identifier.
    pub query_param: String,
    /// JSON body field holding the identifier.
    pub body_field: String,
}

impl Default for ResourceLocator {
    fn default() -> Self {
        Self {
            path_marker: "tenants".to_string(),
            query_param: "tenantId".to_string(),
            body_field: "tenantId".to_string(),
        }
    }
}

impl ResourceLocator {
    /// Create a locator using the same key everywhere.
    pub fn new(path_marker: impl Into<String>, key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            path_marker: path_marker.into(),
            query_param: key.clone(),
            body_field: key,
        }
    }

    /// Extract the identifier from a request.
    pub fn locate(&self, request: &ApiRequest) -> Option<String> {
        self.in_path(&request.path)
            .or_else(|| {
                request
                    .query_value(&self.query_param)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            })
            .or_else(|| self.in_body(request))
    }

    fn in_path(&self, path: &str) -> Option<String> {
        let path = path.split('?').next().unwrap_or_default();
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        while let Some(segment) = segments.next() {
            if segment == self.path_marker {
                return segments.next().map(str::to_string);
            }
        }
        None
    }

    fn in_body(&self, request: &ApiRequest) -> Option<String> {
        let body = request.body_json()?;
        match body.get(&self.body_field)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
