//! The API client.

use crate::config::ClientConfig;
use crate::observe::tracing_observers;
use async_trait::async_trait;
use bizapi_core::{ApiRequest, ApiResponse, Method, Result};
use bizapi_pagination::{Page, PageFetcher, Paginator};
use bizapi_retries::{
    AuthStrategy, CancellationToken, Observers, RequestExecutor, ReqwestTransport,
    ResourceLocator, RetryState, Throttle, Transport,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Query parameter carrying the skip offset.
pub const SKIP_PARAM: &str = "skip";
/// Query parameter carrying the page size.
pub const TOP_PARAM: &str = "top";
/// Query parameter carrying the continuation token.
pub const TOKEN_PARAM: &str = "continuationToken";

/// Client for the business data API.
///
/// Every call goes through one shared [`RequestExecutor`], so all calls made
/// through a client (and its clones) share the connection pool and throttle.
#[derive(Debug, Clone)]
pub struct ApiClient {
    executor: RequestExecutor,
    config: ClientConfig,
}

impl ApiClient {
    /// Create a client from a config, with no auth.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Create a client from `BIZAPI_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Create a builder.
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    /// The config this client was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The underlying executor.
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Send a request through the retry pipeline.
    pub async fn execute(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse> {
        self.executor.execute(request, cancel).await
    }

    /// Like [`execute`](Self::execute), also returning the attempt history.
    pub async fn execute_with_state(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> (Result<ApiResponse>, RetryState) {
        self.executor.execute_with_state(request, cancel).await
    }

    /// GET `path` and decode the JSON response.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        self.execute(ApiRequest::get(path), cancel).await?.json()
    }

    /// Send `body` as JSON and decode the JSON response.
    pub async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::new(method, path).json(body)?;
        self.execute(request, cancel).await?.json()
    }

    /// Iterate a list endpoint lazily.
    ///
    /// `request` is the first-page request; pagination parameters are added
    /// per page. `page_size`, if set, is sent as `top` on skip-style pages.
    pub fn paginate<T>(
        &self,
        request: ApiRequest,
        page_size: Option<u32>,
        cancel: CancellationToken,
    ) -> Paginator<ListFetcher<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        Paginator::new(ListFetcher {
            client: self.clone(),
            request,
            page_size,
            cancel,
            _item: PhantomData,
        })
    }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    auth: Option<Arc<dyn AuthStrategy>>,
    throttle: Option<Arc<dyn Throttle>>,
    locator: Option<ResourceLocator>,
    observers: Observers,
    tracing: bool,
}

impl fmt::Debug for ApiClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClientBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .field("auth", &self.auth)
            .field("throttle", &self.throttle)
            .field("locator", &self.locator)
            .field("observers", &self.observers)
            .field("tracing", &self.tracing)
            .finish()
    }
}

impl ApiClientBuilder {
    /// Create a builder.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            auth: None,
            throttle: None,
            locator: None,
            observers: Observers::default(),
            tracing: true,
        }
    }

    /// Use a custom transport instead of reqwest.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the auth strategy.
    pub fn auth(mut self, auth: Arc<dyn AuthStrategy>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Use a specific throttle, e.g. one shared with other clients.
    pub fn throttle(mut self, throttle: Arc<dyn Throttle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Set how resource identifiers are found for auth.
    pub fn locator(mut self, locator: ResourceLocator) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Add observers.
    pub fn observers(mut self, observers: Observers) -> Self {
        self.observers = self.observers.merge(observers);
        self
    }

    /// Whether to log events through `tracing`. On by default.
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.tracing = enabled;
        self
    }

    /// Validate the config and build the client.
    pub fn build(self) -> Result<ApiClient> {
        self.config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let mut builder = ReqwestTransport::builder().base_url(&self.config.base_url);
                if let Some(user_agent) = &self.config.user_agent {
                    builder = builder.user_agent(user_agent);
                }
                Arc::new(builder.build()?)
            }
        };

        let throttle = self
            .throttle
            .unwrap_or_else(|| self.config.build_throttle());

        let mut executor = RequestExecutor::new(transport)
            .with_config(self.config.to_retry_config())
            .with_throttle(throttle);
        if let Some(auth) = self.auth {
            executor = executor.with_auth(auth);
        }
        if let Some(locator) = self.locator {
            executor = executor.with_locator(locator);
        }
        if self.tracing {
            executor = executor.with_observers(tracing_observers());
        }
        executor = executor.with_observers(self.observers);

        Ok(ApiClient {
            executor,
            config: self.config,
        })
    }
}

/// Page fetcher for a list endpoint, created by [`ApiClient::paginate`].
pub struct ListFetcher<T> {
    client: ApiClient,
    request: ApiRequest,
    page_size: Option<u32>,
    cancel: CancellationToken,
    _item: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for ListFetcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListFetcher")
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl<T> ListFetcher<T> {
    fn page_request(&self, skip: u64, token: Option<String>) -> ApiRequest {
        let mut request = self.request.clone();
        match token {
            Some(token) => request = request.query(TOKEN_PARAM, token),
            None => {
                request = request.query(SKIP_PARAM, skip);
                if let Some(top) = self.page_size {
                    request = request.query(TOP_PARAM, top);
                }
            }
        }
        request
    }
}

#[async_trait]
impl<T> PageFetcher for ListFetcher<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Page = Page<T>;

    async fn fetch(&self, skip: u64, token: Option<String>) -> Result<Page<T>> {
        let request = self.page_request(skip, token);
        self.client.execute(request, &self.cancel).await?.json()
    }
}
