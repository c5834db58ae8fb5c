//! Page fetchers.

use crate::metadata::PageResponse;
use async_trait::async_trait;
use bizapi_core::Result;
use std::future::Future;

/// Capability to fetch one page.
///
/// Skip-style result sets are fetched with `skip` set and no token;
/// token-style result sets with `skip == 0` and the continuation token.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Page type returned by this fetcher.
    type Page: PageResponse + Send;

    /// Fetch the page at `skip` or `token`.
    async fn fetch(&self, skip: u64, token: Option<String>) -> Result<Self::Page>;
}

/// [`PageFetcher`] backed by a closure.
#[derive(Debug, Clone)]
pub struct FnFetcher<F> {
    f: F,
}

/// Build a fetcher from a closure.
///
/// # Example
///
/// ```ignore
/// let fetcher = from_fn(|skip, token| async move {
///     client.list_invoices(skip, token).await
/// });
/// ```
pub fn from_fn<F, Fut, P>(f: F) -> FnFetcher<F>
where
    F: Fn(u64, Option<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<P>> + Send + 'static,
    P: PageResponse + Send + 'static,
{
    FnFetcher { f }
}

#[async_trait]
impl<F, Fut, P> PageFetcher for FnFetcher<F>
where
    F: Fn(u64, Option<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<P>> + Send + 'static,
    P: PageResponse + Send + 'static,
{
    type Page = P;

    async fn fetch(&self, skip: u64, token: Option<String>) -> Result<P> {
        (self.f)(skip, token).await
    }
}
