//! # bizapi - Resilient client for business data APIs
//!
//! bizapi puts a request pipeline between application code and a remote
//! business data HTTP API:
//!
//! - an admission **throttle** bounding how many requests start per 10
//!   second window,
//! - a **retry** loop with exponential backoff, `Retry-After` support and
//!   typed failure classification,
//! - a **pagination** engine that hides skip/top and continuation-token
//!   cursors behind one lazy sequence.
//!
//! ## Quick Start
//!
//! ```ignore
//! use bizapi::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> bizapi::Result<()> {
//!     let client = ApiClient::builder(
//!         ClientConfig::new("https://api.example.com").throttle_limit(40),
//!     )
//!     .auth(std::sync::Arc::new(StaticBearer::new("token")))
//!     .build()?;
//!
//!     let cancel = CancellationToken::new();
//!     let tenant: serde_json::Value = client.get_json("/tenants/acme", &cancel).await?;
//!
//!     let invoices: Vec<serde_json::Value> = client
//!         .paginate(ApiRequest::get("/tenants/acme/invoices"), Some(100), cancel)
//!         .materialize_up_to(500)
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`bizapi_core`] - Requests, responses and the error taxonomy
//! - [`bizapi_retries`] - Throttle, backoff, classification and the executor
//! - [`bizapi_pagination`] - Cursors and the lazy paginator

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod observe;

// ============================================================================
// Crate Re-exports
// ============================================================================

/// Core types and errors.
pub use bizapi_core as core;

/// Throttling, retries and the request executor.
pub use bizapi_retries as retries;

/// Pagination.
pub use bizapi_pagination as pagination;

// ============================================================================
// Type Re-exports (Flat)
// ============================================================================

pub use client::{ApiClient, ApiClientBuilder, ListFetcher};
pub use config::ClientConfig;
pub use observe::tracing_observers;

pub use bizapi_core::{
    ApiError, ApiRequest, ApiResponse, ErrorDetails, FieldError, Method, Result, StatusCode,
};
pub use bizapi_pagination::{Page, PaginationMetadata, Paginator, StylePolicy};
pub use bizapi_retries::{
    AuthStrategy, CancellationToken, NoAuth, RefreshingBearer, ResourceLocator, RetryConfig,
    RetryState, SlidingWindowThrottle, StaticBearer, Throttle, TokenSource,
};

/// Prelude for common imports.
///
/// ```ignore
/// use bizapi::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ApiClient, ApiError, ApiRequest, CancellationToken, ClientConfig, Page, Result,
        StaticBearer,
    };
    pub use futures::StreamExt;
}
