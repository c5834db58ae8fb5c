//! # bizapi-retries
//!
//! The request pipeline: admission control, retries with backoff, and
//! failure classification.
//!
//! ## Core Concepts
//!
//! - **[`RequestExecutor`]**: runs one logical call through the retry loop
//! - **[`Throttle`]**: admission gate consulted before every attempt
//! - **[`Verdict`] / [`Outcome`]**: classification and transition decision
//! - **[`AuthStrategy`]**: per-resource credentials and 401 recovery
//! - **[`Transport`]**: the network, with [`ReqwestTransport`] as default
//!
//! ## Example
//!
//! ```ignore
//! use bizapi_core::ApiRequest;
//! use bizapi_retries::{RequestExecutor, ReqwestTransport, RetryConfig, SlidingWindowThrottle};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let executor = RequestExecutor::new(Arc::new(ReqwestTransport::new("https://api.example.com")?))
//!     .with_config(RetryConfig::new().max_retries(5))
//!     .with_throttle(Arc::new(SlidingWindowThrottle::new(40)))
//!     .on_retry(|e| eprintln!("retrying {} after {:?}", e.path, e.wait));
//!
//! let response = executor
//!     .execute(ApiRequest::get("/tenants/acme/invoices"), &CancellationToken::new())
//!     .await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod auth;
pub mod backoff;
pub mod classify;
pub mod config;
pub mod events;
pub mod executor;
pub mod throttle;
pub mod transport;

// Re-exports
pub use auth::{AuthStrategy, NoAuth, RefreshingBearer, ResourceLocator, StaticBearer, TokenSource};
pub use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
pub use classify::{decide, Outcome, TransientFailure, Verdict};
pub use config::RetryConfig;
pub use events::{AttemptEvent, Observers, RateLimitEvent, RetryEvent, RetryReason};
pub use executor::{AttemptInfo, RequestExecutor, RetryState};
pub use throttle::{NoThrottle, SlidingWindowThrottle, Throttle, DEFAULT_THROTTLE_LIMIT};
pub use transport::{ReqwestTransport, ReqwestTransportBuilder, Transport, TransportError};

pub use tokio_util::sync::CancellationToken;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        AuthStrategy, CancellationToken, RequestExecutor, ReqwestTransport, RetryConfig,
        SlidingWindowThrottle, Throttle, Transport,
    };
}
