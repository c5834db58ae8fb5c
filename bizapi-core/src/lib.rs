//! # bizapi-core
//!
//! Core types shared by every bizapi crate.
//!
//! - [`ApiRequest`] / [`ApiResponse`]: what flows through the pipeline
//! - [`ApiError`]: the typed failure taxonomy
//! - [`ErrorDetails`] / [`FieldError`]: structured server error bodies

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod errors;
pub mod request;

pub use errors::{ApiError, ErrorDetails, FieldError, Result};
pub use request::{ApiRequest, ApiResponse, RAY_ID_HEADERS};

// Re-exported so downstream crates agree on one http type set.
pub use bytes::Bytes;
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode};
