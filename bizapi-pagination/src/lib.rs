//! # bizapi-pagination
//!
//! Lazy, forward-only iteration over paginated list endpoints.
//!
//! Two pagination styles are understood:
//!
//! - **Skip**: each page reports `totalCount`, `skip` and `returnedCount`;
//!   the next page starts at `skip + returnedCount`.
//! - **Token**: each page reports a `nextToken`; an absent or empty token
//!   ends the result set.
//!
//! A page carrying neither is the only page.
//!
//! ## Example
//!
//! ```ignore
//! use bizapi_pagination::{from_fn, Page, Paginator};
//! use futures::StreamExt;
//!
//! let fetcher = from_fn(|skip, token| async move {
//!     client.get_json::<Page<Invoice>>(list_request(skip, token), &cancel).await
//! });
//!
//! let mut invoices = Paginator::new(fetcher).into_stream();
//! while let Some(invoice) = invoices.next().await {
//!     println!("{:?}", invoice?);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cursor;
pub mod fetcher;
pub mod metadata;
pub mod pager;

pub use cursor::{Advance, CursorStyle, CursorTracker, PageCursor, StylePolicy};
pub use fetcher::{from_fn, FnFetcher, PageFetcher};
pub use metadata::{Page, PageResponse, PaginationMetadata};
pub use pager::{ItemOf, Paginator};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{from_fn, Page, PageFetcher, PageResponse, Paginator, StylePolicy};
}
