//! Page shapes.

use serde::{Deserialize, Serialize};

/// Pagination fields a page may carry.
///
/// Servers send either the skip triple (`totalCount`, `skip`,
/// `returnedCount`) or a `nextToken`. A page with none of them is the only
/// page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMetadata {
    /// Total number of items across all pages.
    #[serde(default, alias = "total_count", alias = "total")]
    pub total_count: Option<u64>,
    /// Number of items in this page.
    #[serde(default, alias = "returned_count", alias = "count")]
    pub returned_count: Option<u64>,
    /// Offset of this page.
    #[serde(default, alias = "offset")]
    pub skip: Option<u64>,
    /// Continuation token for the next page.
    #[serde(default, alias = "next_token", alias = "continuationToken")]
    pub next_token: Option<String>,
}

impl PaginationMetadata {
    /// Metadata for a skip-style page.
    pub fn skip(skip: u64, returned_count: u64, total_count: u64) -> Self {
        Self {
            total_count: Some(total_count),
            returned_count: Some(returned_count),
            skip: Some(skip),
            next_token: None,
        }
    }

    /// Metadata for a token-style page.
    pub fn token(next_token: impl Into<String>) -> Self {
        Self {
            next_token: Some(next_token.into()),
            ..Self::default()
        }
    }

    /// Whether no pagination field is present.
    pub fn is_empty(&self) -> bool {
        self.total_count.is_none()
            && self.returned_count.is_none()
            && self.skip.is_none()
            && self.next_token.is_none()
    }

    /// The continuation token, if present and non-empty.
    pub fn continuation(&self) -> Option<&str> {
        self.next_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// A page response exposing its items and pagination metadata.
pub trait PageResponse {
    /// Item type.
    type Item;

    /// Split into items and metadata.
    fn into_parts(self) -> (Vec<Self::Item>, PaginationMetadata);
}

/// Generic page envelope: `{"items": [...], "metadata": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in this page.
    #[serde(default = "Vec::new", alias = "data", alias = "results")]
    pub items: Vec<T>,
    /// Pagination metadata.
    #[serde(default, alias = "pagination", alias = "meta")]
    pub metadata: PaginationMetadata,
}

impl<T> Page<T> {
    /// Create a page.
    pub fn new(items: Vec<T>, metadata: PaginationMetadata) -> Self {
        Self { items, metadata }
    }

    /// Create a page with no pagination metadata.
    pub fn single(items: Vec<T>) -> Self {
        Self::new(items, PaginationMetadata::default())
    }
}

impl<T> PageResponse for Page<T> {
    type Item = T;

    fn into_parts(self) -> (Vec<T>, PaginationMetadata) {
        (self.items, self.metadata)
    }
}
