//! Cursor detection and advancement.

use crate::metadata::PaginationMetadata;
use bizapi_core::{ApiError, Result};
use std::collections::HashSet;
use tracing::warn;

/// Position of the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Offset-based position.
    Skip {
        /// Offset of the next page.
        skip: u64,
        /// Size of the page that produced this cursor.
        page_size: u64,
    },
    /// Opaque continuation token.
    Token(String),
}

impl PageCursor {
    /// Parameters for the page fetcher: `(skip, token)`.
    pub fn fetch_params(&self) -> (u64, Option<String>) {
        match self {
            Self::Skip { skip, .. } => (*skip, None),
            Self::Token(token) => (0, Some(token.clone())),
        }
    }

    /// The cursor's style.
    pub fn style(&self) -> CursorStyle {
        match self {
            Self::Skip { .. } => CursorStyle::Skip,
            Self::Token(_) => CursorStyle::Token,
        }
    }
}

/// Pagination style of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    /// `skip` / `returnedCount` / `totalCount`.
    Skip,
    /// `nextToken`.
    Token,
}

/// How to treat a result set whose pages change style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StylePolicy {
    /// Lock the style detected on the first continuing page. A skip-style
    /// result set that later sends a continuation token is a protocol error.
    #[default]
    Locked,
    /// Re-detect the style on every page.
    Adaptive,
}

/// Result of inspecting a page's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Fetch another page at this cursor.
    Next(PageCursor),
    /// The result set is exhausted.
    End,
}

/// Tracks the cursor across the pages of one iteration.
#[derive(Debug, Clone, Default)]
pub struct CursorTracker {
    policy: StylePolicy,
    locked: Option<CursorStyle>,
    current: Option<PageCursor>,
    seen_tokens: HashSet<String>,
}

impl CursorTracker {
    /// Create a tracker.
    pub fn new(policy: StylePolicy) -> Self {
        Self {
            policy,
            locked: None,
            current: None,
            seen_tokens: HashSet::new(),
        }
    }

    /// The style locked so far, if any.
    pub fn locked_style(&self) -> Option<CursorStyle> {
        self.locked
    }

    /// Cursor for the next fetch. `None` before the first page.
    pub fn current(&self) -> Option<&PageCursor> {
        self.current.as_ref()
    }

    /// Inspect the metadata of the page just fetched and move the cursor.
    pub fn advance(&mut self, metadata: &PaginationMetadata) -> Result<Advance> {
        let advance = if let Some(token) = metadata.continuation() {
            self.check_style(CursorStyle::Token)?;
            self.next_token(token)
        } else if let (Some(total), Some(skip), Some(returned)) =
            (metadata.total_count, metadata.skip, metadata.returned_count)
        {
            if self.locked == Some(CursorStyle::Token) && self.policy == StylePolicy::Locked {
                // A token result set ends at the first page without a token.
                Advance::End
            } else {
                self.next_skip(total, skip, returned)
            }
        } else {
            Advance::End
        };

        match advance {
            Advance::Next(ref cursor) => {
                if self.locked.is_none() {
                    self.locked = Some(cursor.style());
                }
                self.current = Some(cursor.clone());
            }
            Advance::End => self.current = None,
        }
        Ok(advance)
    }

    fn check_style(&self, style: CursorStyle) -> Result<()> {
        match (self.policy, self.locked) {
            (StylePolicy::Locked, Some(locked)) if locked != style => Err(ApiError::pagination(
                format!("result set switched from {:?} to {:?} pagination", locked, style),
            )),
            _ => Ok(()),
        }
    }

    fn next_token(&mut self, token: &str) -> Advance {
        // Any token already followed in this walk would replay a page cycle.
        if !self.seen_tokens.insert(token.to_string()) {
            warn!(
                tokens = self.seen_tokens.len(),
                "Server repeated continuation token, ending pagination"
            );
            return Advance::End;
        }
        Advance::Next(PageCursor::Token(token.to_string()))
    }

    fn next_skip(&self, total: u64, skip: u64, returned: u64) -> Advance {
        let next = skip.saturating_add(returned);
        if returned == 0 || next >= total {
            return Advance::End;
        }

        // The offset must move past the one just requested.
        if let Some(PageCursor::Skip { skip: requested, .. }) = &self.current {
            if next <= *requested {
                warn!(
                    requested = *requested,
                    next, "Skip cursor made no progress, ending pagination"
                );
                return Advance::End;
            }
        }

        Advance::Next(PageCursor::Skip {
            skip: next,
            page_size: returned,
        })
    }
}
