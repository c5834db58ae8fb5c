//! Lazy iteration over paginated result sets.
//!
//! Pages are fetched strictly one after another, only when the consumer
//! needs more items. The sequence is forward-only and cannot be restarted;
//! dropping it part way leaves nothing behind.

use crate::cursor::{Advance, CursorTracker, StylePolicy};
use crate::fetcher::PageFetcher;
use crate::metadata::PageResponse;
use bizapi_core::Result;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Item type produced by a fetcher.
pub type ItemOf<F> = <<F as PageFetcher>::Page as PageResponse>::Item;

/// Walks a paginated result set.
#[derive(Debug)]
pub struct Paginator<F> {
    fetcher: F,
    policy: StylePolicy,
}

impl<F> Paginator<F>
where
    F: PageFetcher,
    ItemOf<F>: Send,
{
    /// Create a paginator with the default (locked) style policy.
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            policy: StylePolicy::default(),
        }
    }

    /// Set the style policy.
    pub fn with_policy(mut self, policy: StylePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fetch every page and collect all items.
    pub async fn materialize_all(self) -> Result<Vec<ItemOf<F>>> {
        self.collect(None).await
    }

    /// Collect at most `limit` items, fetching no page past the one that
    /// reaches the limit.
    pub async fn materialize_up_to(self, limit: usize) -> Result<Vec<ItemOf<F>>> {
        self.collect(Some(limit)).await
    }

    /// Turn into a lazy stream of items.
    ///
    /// The first fetch error is yielded once and ends the stream. Items
    /// already yielded stay yielded.
    pub fn into_stream(self) -> impl Stream<Item = Result<ItemOf<F>>> + Send {
        let walker = PageWalker::new(self.fetcher, self.policy);

        stream::try_unfold(
            (walker, VecDeque::new()),
            |(mut walker, mut buffer)| async move {
                loop {
                    if let Some(item) = buffer.pop_front() {
                        return Ok(Some((item, (walker, buffer))));
                    }
                    match walker.next_page().await? {
                        Some(items) => buffer.extend(items),
                        None => return Ok(None),
                    }
                }
            },
        )
    }

    async fn collect(self, limit: Option<usize>) -> Result<Vec<ItemOf<F>>> {
        let mut walker = PageWalker::new(self.fetcher, self.policy);
        let mut items = Vec::new();

        while limit.map_or(true, |limit| items.len() < limit) {
            match walker.next_page().await? {
                Some(page) => items.extend(page),
                None => break,
            }
        }

        if let Some(limit) = limit {
            items.truncate(limit);
        }

        debug!(
            items = items.len(),
            pages = walker.pages,
            "Pagination finished"
        );
        Ok(items)
    }
}

/// Fetches pages one at a time and tracks the cursor between them.
struct PageWalker<F> {
    fetcher: F,
    tracker: CursorTracker,
    started: bool,
    pages: u32,
}

impl<F: PageFetcher> PageWalker<F> {
    fn new(fetcher: F, policy: StylePolicy) -> Self {
        Self {
            fetcher,
            tracker: CursorTracker::new(policy),
            started: false,
            pages: 0,
        }
    }

    /// Fetch the next page, or `None` once the result set is exhausted.
    async fn next_page(&mut self) -> Result<Option<Vec<ItemOf<F>>>> {
        let (skip, token) = match (self.started, self.tracker.current()) {
            (false, _) => (0, None),
            (true, Some(cursor)) => cursor.fetch_params(),
            (true, None) => return Ok(None),
        };
        self.started = true;

        trace!(skip, has_token = token.is_some(), page = self.pages + 1, "Fetching page");

        // On error the tracker is left without a cursor, so the walk ends.
        let page = match self.fetcher.fetch(skip, token).await {
            Ok(page) => page,
            Err(err) => {
                self.tracker = CursorTracker::default();
                return Err(err);
            }
        };
        self.pages += 1;

        let (items, metadata) = page.into_parts();
        if let Advance::End = self.tracker.advance(&metadata)? {
            trace!(pages = self.pages, "Last page reached");
        }
        Ok(Some(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::from_fn;
    use crate::metadata::{Page, PaginationMetadata};
    use bizapi_core::ApiError;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Skip-style fetcher over `1..=total`, `page_size` at a time.
    fn skip_fetcher(
        total: u64,
        page_size: u64,
        calls: Arc<AtomicU32>,
    ) -> impl PageFetcher<Page = Page<u64>> {
        from_fn(move |skip, token| {
            let calls = calls.clone();
            async move {
                assert!(token.is_none());
                calls.fetch_add(1, Ordering::SeqCst);
                let end = (skip + page_size).min(total);
                let items: Vec<u64> = (skip + 1..=end).collect();
                let returned = items.len() as u64;
                Ok(Page::new(
                    items,
                    PaginationMetadata::skip(skip, returned, total),
                ))
            }
        })
    }

    /// Token-style fetcher serving `pages`, each with its own next token.
    fn token_fetcher(
        pages: Vec<(Vec<&'static str>, &'static str)>,
        seen: Arc<Mutex<Vec<Option<String>>>>,
    ) -> impl PageFetcher<Page = Page<&'static str>> {
        let pages = Arc::new(pages);
        from_fn(move |skip, token| {
            let pages = pages.clone();
            let seen = seen.clone();
            async move {
                assert_eq!(skip, 0);
                let index = seen.lock().len();
                seen.lock().push(token);
                let (items, next) = pages[index].clone();
                Ok(Page::new(items, PaginationMetadata::token(next)))
            }
        })
    }

    #[tokio::test]
    async fn test_skip_pagination_fetches_exactly_needed_pages() {
        let calls = Arc::new(AtomicU32::new(0));
        let items = Paginator::new(skip_fetcher(7, 3, calls.clone()))
            .materialize_all()
            .await
            .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_token_pagination_stops_on_empty_token() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let fetcher = token_fetcher(
            vec![(vec!["a", "b"], "t1"), (vec!["c"], "t2"), (vec!["d"], "")],
            seen.clone(),
        );

        let items = Paginator::new(fetcher).materialize_all().await.unwrap();

        assert_eq!(items, vec!["a", "b", "c", "d"]);
        assert_eq!(
            *seen.lock(),
            vec![None, Some("t1".to_string()), Some("t2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_token_cycle_ends_the_walk() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let fetcher = token_fetcher(
            vec![
                (vec!["a"], "t1"),
                (vec!["b"], "t2"),
                (vec!["c"], "t1"),
                (vec!["never"], ""),
            ],
            seen.clone(),
        );

        let items = Paginator::new(fetcher).materialize_all().await.unwrap();

        assert_eq!(items, vec!["a", "b", "c"]);
        assert_eq!(seen.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_materialize_up_to_stops_mid_page() {
        let calls = Arc::new(AtomicU32::new(0));
        let items = Paginator::new(skip_fetcher(10, 2, calls.clone()))
            .materialize_up_to(5)
            .await
            .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_materialize_up_to_zero_fetches_nothing() {
        let calls = Arc::new(AtomicU32::new(0));
        let items = Paginator::new(skip_fetcher(10, 2, calls.clone()))
            .materialize_up_to(0)
            .await
            .unwrap();

        assert!(items.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_materialize_up_to_beyond_total() {
        let calls = Arc::new(AtomicU32::new(0));
        let items = Paginator::new(skip_fetcher(4, 3, calls.clone()))
            .materialize_up_to(100)
            .await
            .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_page_without_metadata() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = {
            let calls = calls.clone();
            from_fn(move |_, _| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Page::single(vec![1, 2]))
                }
            })
        };

        let items = Paginator::new(fetcher).materialize_all().await.unwrap();
        assert_eq!(items, vec![1, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let calls = Arc::new(AtomicU32::new(0));
        let stream = Paginator::new(skip_fetcher(9, 3, calls.clone())).into_stream();
        futures::pin_mut!(stream);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stream.next().await.unwrap().unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let rest: Vec<u64> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(rest, vec![2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stream_surfaces_first_error_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = {
            let calls = calls.clone();
            from_fn(move |skip, _| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if skip == 0 {
                        Ok(Page::new(vec![1u32, 2], PaginationMetadata::skip(0, 2, 6)))
                    } else {
                        Err(ApiError::network("connection reset", 4))
                    }
                }
            })
        };

        let results: Vec<Result<u32>> = Paginator::new(fetcher).into_stream().collect().await;

        assert_eq!(results.len(), 3);
        assert_eq!(*results[0].as_ref().unwrap(), 1);
        assert_eq!(*results[1].as_ref().unwrap(), 2);
        assert!(matches!(results[2], Err(ApiError::Network { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_materialize_propagates_error() {
        let fetcher = from_fn(|_, _| async {
            Err::<Page<u32>, _>(ApiError::NotFound(bizapi_core::ErrorDetails::new(
                404, "gone",
            )))
        });

        let err = Paginator::new(fetcher).materialize_all().await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_style_switch_is_protocol_error() {
        let fetcher = from_fn(|skip, _| async move {
            if skip == 0 {
                Ok(Page::new(vec![1u32], PaginationMetadata::skip(0, 1, 5)))
            } else {
                Ok(Page::new(vec![2u32], PaginationMetadata::token("weird")))
            }
        });

        let err = Paginator::new(fetcher).materialize_all().await.unwrap_err();
        assert!(matches!(err, ApiError::Pagination(_)));
    }

    #[tokio::test]
    async fn test_adaptive_policy_follows_switch() {
        let fetcher = from_fn(|skip, token| async move {
            match (skip, token.as_deref()) {
                (0, None) => Ok(Page::new(vec![1u32], PaginationMetadata::skip(0, 1, 5))),
                (1, None) => Ok(Page::new(vec![2u32], PaginationMetadata::token("next"))),
                (0, Some("next")) => Ok(Page::single(vec![3u32])),
                other => panic!("unexpected fetch: {:?}", other),
            }
        });

        let items = Paginator::new(fetcher)
            .with_policy(StylePolicy::Adaptive)
            .materialize_all()
            .await
            .unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_token_pages_continue_until_exhausted() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let fetcher = token_fetcher(
            vec![(vec![], "t1"), (vec![], "t2"), (vec!["only"], "")],
            seen.clone(),
        );

        let items: Vec<&str> = Paginator::new(fetcher)
            .into_stream()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(items, vec!["only"]);
        assert_eq!(seen.lock().len(), 3);
    }
}
