//! Paged remote listings exposed as a lazy, finite stream.

use crate::remote::Page;
use crate::utils::errors::{BackupError, Result};
use futures_util::{stream, Stream, StreamExt, TryStreamExt};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Walk a paged listing starting at page 1.
///
/// Stops after a page with `has_more == false` or with no items, whichever
/// comes first. A failed page is yielded as an error and ends the stream;
/// there is no retry. Every call starts over from page 1.
pub fn paginate<T, F, Fut>(fetcher: F) -> impl Stream<Item = Result<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    stream::unfold((fetcher, Some(1u32)), |(mut fetcher, next)| async move {
        let page = match next {
            Some(page) => page,
            None => return None,
        };
        match fetcher(page).await {
            Ok(Page { items, has_more }) => {
                let next = if has_more && !items.is_empty() { Some(page + 1) } else { None };
                Some((Ok(items), (fetcher, next)))
            }
            Err(e) => Some((Err(e), (fetcher, None))),
        }
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok::<T, BackupError>)))
    .try_flatten()
}

/// Drain a listing, keeping whatever arrived before an error or cancellation.
pub async fn collect_all<T, S>(stream: S, cancel: &CancellationToken) -> (Vec<T>, Option<BackupError>)
where
    S: Stream<Item = Result<T>>,
{
    futures_util::pin_mut!(stream);
    let mut items = Vec::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return (items, Some(BackupError::Cancelled)),
            next = stream.next() => next,
        };
        match next {
            Some(Ok(item)) => items.push(item),
            Some(Err(e)) => return (items, Some(e)),
            None => return (items, None),
        }
    }
}
