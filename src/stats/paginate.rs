use std::pin::pin;

use futures::{Stream, StreamExt, stream};
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::constants::STREAMS_PAGE_SIZE;
use crate::helix::types::HelixPage;
use crate::helix::{Helix, HelixResult, HelixUri};

enum Cursor {
    Start,
    After(String),
    Done,
}

/// Lazily walks a cursor-paginated Helix endpoint, yielding one item per page fetched.
///
/// The stream ends after `max_pages` pages, when Helix stops returning a cursor, or right after
/// yielding the first failed page. Nothing is shared between streams, so every call starts again
/// from the first page.
pub fn pages<'a, T>(
    helix: &'a Helix,
    uri: HelixUri,
    query: Vec<(&'static str, String)>,
    max_pages: usize,
) -> impl Stream<Item = HelixResult<Vec<T>>> + 'a
where
    T: DeserializeOwned + 'a,
{
    stream::unfold((Cursor::Start, 0usize), move |(cursor, fetched)| {
        let mut params = query.clone();

        async move {
            if fetched >= max_pages {
                return None;
            }

            match cursor {
                Cursor::Done => return None,
                Cursor::Start => {}
                Cursor::After(after) => params.push(("after", after)),
            }

            match helix.get::<HelixPage<T>>(uri, &params).await {
                Ok(page) => {
                    let next = match page.next_cursor() {
                        Some(after) => Cursor::After(after.to_owned()),
                        None => Cursor::Done,
                    };
                    Some((Ok(page.data), (next, fetched + 1)))
                }
                Err(e) => Some((Err(e), (Cursor::Done, fetched + 1))),
            }
        }
    })
}

/// Concatenates up to `max_pages` pages, in page order.
///
/// A failed page ends collection but is never fatal: whatever was gathered before it is
/// returned as-is.
#[instrument(skip(helix, uri, query), fields(endpoint = uri.path()))]
pub async fn collect_pages<T>(
    helix: &Helix,
    uri: HelixUri,
    query: Vec<(&'static str, String)>,
    max_pages: usize,
) -> Vec<T>
where
    T: DeserializeOwned,
{
    let mut collected = Vec::new();
    let mut page_count = 0usize;
    let mut pages = pin!(pages::<T>(helix, uri, query, max_pages));

    while let Some(page) = pages.next().await {
        match page {
            Ok(items) => {
                page_count += 1;
                collected.extend(items);
            }
            Err(e) => {
                tracing::warn!(error = %e, page = page_count + 1, "page fetch failed, keeping partial results");
                break;
            }
        }
    }

    tracing::debug!(pages = page_count, items = collected.len(), "pagination complete");
    collected
}

/// Query for the live stream list, filtered by broadcast language.
pub fn streams_query(language: &str) -> Vec<(&'static str, String)> {
    vec![
        ("language", language.to_string()),
        ("first", STREAMS_PAGE_SIZE.to_string()),
    ]
}
