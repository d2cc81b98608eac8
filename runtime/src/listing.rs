//! Listing pages with per-item detail fetches.
//!
//! A listing is fetched once, items are extracted from it by a caller-supplied
//! function, and only then is each item's detail page fetched through the
//! shared [`KeyedCache`]. What to extract and how to merge it stays with the
//! caller.

use crate::cache::{CacheKey, KeyedCache};
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use futures::stream::{self, StreamExt};
use tracing::warn;

/// Default number of detail pages fetched at once.
pub const DEFAULT_ITEM_CONCURRENCY: usize = 4;

/// An item extracted from a listing page.
pub trait ListingItem {
    /// Absolute URL of the item's detail page.
    fn link(&self) -> &str;
    /// Stable identifier, used in the cache key.
    fn guid(&self) -> &str;
}

/// Where the listing lives and how its items are cached.
#[derive(Debug, Clone)]
pub struct ListingRequest {
    pub page_url: String,
    /// Readiness selector for the listing page.
    pub list_selector: String,
    /// Readiness selector for detail pages.
    pub item_selector: String,
    /// Cache key namespace: `<source>:<entity>:<id>:<guid>:html`.
    pub source: String,
    pub entity: String,
    pub id: String,
    pub item_concurrency: usize,
}

/// A fetched listing.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    /// HTML of the listing page itself.
    pub page: String,
    pub items: Vec<T>,
}

/// Fetch a listing and enrich each item with its detail page.
///
/// Fails with [`FetchError::NoContent`] when the listing page yields nothing.
/// A failed detail fetch is not cached and reaches `enrich` as an empty
/// string.
pub async fn collect_listing<T, X, M>(
    fetcher: &Fetcher,
    cache: &KeyedCache<String>,
    request: &ListingRequest,
    extract_items: X,
    enrich: M,
) -> Result<Listing<T>, FetchError>
where
    T: ListingItem,
    X: FnOnce(&str) -> Vec<T>,
    M: Fn(T, &str) -> T,
{
    let page = fetcher
        .fetch_page(&request.page_url, &request.list_selector)
        .await;
    if page.is_empty() {
        return Err(FetchError::NoContent {
            url: request.page_url.clone(),
        });
    }

    let items = extract_items(&page);

    let details: Vec<String> = stream::iter(items.iter())
        .map(|item| {
            let key = CacheKey::new(
                request.source.as_str(),
                request.entity.as_str(),
                request.id.as_str(),
                item.guid(),
                "html",
            )
            .to_string();
            let detail = fetcher.page_request(item.link(), &request.item_selector);
            let fetcher = fetcher.clone();

            async move {
                let result = cache
                    .get_or_compute(&key, move || async move { fetcher.try_fetch(&detail).await })
                    .await;
                match result {
                    Ok(html) => html,
                    Err(e) => {
                        warn!(key = %key, "detail fetch failed: {e}");
                        String::new()
                    }
                }
            }
        })
        .buffered(request.item_concurrency.max(1))
        .collect()
        .await;

    let items = items
        .into_iter()
        .zip(details)
        .map(|(item, html)| enrich(item, &html))
        .collect();

    Ok(Listing { page, items })
}
