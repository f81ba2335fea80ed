//! Incremental "load more" pagination over one cache key.
//!
//! Accumulated pages live in the cache as `Vec<Page<T>>` under a single
//! key, so observers of that key see the whole list grow. Whether another
//! page exists is derived from the last page's cursor, never tracked
//! separately.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::cache::{CacheEntry, QueryCache, QueryKey, QueryOptions};
use crate::error::QueryError;

/// One fetched slice of a paginated resource. `next` is the opaque cursor
/// (here: the next-page URL) or `None` on the last page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  pub results: Vec<T>,
  pub next: Option<String>,
}

type PageLoader<T> = Arc<dyn Fn(String) -> BoxFuture<'static, Result<Page<T>, QueryError>> + Send + Sync>;

/// Paginated fetch controller.
///
/// `fetch_initial` loads page 0 through the cache (so it gets request
/// de-duplication and stale-while-revalidate); `fetch_more` appends pages,
/// passing each page the cursor produced by the previous one.
pub struct InfiniteQuery<T> {
  cache: QueryCache,
  key: QueryKey,
  options: QueryOptions,
  first_page_url: String,
  loader: PageLoader<T>,
  fetching_more: Arc<AtomicBool>,
}

impl<T> Clone for InfiniteQuery<T> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      key: self.key.clone(),
      options: self.options.clone(),
      first_page_url: self.first_page_url.clone(),
      loader: Arc::clone(&self.loader),
      fetching_more: Arc::clone(&self.fetching_more),
    }
  }
}

impl<T> InfiniteQuery<T>
where
  T: Serialize + DeserializeOwned + Send + 'static,
{
  /// `loader` fetches one page given a cursor; page 0 uses
  /// `first_page_url` as its cursor.
  pub fn new<F, Fut>(
    cache: QueryCache,
    key: QueryKey,
    options: QueryOptions,
    first_page_url: impl Into<String>,
    loader: F,
  ) -> Self
  where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Page<T>, QueryError>> + Send + 'static,
  {
    Self {
      cache,
      key,
      options,
      first_page_url: first_page_url.into(),
      loader: Arc::new(move |url| loader(url).boxed()),
      fetching_more: Arc::new(AtomicBool::new(false)),
    }
  }

  /// Load page 0 (or return the cached page list per the cache's
  /// staleness policy).
  pub async fn fetch_initial(&self) -> Result<Vec<Page<T>>, QueryError> {
    let loader = Arc::clone(&self.loader);
    let url = self.first_page_url.clone();
    self
      .cache
      .fetch::<Vec<Page<T>>, _, _>(&self.key, &self.options, move || async move {
        let page = loader(url).await?;
        Ok(vec![page])
      })
      .await
  }

  /// Fetch the next page and append it.
  ///
  /// Returns `Ok(false)` without issuing a request when there is no next
  /// cursor or a fetch is already in flight. A failed page load leaves the
  /// accumulated pages untouched; the error is returned to the caller.
  pub async fn fetch_more(&self) -> Result<bool, QueryError> {
    let cursor = match self.next_cursor() {
      Some(c) => c,
      None => return Ok(false),
    };
    if self.cache.get(&self.key).is_fetching() {
      return Ok(false);
    }
    if self
      .fetching_more
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      return Ok(false);
    }

    debug!(key = %self.key, cursor = %cursor, "fetching next page");
    let result = (self.loader)(cursor).await;
    let outcome = match result {
      Ok(page) => self
        .cache
        .set_data(&self.key, |old: Option<Vec<Page<T>>>| {
          let mut pages = old.unwrap_or_default();
          pages.push(page);
          pages
        })
        .map(|_| true),
      Err(e) => Err(e),
    };
    self.fetching_more.store(false, Ordering::SeqCst);
    outcome
  }

  /// The pages accumulated so far, in fetch order.
  pub fn pages(&self) -> Vec<Page<T>> {
    self
      .cache
      .get(&self.key)
      .data_as::<Vec<Page<T>>>()
      .ok()
      .flatten()
      .unwrap_or_default()
  }

  /// Whether another page exists, derived solely from the last page's
  /// cursor.
  pub fn can_fetch_more(&self) -> bool {
    self.next_cursor().is_some()
  }

  pub fn is_fetching_more(&self) -> bool {
    self.fetching_more.load(Ordering::SeqCst)
  }

  pub fn state(&self) -> CacheEntry {
    self.cache.get(&self.key)
  }

  #[allow(dead_code)]
  pub fn subscribe(&self) -> watch::Receiver<CacheEntry> {
    self.cache.subscribe(&self.key)
  }

  fn next_cursor(&self) -> Option<String> {
    self.pages().last().and_then(|p| p.next.clone())
  }
}
