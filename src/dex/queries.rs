//! Cache-backed façade over the creature API.

use std::time::Duration;

use crate::cache::{QueryCache, QueryKey, QueryOptions};
use crate::error::QueryError;
use crate::query::InfiniteQuery;

use super::client::DexClient;
use super::types::{CreatureDetail, CreatureSummary};

const CREATURES_TAG: &str = "creatures";
const DETAIL_TAG: &str = "creature-detail";

/// Queries against the creature API, all going through the shared cache.
#[derive(Clone)]
pub struct DexQueries {
  cache: QueryCache,
  client: DexClient,
  list_stale_time: Duration,
  detail_stale_time: Duration,
}

impl DexQueries {
  pub fn new(
    cache: QueryCache,
    client: DexClient,
    list_stale_time: Duration,
    detail_stale_time: Duration,
  ) -> Self {
    Self {
      cache,
      client,
      list_stale_time,
      detail_stale_time,
    }
  }

  /// The paginated creature list, one cache entry holding all fetched
  /// pages.
  pub fn creatures(&self) -> InfiniteQuery<CreatureSummary> {
    let client = self.client.clone();
    InfiniteQuery::new(
      self.cache.clone(),
      QueryKey::new(CREATURES_TAG),
      QueryOptions::new().with_stale_time(self.list_stale_time),
      client.first_page_url(),
      move |url| {
        let client = client.clone();
        async move { client.list_page(&url).await }
      },
    )
  }

  /// Detail for one creature, cached per detail URL with a short stale
  /// time (details are cheap to refetch and drilled into ad hoc).
  pub async fn creature_detail(&self, detail_url: &str) -> Result<CreatureDetail, QueryError> {
    let key = QueryKey::with_param(DETAIL_TAG, detail_url);
    let options = QueryOptions::new().with_stale_time(self.detail_stale_time);
    let client = self.client.clone();
    let url = detail_url.to_string();
    self
      .cache
      .fetch(&key, &options, move || async move {
        client.detail(&url).await
      })
      .await
  }
}
