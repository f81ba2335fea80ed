//! Fixed-interval polling of one cached read.
//!
//! Ticks are wall-clock spaced and do not wait for the previous read to
//! settle; overlapping ticks collapse onto the same in-flight load through
//! the cache's de-duplication. No backoff, no jitter.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::cache::{QueryCache, QueryKey, QueryOptions};

/// Handle to a running poll loop. Aborts the loop when dropped.
pub struct Poller {
  handle: JoinHandle<()>,
}

impl Poller {
  /// Start polling `key` every `period`.
  ///
  /// If `options` carries initial data it is primed into the cache first,
  /// so observers see a value before the first tick resolves. Tick
  /// failures only log; the entry keeps its last successful value.
  pub fn start<T, F, Fut>(
    cache: QueryCache,
    key: QueryKey,
    options: QueryOptions,
    period: Duration,
    loader: F,
  ) -> Self
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, crate::error::QueryError>> + Send + 'static,
  {
    cache.prime(&key, &options);

    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let cache = cache.clone();
        let key = key.clone();
        let fut = loader();
        // Fire and forget: the next tick must not wait on this one.
        tokio::spawn(async move {
          if let Err(e) = cache.refetch::<T, _, _>(&key, move || fut).await {
            if !e.is_cancelled() {
              debug!(key = %key, error = %e, "poll tick failed");
            }
          }
        });
      }
    });

    Self { handle }
  }

  pub fn stop(&self) {
    self.handle.abort();
  }
}

impl Drop for Poller {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::QueryStatus;
  use crate::error::QueryError;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  #[tokio::test]
  async fn test_initial_value_visible_before_first_resolution() {
    let cache = QueryCache::new();
    let key = QueryKey::new("time");
    let options = QueryOptions::new().with_initial_data(serde_json::json!(0));

    let _poller = Poller::start(
      cache.clone(),
      key.clone(),
      options,
      Duration::from_secs(60),
      || async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok::<_, QueryError>(1)
      },
    );

    // No spinner: the configured default is already there.
    let entry = cache.get(&key);
    assert_eq!(entry.status, QueryStatus::Success);
    assert_eq!(entry.data_as::<i32>().unwrap(), Some(0));
  }

  #[tokio::test]
  async fn test_ticks_refresh_the_value() {
    let cache = QueryCache::new();
    let key = QueryKey::new("time");
    let counter = Arc::new(AtomicU32::new(0));

    let counter2 = counter.clone();
    let poller = Poller::start(
      cache.clone(),
      key.clone(),
      QueryOptions::new(),
      Duration::from_millis(20),
      move || {
        let counter = counter2.clone();
        async move { Ok::<_, QueryError>(counter.fetch_add(1, Ordering::SeqCst) + 1) }
      },
    );

    tokio::time::sleep(Duration::from_millis(90)).await;
    poller.stop();
    // Let the last spawned refetch land.
    tokio::time::sleep(Duration::from_millis(20)).await;

    // First tick fires immediately, then every 20ms.
    let ticks = counter.load(Ordering::SeqCst);
    assert!(ticks >= 3, "expected several ticks, got {ticks}");
    assert_eq!(cache.get(&key).data_as::<u32>().unwrap(), Some(ticks));
  }

  #[tokio::test]
  async fn test_failed_tick_keeps_last_value() {
    let cache = QueryCache::new();
    let key = QueryKey::new("time");
    cache.set_data(&key, |_: Option<i32>| 41).unwrap();

    let poller = Poller::start(
      cache.clone(),
      key.clone(),
      QueryOptions::new(),
      Duration::from_millis(15),
      || async { Err::<i32, _>(QueryError::Network("offline".into())) },
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    poller.stop();

    let entry = cache.get(&key);
    assert_eq!(entry.status, QueryStatus::Success);
    assert_eq!(entry.data_as::<i32>().unwrap(), Some(41));
  }
}
