//! Process-wide query cache.
//!
//! One entry per [`QueryKey`], mutated only on the runtime's logical thread
//! of control (a short-lived mutex guards the map; nothing is awaited while
//! it is held). Concurrent fetches for the same key share a single
//! in-flight load via [`futures::future::Shared`]; late results from a
//! cancelled flight are dropped by a per-entry generation check.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use super::entry::{CacheEntry, QueryStatus};
use super::key::QueryKey;
use crate::error::QueryError;

type FlightFuture = Shared<BoxFuture<'static, Result<Value, QueryError>>>;

/// Per-fetch options.
#[derive(Debug, Clone)]
pub struct QueryOptions {
  /// How long a successful result stays fresh. Within this window `fetch`
  /// returns cached data without touching the loader.
  stale_time: Duration,
  /// Value to show before the first resolution. Seeded stale, so the first
  /// real fetch still runs.
  initial_data: Option<Value>,
}

impl QueryOptions {
  pub fn new() -> Self {
    Self {
      stale_time: Duration::from_secs(60),
      initial_data: None,
    }
  }

  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn with_initial_data(mut self, value: Value) -> Self {
    self.initial_data = Some(value);
    self
  }
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self::new()
  }
}

struct Flight {
  generation: u64,
  fut: FlightFuture,
}

struct EntryState {
  entry: CacheEntry,
  /// Bumped by `cancel`. A flight only applies its result if the
  /// generation it was started under still matches.
  generation: u64,
  inflight: Option<Flight>,
  tx: watch::Sender<CacheEntry>,
}

impl EntryState {
  fn new() -> Self {
    let entry = CacheEntry::idle();
    let (tx, _rx) = watch::channel(entry.clone());
    Self {
      entry,
      generation: 0,
      inflight: None,
      tx,
    }
  }

  fn publish(&self) {
    self.tx.send_replace(self.entry.clone());
  }
}

/// Keyed cache of query results with request de-duplication and
/// stale-while-revalidate refetching.
///
/// Cloning is cheap; all clones share the same entries.
#[derive(Clone)]
pub struct QueryCache {
  inner: Arc<Mutex<HashMap<QueryKey, EntryState>>>,
}

impl QueryCache {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, EntryState>> {
    // A poisoned map only means a panic elsewhere mid-publish; the data
    // itself is still a consistent snapshot map.
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Current entry for `key`, or a fresh idle entry if none exists.
  pub fn get(&self, key: &QueryKey) -> CacheEntry {
    self
      .lock()
      .get(key)
      .map(|s| s.entry.clone())
      .unwrap_or_else(CacheEntry::idle)
  }

  /// Observe entry changes for `key`. Every mutation publishes a full
  /// snapshot; the receiver always holds the latest one.
  pub fn subscribe(&self, key: &QueryKey) -> watch::Receiver<CacheEntry> {
    let mut map = self.lock();
    ensure_state(&mut map, key).tx.subscribe()
  }

  /// Fetch through the cache.
  ///
  /// - fresh cached data: returned immediately, loader not called;
  /// - stale cached data: returned immediately while a background refetch
  ///   runs (`is_refetching` on the entry);
  /// - no data: joins the in-flight load for this key if one exists,
  ///   otherwise starts one, and awaits it.
  ///
  /// At most one loader call is outstanding per key at any instant.
  pub async fn fetch<T, F, Fut>(
    &self,
    key: &QueryKey,
    options: &QueryOptions,
    loader: F,
  ) -> Result<T, QueryError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
  {
    let (stale_data, flight) = {
      let mut map = self.lock();
      let state = ensure_state(&mut map, key);
      seed_initial(state, options);

      if state.entry.is_fresh(options.stale_time, Utc::now()) {
        if let Some(v) = state.entry.data.clone() {
          return decode(v);
        }
      }

      let stale_data = state.entry.data.clone();
      let flight = match &state.inflight {
        Some(f) => f.fut.clone(),
        None => self.start_flight(key, state, loader()),
      };
      (stale_data, flight)
    };

    match stale_data {
      // Stale-while-revalidate: serve what we have, let the flight land
      // in the background.
      Some(v) => decode(v),
      None => decode(flight.await?),
    }
  }

  /// Join the in-flight load for `key` or start a new one, and await the
  /// fresh result. Ignores freshness; used by polling and by mutation
  /// settlement to reconcile with the authoritative source.
  pub async fn refetch<T, F, Fut>(&self, key: &QueryKey, loader: F) -> Result<T, QueryError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
  {
    let flight = {
      let mut map = self.lock();
      let state = ensure_state(&mut map, key);
      match &state.inflight {
        Some(f) => f.fut.clone(),
        None => self.start_flight(key, state, loader()),
      }
    };
    decode(flight.await?)
  }

  /// Synchronous local write, used for optimistic updates. The updater
  /// receives the previous data (if any) and returns the replacement.
  /// Stamps `last_updated_at`; never touches network state.
  pub fn set_data<T, F>(&self, key: &QueryKey, update: F) -> Result<(), QueryError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(Option<T>) -> T,
  {
    let mut map = self.lock();
    let state = ensure_state(&mut map, key);
    let old = match &state.entry.data {
      Some(v) => Some(serde_json::from_value(v.clone()).map_err(QueryError::data)?),
      None => None,
    };
    let new = serde_json::to_value(update(old)).map_err(QueryError::data)?;
    state.entry.apply_success(new, Utc::now());
    state.publish();
    Ok(())
  }

  /// Mark the entry stale. The next access refetches; observers are
  /// notified so active readers can do so immediately.
  pub fn invalidate(&self, key: &QueryKey) {
    let mut map = self.lock();
    if let Some(state) = map.get_mut(key) {
      state.entry.stale = true;
      state.publish();
      debug!(key = %key, "invalidated");
    }
  }

  /// Best-effort cancellation: any in-flight load for `key` keeps running,
  /// but its result will be discarded when it resolves.
  pub fn cancel(&self, key: &QueryKey) {
    let mut map = self.lock();
    if let Some(state) = map.get_mut(key) {
      state.generation += 1;
      state.inflight = None;
      if state.entry.status == QueryStatus::Loading {
        state.entry.status = QueryStatus::Idle;
      }
      state.entry.is_refetching = false;
      state.publish();
      debug!(key = %key, "cancelled in-flight load");
    }
  }

  /// Replace the entry for `key` wholesale (rollback support). The
  /// generation is untouched; pair with `cancel` when racing a read.
  pub fn restore(&self, key: &QueryKey, snapshot: CacheEntry) {
    let mut map = self.lock();
    let state = ensure_state(&mut map, key);
    state.entry = snapshot;
    state.publish();
  }

  /// Seed a configured initial value so observers see data before the
  /// first resolution. No-op unless the entry is idle.
  pub fn prime(&self, key: &QueryKey, options: &QueryOptions) {
    let mut map = self.lock();
    let state = ensure_state(&mut map, key);
    seed_initial(state, options);
  }

  fn start_flight<T, Fut>(&self, key: &QueryKey, state: &mut EntryState, fut: Fut) -> FlightFuture
  where
    T: Serialize + Send + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
  {
    let generation = state.generation;
    let cache = self.clone();
    let owned_key = key.clone();
    let flight: FlightFuture = async move {
      let result = match fut.await {
        Ok(v) => serde_json::to_value(v).map_err(QueryError::data),
        Err(e) => Err(e),
      };
      cache.apply_result(&owned_key, generation, result)
    }
    .boxed()
    .shared();

    if state.entry.data.is_some() {
      state.entry.is_refetching = true;
    } else {
      state.entry.status = QueryStatus::Loading;
    }
    state.publish();
    state.inflight = Some(Flight {
      generation,
      fut: flight.clone(),
    });
    debug!(key = %key, generation, "started load");

    // Drive the flight to completion even if every caller drops.
    tokio::spawn(flight.clone());
    flight
  }

  /// Apply a settled flight. Last applicable writer wins: a result whose
  /// generation no longer matches is dropped, not applied.
  fn apply_result(
    &self,
    key: &QueryKey,
    generation: u64,
    result: Result<Value, QueryError>,
  ) -> Result<Value, QueryError> {
    let mut map = self.lock();
    let state = match map.get_mut(key) {
      Some(s) => s,
      None => return Err(QueryError::Cancelled),
    };
    if state.generation != generation {
      debug!(key = %key, generation, "dropping superseded result");
      return Err(QueryError::Cancelled);
    }
    if state
      .inflight
      .as_ref()
      .is_some_and(|f| f.generation == generation)
    {
      state.inflight = None;
    }
    match result {
      Ok(v) => {
        state.entry.apply_success(v.clone(), Utc::now());
        state.publish();
        debug!(key = %key, "load succeeded");
        Ok(v)
      }
      Err(e) => {
        state.entry.apply_error(e.clone());
        state.publish();
        debug!(key = %key, error = %e, "load failed");
        Err(e)
      }
    }
  }
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new()
  }
}

fn ensure_state<'a>(
  map: &'a mut HashMap<QueryKey, EntryState>,
  key: &QueryKey,
) -> &'a mut EntryState {
  map.entry(key.clone()).or_insert_with(EntryState::new)
}

fn seed_initial(state: &mut EntryState, options: &QueryOptions) {
  if state.entry.status != QueryStatus::Idle {
    return;
  }
  if let Some(initial) = &options.initial_data {
    state.entry.apply_success(initial.clone(), Utc::now());
    state.entry.stale = true;
    state.publish();
  }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, QueryError> {
  serde_json::from_value(value).map_err(QueryError::data)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn key() -> QueryKey {
    QueryKey::new("test")
  }

  #[tokio::test]
  async fn test_set_data_round_trip_is_synchronous() {
    let cache = QueryCache::new();
    cache
      .set_data(&key(), |old: Option<Vec<String>>| {
        let mut items = old.unwrap_or_default();
        items.push("a".to_string());
        items
      })
      .unwrap();

    // Visible immediately, before any task gets to run.
    let entry = cache.get(&key());
    assert_eq!(entry.status, QueryStatus::Success);
    assert_eq!(
      entry.data_as::<Vec<String>>().unwrap(),
      Some(vec!["a".to_string()])
    );
  }

  #[tokio::test]
  async fn test_overlapping_fetches_share_one_request() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    let opts = QueryOptions::new();

    let loader = |calls: Arc<AtomicU32>| {
      move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, QueryError>(vec![1, 2, 3])
      }
    };

    let first = {
      let cache = cache.clone();
      let opts = opts.clone();
      let loader = loader(calls.clone());
      tokio::spawn(async move { cache.fetch::<Vec<i32>, _, _>(&key(), &opts, loader).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = cache
      .fetch::<Vec<i32>, _, _>(&key(), &opts, loader(calls.clone()))
      .await
      .unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fresh_data_skips_loader() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicU32::new(0));
    cache.set_data(&key(), |_: Option<i32>| 7).unwrap();

    let calls2 = calls.clone();
    let got = cache
      .fetch::<i32, _, _>(&key(), &QueryOptions::new(), move || async move {
        calls2.fetch_add(1, Ordering::SeqCst);
        Ok(8)
      })
      .await
      .unwrap();

    assert_eq!(got, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_stale_while_revalidate() {
    let cache = QueryCache::new();
    cache.set_data(&key(), |_: Option<i32>| 1).unwrap();
    cache.invalidate(&key());

    // Stale data comes back immediately while the refetch runs.
    let got = cache
      .fetch::<i32, _, _>(&key(), &QueryOptions::new(), || async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(2)
      })
      .await
      .unwrap();
    assert_eq!(got, 1);
    assert!(cache.get(&key()).is_refetching);

    tokio::time::sleep(Duration::from_millis(60)).await;
    let entry = cache.get(&key());
    assert!(!entry.is_refetching);
    assert_eq!(entry.data_as::<i32>().unwrap(), Some(2));
  }

  #[tokio::test]
  async fn test_read_error_keeps_previous_data() {
    let cache = QueryCache::new();
    cache.set_data(&key(), |_: Option<i32>| 1).unwrap();
    cache.invalidate(&key());

    let got = cache
      .fetch::<i32, _, _>(&key(), &QueryOptions::new(), || async {
        Err(QueryError::Network("down".into()))
      })
      .await
      .unwrap();
    assert_eq!(got, 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let entry = cache.get(&key());
    assert_eq!(entry.status, QueryStatus::Success);
    assert_eq!(entry.data_as::<i32>().unwrap(), Some(1));
    assert_eq!(entry.error, Some(QueryError::Network("down".into())));
  }

  #[tokio::test]
  async fn test_cancel_discards_late_result() {
    let cache = QueryCache::new();
    let handle = {
      let cache = cache.clone();
      tokio::spawn(async move {
        cache
          .fetch::<i32, _, _>(&key(), &QueryOptions::new(), || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(42)
          })
          .await
      })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.cancel(&key());

    let result = handle.await.unwrap();
    assert_eq!(result, Err(QueryError::Cancelled));

    // Even after the loader resolves, nothing is applied.
    tokio::time::sleep(Duration::from_millis(60)).await;
    let entry = cache.get(&key());
    assert_eq!(entry.status, QueryStatus::Idle);
    assert!(entry.data.is_none());
  }

  #[tokio::test]
  async fn test_initial_data_visible_before_first_resolution() {
    let cache = QueryCache::new();
    let opts = QueryOptions::new().with_initial_data(serde_json::json!("default"));
    cache.prime(&key(), &opts);

    let entry = cache.get(&key());
    assert_eq!(entry.status, QueryStatus::Success);
    assert_eq!(entry.data_as::<String>().unwrap(), Some("default".into()));

    // First fetch serves the seeded value and refreshes in the background.
    let got = cache
      .fetch::<String, _, _>(&key(), &opts, || async { Ok("real".to_string()) })
      .await
      .unwrap();
    assert_eq!(got, "default");

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
      cache.get(&key()).data_as::<String>().unwrap(),
      Some("real".into())
    );
  }

  #[tokio::test]
  async fn test_errors_are_local_to_their_key() {
    let cache = QueryCache::new();
    let other = QueryKey::new("other");
    cache.set_data(&other, |_: Option<i32>| 5).unwrap();

    let result = cache
      .fetch::<i32, _, _>(&key(), &QueryOptions::new(), || async {
        Err(QueryError::Network("down".into()))
      })
      .await;
    assert!(result.is_err());

    let entry = cache.get(&other);
    assert_eq!(entry.status, QueryStatus::Success);
    assert!(entry.error.is_none());
  }
}
