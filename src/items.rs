//! In-memory item store standing in for a remote datastore.
//!
//! Reads always succeed after an artificial latency; writes fail with a
//! configurable probability, rolled from an owned seedable RNG so tests
//! can pin the behavior (probability 0.0 or 1.0, or a fixed seed).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::QueryError;

/// Snapshot of the store's list: the items plus the read timestamp
/// (unix millis), so observers can show "updated at".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemList {
  pub ts: i64,
  pub items: Vec<String>,
}

struct Inner {
  items: Vec<String>,
  rng: StdRng,
}

/// The mock store. Cloning shares the underlying list.
#[derive(Clone)]
pub struct ItemStore {
  inner: Arc<Mutex<Inner>>,
  latency: Duration,
  failure_probability: f64,
}

impl ItemStore {
  pub fn builder() -> ItemStoreBuilder {
    ItemStoreBuilder::default()
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// List the items. Always succeeds, after the configured latency.
  pub async fn list(&self) -> ItemList {
    tokio::time::sleep(self.latency).await;
    ItemList {
      ts: Utc::now().timestamp_millis(),
      items: self.lock().items.clone(),
    }
  }

  /// Append an item. Fails with the configured probability; a failed
  /// append never changes the list (the roll happens before the push).
  pub async fn append(&self, text: &str) -> Result<(), QueryError> {
    tokio::time::sleep(self.latency).await;

    let mut inner = self.lock();
    if inner.rng.random_bool(self.failure_probability) {
      debug!(input = text, "simulated write failure");
      return Err(QueryError::WriteFailed {
        message: "item was not added".to_string(),
        input: text.to_string(),
      });
    }
    inner.items.push(text.to_string());
    Ok(())
  }
}

#[derive(Default)]
pub struct ItemStoreBuilder {
  items: Vec<String>,
  latency: Option<Duration>,
  failure_probability: Option<f64>,
  seed: Option<u64>,
}

impl ItemStoreBuilder {
  pub fn items<I, S>(mut self, items: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.items = items.into_iter().map(Into::into).collect();
    self
  }

  pub fn latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  /// Probability in `[0.0, 1.0]` that an `append` is rejected.
  pub fn failure_probability(mut self, p: f64) -> Self {
    self.failure_probability = Some(p.clamp(0.0, 1.0));
    self
  }

  /// Fix the RNG seed for deterministic failure sequences in tests.
  pub fn seed(mut self, seed: u64) -> Self {
    self.seed = Some(seed);
    self
  }

  pub fn build(self) -> ItemStore {
    let rng = match self.seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_os_rng(),
    };
    ItemStore {
      inner: Arc::new(Mutex::new(Inner {
        items: self.items,
        rng,
      })),
      latency: self.latency.unwrap_or(Duration::from_millis(400)),
      failure_probability: self.failure_probability.unwrap_or(0.3),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_append_then_list() {
    let store = ItemStore::builder()
      .latency(Duration::ZERO)
      .failure_probability(0.0)
      .build();

    store.append("a").await.unwrap();
    store.append("b").await.unwrap();

    let list = store.list().await;
    assert_eq!(list.items, vec!["a", "b"]);
    assert!(list.ts > 0);
  }

  #[tokio::test]
  async fn test_forced_failure_leaves_list_untouched() {
    let store = ItemStore::builder()
      .items(["a"])
      .latency(Duration::ZERO)
      .failure_probability(1.0)
      .seed(42)
      .build();

    let err = store.append("b").await.unwrap_err();
    assert!(matches!(err, QueryError::WriteFailed { .. }));
    assert_eq!(store.list().await.items, vec!["a"]);
  }

  #[tokio::test]
  async fn test_seeded_failures_are_deterministic() {
    let run = |seed| async move {
      let store = ItemStore::builder()
        .latency(Duration::ZERO)
        .failure_probability(0.5)
        .seed(seed)
        .build();
      let mut outcomes = Vec::new();
      for i in 0..16 {
        outcomes.push(store.append(&format!("item-{i}")).await.is_ok());
      }
      outcomes
    };

    assert_eq!(run(9).await, run(9).await);
  }

  #[tokio::test]
  async fn test_list_waits_out_the_latency() {
    let store = ItemStore::builder()
      .latency(Duration::from_millis(30))
      .failure_probability(0.0)
      .build();

    let started = tokio::time::Instant::now();
    store.list().await;
    assert!(started.elapsed() >= Duration::from_millis(30));
  }
}
