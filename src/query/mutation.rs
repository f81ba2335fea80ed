//! Optimistic mutations with rollback.
//!
//! Protocol for one `mutate(input)` call, in order:
//! 1. cancel any in-flight read for the target key, so a late response
//!    cannot clobber the speculative value
//! 2. snapshot the current entry
//! 3. apply the speculative update locally
//! 4. run the write
//! 5. on failure, restore the snapshot exactly and surface `WriteFailed`
//! 6. on settlement either way, invalidate the key and refetch it from the
//!    authoritative source
//!
//! The optimistic value is therefore never silently dropped: exactly one
//! of commit-via-refetch or rollback happens.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, QueryCache, QueryKey};
use crate::error::QueryError;

/// How a mutation resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
  Committed,
  RolledBack,
}

/// Book-keeping for one in-progress mutation. Created at submit time,
/// resolved when the write settles, never kept around afterwards.
struct PendingMutation {
  input: String,
  snapshot_before: CacheEntry,
}

impl PendingMutation {
  fn resolve(self, key: &QueryKey, outcome: MutationOutcome) {
    debug!(key = %key, input = %self.input, ?outcome, "mutation resolved");
  }
}

type WriteFn<In> = Arc<dyn Fn(In) -> BoxFuture<'static, Result<(), QueryError>> + Send + Sync>;
type RefetchFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync>;
type ApplyFn<T, In> = Arc<dyn Fn(Option<T>, &In) -> T + Send + Sync>;

/// Controller for optimistic writes against one cache key.
///
/// `write` performs the actual mutation, `refetch` reads the authoritative
/// value back (used at settlement), and `apply` computes the speculative
/// cache value from the previous data and the input.
pub struct MutationController<T, In> {
  cache: QueryCache,
  key: QueryKey,
  write: WriteFn<In>,
  refetch: RefetchFn<T>,
  apply: ApplyFn<T, In>,
}

impl<T, In> Clone for MutationController<T, In> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      key: self.key.clone(),
      write: Arc::clone(&self.write),
      refetch: Arc::clone(&self.refetch),
      apply: Arc::clone(&self.apply),
    }
  }
}

impl<T, In> MutationController<T, In>
where
  T: Serialize + DeserializeOwned + Send + 'static,
  In: Clone + fmt::Display + Send + Sync + 'static,
{
  pub fn new<W, WFut, R, RFut, A>(
    cache: QueryCache,
    key: QueryKey,
    write: W,
    refetch: R,
    apply: A,
  ) -> Self
  where
    W: Fn(In) -> WFut + Send + Sync + 'static,
    WFut: Future<Output = Result<(), QueryError>> + Send + 'static,
    R: Fn() -> RFut + Send + Sync + 'static,
    RFut: Future<Output = Result<T, QueryError>> + Send + 'static,
    A: Fn(Option<T>, &In) -> T + Send + Sync + 'static,
  {
    Self {
      cache,
      key,
      write: Arc::new(move |input| write(input).boxed()),
      refetch: Arc::new(move || refetch().boxed()),
      apply: Arc::new(apply),
    }
  }

  /// Run one optimistic mutation.
  ///
  /// Returns after the write *and* the settlement refetch have completed,
  /// so on `Ok` the cache holds the authoritative post-write value and on
  /// `Err` it has been rolled back and re-reconciled.
  pub async fn mutate(&self, input: In) -> Result<MutationOutcome, QueryError> {
    self.cache.cancel(&self.key);

    let previous = self.cache.get(&self.key);
    let pending = PendingMutation {
      input: input.to_string(),
      snapshot_before: previous.clone(),
    };

    let apply = Arc::clone(&self.apply);
    let speculative_input = input.clone();
    self
      .cache
      .set_data(&self.key, move |old: Option<T>| {
        apply(old, &speculative_input)
      })?;
    debug!(key = %self.key, input = %input, "applied optimistic update");

    match (self.write)(input.clone()).await {
      Ok(()) => {
        pending.resolve(&self.key, MutationOutcome::Committed);
        self.settle().await;
        Ok(MutationOutcome::Committed)
      }
      Err(err) => {
        warn!(key = %self.key, error = %err, "write rejected, rolling back");
        self.cache.restore(&self.key, pending.snapshot_before.clone());
        pending.resolve(&self.key, MutationOutcome::RolledBack);
        self.settle().await;
        Err(match err {
          e @ QueryError::WriteFailed { .. } => e,
          other => QueryError::WriteFailed {
            message: other.to_string(),
            input: input.to_string(),
          },
        })
      }
    }
  }

  /// Invalidate and refetch so the next observer sees the authoritative
  /// value regardless of how the write went.
  async fn settle(&self) {
    self.cache.invalidate(&self.key);
    let refetch = Arc::clone(&self.refetch);
    if let Err(e) = self
      .cache
      .refetch::<T, _, _>(&self.key, move || refetch())
      .await
    {
      if !e.is_cancelled() {
        warn!(key = %self.key, error = %e, "settlement refetch failed");
      }
    }
  }
}
