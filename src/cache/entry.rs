//! Cache entry snapshots.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::QueryError;

/// The lifecycle status of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// Never fetched.
  Idle,
  /// First fetch in progress, no data yet.
  Loading,
  /// Has data. A background refetch may still be running (`is_refetching`)
  /// and a later read failure may be recorded alongside the data.
  Success,
  /// First fetch failed, no data.
  Error,
}

/// A point-in-time snapshot of one cached query.
///
/// Invariants: `Success` implies `data` is present, `Error` implies `error`
/// is present. Observers only ever see whole snapshots; all mutation goes
/// through [`QueryCache`](super::QueryCache).
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub status: QueryStatus,
  pub data: Option<Value>,
  pub error: Option<QueryError>,
  pub last_updated_at: Option<DateTime<Utc>>,
  pub is_refetching: bool,
  pub(crate) stale: bool,
}

impl CacheEntry {
  pub(crate) fn idle() -> Self {
    Self {
      status: QueryStatus::Idle,
      data: None,
      error: None,
      last_updated_at: None,
      is_refetching: false,
      stale: false,
    }
  }

  /// Deserialize the cached data, if any.
  pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, QueryError> {
    match &self.data {
      Some(v) => serde_json::from_value(v.clone())
        .map(Some)
        .map_err(QueryError::data),
      None => Ok(None),
    }
  }

  /// Whether a load is in progress for this entry, either the first one or
  /// a background refetch.
  pub fn is_fetching(&self) -> bool {
    self.status == QueryStatus::Loading || self.is_refetching
  }

  pub(crate) fn is_fresh(&self, stale_time: std::time::Duration, now: DateTime<Utc>) -> bool {
    if self.status != QueryStatus::Success || self.stale {
      return false;
    }
    match self.last_updated_at {
      Some(at) => {
        let age = now.signed_duration_since(at);
        age < chrono::Duration::from_std(stale_time).unwrap_or(chrono::Duration::MAX)
      }
      None => false,
    }
  }

  pub(crate) fn apply_success(&mut self, value: Value, now: DateTime<Utc>) {
    self.status = QueryStatus::Success;
    self.data = Some(value);
    self.error = None;
    self.last_updated_at = Some(now);
    self.is_refetching = false;
    self.stale = false;
  }

  /// Record a read failure. Previously-successful data is kept visible;
  /// only an entry with no data lands in `Error`.
  pub(crate) fn apply_error(&mut self, err: QueryError) {
    if self.data.is_some() {
      self.status = QueryStatus::Success;
    } else {
      self.status = QueryStatus::Error;
    }
    self.error = Some(err);
    self.is_refetching = false;
  }
}
