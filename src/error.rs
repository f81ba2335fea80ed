//! Error taxonomy for everything that flows through the query cache.
//!
//! Errors must be `Clone`: a single in-flight load can be awaited by many
//! callers, and they all receive the same result.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
  /// A read from the network failed. Local to its cache key; previously
  /// successful data for that key is left untouched.
  #[error("network error: {0}")]
  Network(String),

  /// A write was rejected by the backing store. Carries the attempted
  /// input so the caller can tell the user what was lost.
  #[error("write failed: {message} (input: {input:?})")]
  WriteFailed { message: String, input: String },

  /// An in-flight load was cancelled or superseded before its result could
  /// be applied. Internal only: callers treat this as a silent no-op.
  #[error("query cancelled")]
  Cancelled,

  /// Serde conversion at the cache boundary failed. Cached data is stored
  /// as `serde_json::Value`, so every typed read/write goes through serde.
  #[error("data conversion error: {0}")]
  Data(String),
}

impl QueryError {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, QueryError::Cancelled)
  }

  pub(crate) fn data(err: serde_json::Error) -> Self {
    QueryError::Data(err.to_string())
  }
}
