//! Client-side query cache.
//!
//! This module provides the keyed, process-wide cache the controllers in
//! [`crate::query`] are built on:
//! - per-key status tracking (idle/loading/success/error)
//! - stale-while-revalidate refetching
//! - de-duplication of concurrent loads for the same key
//! - synchronous local writes for optimistic updates
//! - cancellation that drops late results instead of applying them

mod entry;
mod key;
mod store;

pub use entry::{CacheEntry, QueryStatus};
pub use key::QueryKey;
pub use store::{QueryCache, QueryOptions};
