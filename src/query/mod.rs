//! Controllers layered on the query cache: infinite pagination, optimistic
//! mutations, and interval polling.

mod infinite;
mod mutation;
mod poll;

pub use infinite::{InfiniteQuery, Page};
pub use mutation::{MutationController, MutationOutcome};
pub use poll::Poller;
