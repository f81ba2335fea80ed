//! Creature API integration: wire types, domain types, HTTP client and the
//! cache-backed query façade.

pub mod api_types;
pub mod client;
pub mod queries;
pub mod types;

pub use client::DexClient;
pub use queries::DexQueries;
pub use types::{CreatureDetail, CreatureSummary};
