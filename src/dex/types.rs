//! Domain types for the creature catalog.
//!
//! Both types pass through the cache, hence the serde derives.

use serde::{Deserialize, Serialize};

/// A creature as it appears in the paginated list. `detail_url` doubles as
/// the cache key parameter for the detail query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatureSummary {
  pub name: String,
  pub detail_url: String,
}

/// What the detail view renders: display name of the first form plus an
/// optional sprite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatureDetail {
  pub name: String,
  pub sprite_url: Option<String>,
}
