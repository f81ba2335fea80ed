//! Structured cache keys.
//!
//! A key is a static tag plus an optional parameter, compared by value.
//! Two keys are equal iff tag and parameter both are; no string hashing or
//! formatting is involved in identity.

use std::fmt;

/// Identifies one cached query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
  tag: &'static str,
  param: Option<String>,
}

impl QueryKey {
  /// A key with no parameter, e.g. `QueryKey::new("my-items")`.
  pub fn new(tag: &'static str) -> Self {
    Self { tag, param: None }
  }

  /// A parameterised key, e.g. `QueryKey::with_param("creature-detail", url)`.
  pub fn with_param(tag: &'static str, param: impl Into<String>) -> Self {
    Self {
      tag,
      param: Some(param.into()),
    }
  }

}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.param {
      Some(p) => write!(f, "{}:{}", self.tag, p),
      None => f.write_str(self.tag),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn test_key_equality() {
    assert_eq!(QueryKey::new("items"), QueryKey::new("items"));
    assert_ne!(QueryKey::new("items"), QueryKey::new("creatures"));
    assert_eq!(
      QueryKey::with_param("detail", "a"),
      QueryKey::with_param("detail", "a")
    );
    assert_ne!(
      QueryKey::with_param("detail", "a"),
      QueryKey::with_param("detail", "b")
    );
    assert_ne!(QueryKey::new("detail"), QueryKey::with_param("detail", ""));
  }

  #[test]
  fn test_key_as_map_key() {
    let mut map = HashMap::new();
    map.insert(QueryKey::with_param("detail", "url-1"), 1);
    map.insert(QueryKey::with_param("detail", "url-2"), 2);
    assert_eq!(map.get(&QueryKey::with_param("detail", "url-1")), Some(&1));
    assert_eq!(map.len(), 2);
  }

  #[test]
  fn test_display() {
    assert_eq!(QueryKey::new("time").to_string(), "time");
    assert_eq!(
      QueryKey::with_param("detail", "x").to_string(),
      "detail:x"
    );
  }
}
