//! Serde-deserializable types matching the creature API responses.
//!
//! Kept separate from domain types so the wire format can be messy while
//! domain types stay focused on what the app renders.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ApiNamedResource {
  pub name: String,
  pub url: String,
}

/// One page of the list endpoint:
/// `GET <base>/pokemon?offset=&limit=`.
#[derive(Debug, Deserialize)]
pub struct ApiCreaturePage {
  #[serde(default)]
  pub results: Vec<ApiNamedResource>,
  pub next: Option<String>,
  pub previous: Option<String>,
  #[serde(default)]
  pub count: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiSprites {
  #[serde(default)]
  pub front_default: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiForm {
  pub name: String,
}

/// Detail endpoint payload. The real response carries much more; only the
/// fields the app shows are modelled.
#[derive(Debug, Deserialize)]
pub struct ApiCreatureDetail {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub sprites: ApiSprites,
  #[serde(default)]
  pub forms: Vec<ApiForm>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_list_page() {
    let json = r#"{
      "count": 1302,
      "next": "https://pokeapi.co/api/v2/pokemon?offset=5&limit=5",
      "previous": null,
      "results": [
        {"name": "bulbasaur", "url": "https://pokeapi.co/api/v2/pokemon/1/"},
        {"name": "ivysaur", "url": "https://pokeapi.co/api/v2/pokemon/2/"}
      ]
    }"#;

    let page: ApiCreaturePage = serde_json::from_str(json).unwrap();
    assert_eq!(page.count, 1302);
    assert!(page.next.is_some());
    assert!(page.previous.is_none());
    assert_eq!(page.results[0].name, "bulbasaur");
  }

  #[test]
  fn test_parse_last_list_page() {
    let json = r#"{"count": 2, "next": null, "previous": null, "results": []}"#;
    let page: ApiCreaturePage = serde_json::from_str(json).unwrap();
    assert!(page.next.is_none());
    assert!(page.results.is_empty());
  }

  #[test]
  fn test_parse_detail_ignores_unknown_fields() {
    let json = r#"{
      "name": "bulbasaur",
      "base_experience": 64,
      "sprites": {"front_default": "https://img/1.png", "back_default": null},
      "forms": [{"name": "bulbasaur", "url": "https://pokeapi.co/api/v2/pokemon-form/1/"}],
      "abilities": []
    }"#;

    let detail: ApiCreatureDetail = serde_json::from_str(json).unwrap();
    assert_eq!(detail.forms[0].name, "bulbasaur");
    assert_eq!(detail.sprites.front_default.as_deref(), Some("https://img/1.png"));
  }
}
