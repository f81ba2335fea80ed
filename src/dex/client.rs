//! HTTP client for the creature API.

use color_eyre::{eyre::eyre, Result};
use tracing::debug;
use url::Url;

use super::api_types::{ApiCreatureDetail, ApiCreaturePage};
use super::types::{CreatureDetail, CreatureSummary};
use crate::error::QueryError;
use crate::query::Page;

/// Thin reqwest wrapper. Fetch methods map transport and decode failures
/// to [`QueryError::Network`] so results can flow through the cache.
#[derive(Clone)]
pub struct DexClient {
  http: reqwest::Client,
  base_url: Url,
  page_size: u32,
}

impl DexClient {
  pub fn new(base_url: &str, page_size: u32) -> Result<Self> {
    let base_url = Url::parse(base_url)
      .map_err(|e| eyre!("Invalid creature API base url {}: {}", base_url, e))?;
    Ok(Self {
      http: reqwest::Client::new(),
      base_url,
      page_size,
    })
  }

  /// URL of page 0 of the list endpoint.
  pub fn first_page_url(&self) -> String {
    format!(
      "{}/pokemon?offset=0&limit={}",
      self.base_url.as_str().trim_end_matches('/'),
      self.page_size
    )
  }

  /// Fetch one list page. `url` is either `first_page_url()` or the `next`
  /// cursor of a previous page.
  pub async fn list_page(&self, url: &str) -> Result<Page<CreatureSummary>, QueryError> {
    let page: ApiCreaturePage = self.get_json(url).await?;
    debug!(
      total = page.count,
      fetched = page.results.len(),
      has_previous = page.previous.is_some(),
      "fetched creature page"
    );
    Ok(Page {
      results: page
        .results
        .into_iter()
        .map(|r| CreatureSummary {
          name: r.name,
          detail_url: r.url,
        })
        .collect(),
      next: page.next,
    })
  }

  /// Fetch the detail payload a list entry points at.
  pub async fn detail(&self, url: &str) -> Result<CreatureDetail, QueryError> {
    let detail: ApiCreatureDetail = self.get_json(url).await?;
    let name = detail
      .forms
      .first()
      .map(|f| f.name.clone())
      .unwrap_or(detail.name);
    Ok(CreatureDetail {
      name,
      sprite_url: detail.sprites.front_default,
    })
  }

  async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, QueryError> {
    let response = self
      .http
      .get(url)
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| QueryError::Network(format!("GET {}: {}", url, e)))?;
    response
      .json()
      .await
      .map_err(|e| QueryError::Network(format!("decoding {}: {}", url, e)))
  }
}
