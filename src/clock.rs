//! World-clock read for the polled header line.

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// One reading from the world-time API. Cached, so serde both ways.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockReading {
  pub timezone: String,
  pub datetime: String,
  pub unixtime: i64,
}

impl ClockReading {
  /// Placeholder shown before the first poll resolves. Uses the local
  /// system clock; replaced as soon as a real reading arrives.
  pub fn initial(timezone: &str) -> Self {
    let now = chrono::Utc::now();
    Self {
      timezone: timezone.to_string(),
      datetime: now.to_rfc3339(),
      unixtime: now.timestamp(),
    }
  }
}

#[derive(Clone)]
pub struct ClockClient {
  http: reqwest::Client,
  base_url: String,
}

impl ClockClient {
  pub fn new(base_url: &str) -> Self {
    Self {
      http: reqwest::Client::new(),
      base_url: base_url.trim_end_matches('/').to_string(),
    }
  }

  /// `GET <base>/timezone/<tz>`. Failures surface as `Network` errors and
  /// leave the last cached reading in place (cache policy).
  pub async fn now(&self, timezone: &str) -> Result<ClockReading, QueryError> {
    let url = format!("{}/timezone/{}", self.base_url, timezone);
    let response = self
      .http
      .get(&url)
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

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_reading() {
    let json = r#"{
      "timezone": "Europe/Athens",
      "datetime": "2026-08-27T12:34:56.789+03:00",
      "unixtime": 1787777696,
      "utc_offset": "+03:00",
      "day_of_week": 4
    }"#;

    let reading: ClockReading = serde_json::from_str(json).unwrap();
    assert_eq!(reading.timezone, "Europe/Athens");
    assert_eq!(reading.unixtime, 1787777696);
  }

  #[test]
  fn test_initial_reading_has_requested_timezone() {
    let reading = ClockReading::initial("Europe/Athens");
    assert_eq!(reading.timezone, "Europe/Athens");
    assert!(reading.unixtime > 0);
  }
}
