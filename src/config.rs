use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub clock: ClockConfig,
  pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Base URL of the creature API.
  pub base_url: String,
  /// Page size for the paginated list.
  pub page_size: u32,
  /// How long a fetched page list stays fresh, in milliseconds.
  pub list_stale_time_ms: u64,
  /// How long a creature detail stays fresh, in milliseconds.
  pub detail_stale_time_ms: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "https://pokeapi.co/api/v2".to_string(),
      page_size: 5,
      list_stale_time_ms: 60_000,
      detail_stale_time_ms: 500,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
  pub base_url: String,
  pub timezone: String,
  /// Poll interval for the clock line, in milliseconds.
  pub poll_interval_ms: u64,
}

impl Default for ClockConfig {
  fn default() -> Self {
    Self {
      base_url: "http://worldtimeapi.org/api".to_string(),
      timezone: "Europe/Athens".to_string(),
      poll_interval_ms: 5_000,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Simulated network latency of the mock store, in milliseconds.
  pub latency_ms: u64,
  /// Probability that a write is rejected.
  pub failure_probability: f64,
  /// Fixed RNG seed for reproducible failure sequences.
  pub seed: Option<u64>,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      latency_ms: 1_000,
      failure_probability: 0.3,
      seed: None,
    }
  }
}

impl Config {
  /// Load configuration.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./dexq.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/dexq/config.yaml
  ///
  /// Unlike a credentialed client, this demo runs fine against the public
  /// endpoints, so no config file at all means built-in defaults.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("dexq.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("dexq").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}
