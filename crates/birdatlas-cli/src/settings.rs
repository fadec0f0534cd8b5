//! Runtime settings, read from an optional TOML file plus `BIRDATLAS_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use birdatlas_core::source::SPARQL_ENDPOINT;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// SQLite database file.
  #[serde(default = "default_db_path")]
  pub db_path: PathBuf,

  /// Directory for cross-process throttle stamp files.
  #[serde(default = "default_throttle_dir")]
  pub throttle_dir: PathBuf,

  /// Minimum gap between Wikidata requests, shared across processes.
  #[serde(default = "default_request_interval_ms")]
  pub request_interval_ms: u64,

  /// Enrichment cache expiry jitter window, in days.
  #[serde(default = "default_cache_ttl_min_days")]
  pub cache_ttl_min_days: u64,
  #[serde(default = "default_cache_ttl_max_days")]
  pub cache_ttl_max_days: u64,

  #[serde(default = "default_sparql_endpoint")]
  pub sparql_endpoint: String,

  /// Language for common names, descriptions, and Wikipedia links.
  #[serde(default = "default_language")]
  pub language: String,
}

fn default_db_path() -> PathBuf { PathBuf::from("birdatlas.db") }

fn default_throttle_dir() -> PathBuf { std::env::temp_dir() }

fn default_request_interval_ms() -> u64 { 50 }

fn default_cache_ttl_min_days() -> u64 { 7 }

fn default_cache_ttl_max_days() -> u64 { 14 }

fn default_sparql_endpoint() -> String { SPARQL_ENDPOINT.to_owned() }

fn default_language() -> String { "en".to_owned() }

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.to_owned()).required(false))
      .add_source(config::Environment::with_prefix("BIRDATLAS"))
      .build()
      .context("failed to read configuration")?;

    settings
      .try_deserialize()
      .context("failed to deserialise settings")
  }
}
