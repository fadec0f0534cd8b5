//! Error types for `birdatlas-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A Wikidata entity id that does not match the `Q<digits>` pattern.
  /// Raised before such an id ever reaches a query string.
  #[error("invalid Wikidata entity id: {0:?}")]
  InvalidEntityId(String),

  #[error("unknown source key: {0:?}")]
  UnknownSourceKey(String),

  #[error("unexpected SPARQL result document: {0}")]
  ResultFormat(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
