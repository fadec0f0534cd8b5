//! Error type for `birdatlas-pipeline`.

use birdatlas_core::source::SourceKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Network-level failure: connect, timeout, TLS, non-2xx status.
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),

  /// The upstream answered, but not in the shape we expect.
  #[error("unexpected upstream response: {0}")]
  UpstreamFormat(String),

  #[error("no snapshot stored for source {0}")]
  SnapshotMissing(SourceKey),

  #[error("unknown mapping step: {0:?}")]
  UnknownStep(String),

  /// The throttle's persistence medium is unusable — a configuration
  /// error, never silently skipped.
  #[error("throttle error: {0}")]
  Throttle(String),

  #[error("core error: {0}")]
  Core(#[from] birdatlas_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a backend error into [`Error::Store`].
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Error::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
