//! Cross-process request throttling via a per-namespace stamp file.
//!
//! Multiple independent processes (or tasks) coordinate through the
//! filesystem: the stamp file records when the last permit was granted for
//! a namespace, and [`FileThrottle::wait_until_allowed`] blocks until the
//! configured minimum gap has elapsed since then.

use std::{
  fs,
  path::{Path, PathBuf},
  time::Duration,
};

use chrono::{DateTime, Utc};

use crate::{Error, Result};

/// A file-backed throttle enforcing a minimum delay between permits for a
/// named resource, across all processes sharing the stamp directory.
#[derive(Debug, Clone)]
pub struct FileThrottle {
  namespace:     String,
  minimal_delay: chrono::Duration,
  directory:     PathBuf,
}

impl FileThrottle {
  /// Create a throttle for `namespace`. The stamp directory must already
  /// exist; a missing directory is a configuration error, not something to
  /// silently work around.
  pub fn new(
    namespace: impl Into<String>,
    minimal_delay: Duration,
    directory: impl Into<PathBuf>,
  ) -> Result<Self> {
    let directory = directory.into();
    if !directory.is_dir() {
      return Err(Error::Throttle(format!(
        "throttle directory does not exist: {}",
        directory.display()
      )));
    }
    let minimal_delay = chrono::Duration::from_std(minimal_delay)
      .map_err(|_| Error::Throttle("minimal delay out of range".into()))?;
    Ok(Self { namespace: namespace.into(), minimal_delay, directory })
  }

  fn stamp_path(&self) -> PathBuf {
    self
      .directory
      .join(format!("throttle_{}.stamp", self.namespace))
  }

  /// When the last permit was granted, if a readable stamp exists. An
  /// absent or unreadable stamp means "not recently used".
  fn last_permit(path: &Path) -> Option<DateTime<Utc>> {
    let raw = fs::read_to_string(path).ok()?;
    DateTime::parse_from_rfc3339(raw.trim())
      .map(|dt| dt.with_timezone(&Utc))
      .ok()
  }

  fn remaining(&self, now: DateTime<Utc>) -> Duration {
    match Self::last_permit(&self.stamp_path()) {
      Some(last) => (last + self.minimal_delay - now)
        .to_std()
        .unwrap_or(Duration::ZERO),
      None => Duration::ZERO,
    }
  }

  /// Block until the minimum gap since the last permit has elapsed, then
  /// record "now" as the new last-permit time.
  ///
  /// The remaining time is recomputed after every sleep rather than
  /// trusted once: another process may have taken a permit while we slept,
  /// pushing the deadline out.
  pub async fn wait_until_allowed(&self) -> Result<()> {
    loop {
      let left = self.remaining(Utc::now());
      if left.is_zero() {
        break;
      }
      tokio::time::sleep(left).await;
    }

    fs::write(self.stamp_path(), Utc::now().to_rfc3339()).map_err(|e| {
      Error::Throttle(format!(
        "cannot write stamp for namespace {:?}: {e}",
        self.namespace
      ))
    })
  }
}
