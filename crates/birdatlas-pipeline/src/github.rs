//! Minimal GitHub API client: latest commit metadata for a file path, plus
//! raw file download.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{Error, Result, USER_AGENT};

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Version metadata for a file source: the newest commit touching it.
#[derive(Debug, Clone)]
pub struct CommitInfo {
  pub sha:  String,
  pub date: DateTime<Utc>,
}

#[derive(Deserialize)]
struct CommitEntry {
  sha:    String,
  commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
  committer: Option<CommitActor>,
}

#[derive(Deserialize)]
struct CommitActor {
  date: DateTime<Utc>,
}

pub struct GithubClient {
  http: reqwest::Client,
}

impl GithubClient {
  pub fn new() -> Result<Self> {
    let http = reqwest::Client::builder()
      .user_agent(USER_AGENT)
      .timeout(API_TIMEOUT)
      .build()?;
    Ok(Self { http })
  }

  /// The newest commit that touched `path` in `repo` (`owner/name`).
  pub async fn latest_commit(
    &self,
    repo: &str,
    path: &str,
  ) -> Result<CommitInfo> {
    let url = format!("https://api.github.com/repos/{repo}/commits");
    let body = self
      .http
      .get(&url)
      .query(&[("path", path), ("per_page", "1")])
      .send()
      .await?
      .error_for_status()?
      .text()
      .await?;
    parse_latest_commit(&body)
  }

  /// Download a raw file body.
  pub async fn raw_file(&self, url: &str) -> Result<String> {
    let body = self
      .http
      .get(url)
      .send()
      .await?
      .error_for_status()?
      .text()
      .await?;
    Ok(body)
  }
}

fn parse_latest_commit(body: &str) -> Result<CommitInfo> {
  let entries: Vec<CommitEntry> = serde_json::from_str(body)
    .map_err(|e| Error::UpstreamFormat(format!("commit history: {e}")))?;
  let entry = entries
    .into_iter()
    .next()
    .ok_or_else(|| Error::UpstreamFormat("commit history is empty".into()))?;
  let date = entry
    .commit
    .committer
    .map(|c| c.date)
    .ok_or_else(|| {
      Error::UpstreamFormat("commit has no committer date".into())
    })?;
  Ok(CommitInfo { sha: entry.sha, date })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_commit_sha_and_date() {
    let body = r#"[
      {
        "sha": "f00dcafe",
        "commit": { "committer": { "date": "2025-03-01T10:00:00Z" } }
      }
    ]"#;
    let info = parse_latest_commit(body).unwrap();
    assert_eq!(info.sha, "f00dcafe");
    assert_eq!(info.date.to_rfc3339(), "2025-03-01T10:00:00+00:00");
  }

  #[test]
  fn empty_history_is_a_format_error() {
    assert!(matches!(
      parse_latest_commit("[]"),
      Err(Error::UpstreamFormat(_))
    ));
  }

  #[test]
  fn missing_committer_is_a_format_error() {
    let body = r#"[ { "sha": "f00d", "commit": {} } ]"#;
    assert!(matches!(
      parse_latest_commit(body),
      Err(Error::UpstreamFormat(_))
    ));
  }
}
