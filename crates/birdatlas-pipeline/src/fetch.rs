//! Fetching source content with provenance, and refreshing stored
//! snapshots.

use std::time::Duration;

use birdatlas_core::{
  source::{FetchSpec, Source, SourceKey, SourceSnapshot},
  store::TaxonomyStore,
};
use chrono::{DateTime, Utc};

use crate::{
  Error, Result, github::GithubClient, sparql::SparqlClient,
};

/// Full-export SPARQL queries are slow; give them plenty of time.
const SPARQL_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Anything shorter than this cannot be a real result document.
const MIN_RESULT_LEN: usize = 10;

/// Raw content plus provenance for one fetch.
#[derive(Debug, Clone)]
pub struct Fetched {
  pub content:       String,
  pub version_token: Option<String>,
  pub version_date:  Option<DateTime<Utc>>,
}

/// Local-vs-remote freshness for the CLI status table.
#[derive(Debug, Clone)]
pub struct SourceStatus {
  pub key:          SourceKey,
  pub label:        &'static str,
  pub local_token:  Option<String>,
  pub local_date:   Option<DateTime<Utc>>,
  pub fetched_at:   Option<DateTime<Utc>>,
  pub remote_token: Option<String>,
  pub remote_date:  Option<DateTime<Utc>>,
  /// True when both local and remote versions are known and differ.
  pub is_new:       bool,
}

pub struct SourceFetcher {
  github: GithubClient,
  sparql: SparqlClient,
}

impl SourceFetcher {
  pub fn new(sparql_endpoint: &str) -> Result<Self> {
    Ok(Self {
      github: GithubClient::new()?,
      sparql: SparqlClient::new(sparql_endpoint)?,
    })
  }

  /// Retrieve content and provenance for `source`.
  ///
  /// For file sources the commit lookup runs first and a failure there
  /// fails the whole fetch: content is never stored without the version
  /// metadata tying it to its origin.
  pub async fn fetch(&self, source: &Source) -> Result<Fetched> {
    match source.fetch {
      FetchSpec::GithubFile { repo, path, raw_url } => {
        let commit = self.github.latest_commit(repo, path).await?;
        let content = self.github.raw_file(raw_url).await?;
        Ok(Fetched {
          content,
          version_token: Some(commit.sha),
          version_date: Some(commit.date),
        })
      }
      FetchSpec::Sparql { query } => {
        let content = self.sparql.get(query, SPARQL_FETCH_TIMEOUT).await?;
        if content.len() < MIN_RESULT_LEN {
          return Err(Error::UpstreamFormat(
            "SPARQL response is implausibly short".into(),
          ));
        }
        Ok(Fetched { content, version_token: None, version_date: None })
      }
    }
  }

  /// Fetch `source` and replace its stored snapshot.
  pub async fn refresh<S: TaxonomyStore>(
    &self,
    store: &S,
    source: &Source,
  ) -> Result<SourceSnapshot> {
    let fetched = self.fetch(source).await?;
    let snapshot = SourceSnapshot {
      source:        source.key,
      raw_content:   fetched.content,
      fetched_at:    Utc::now(),
      version_token: fetched.version_token,
      version_date:  fetched.version_date,
    };
    store
      .upsert_snapshot(snapshot.clone())
      .await
      .map_err(Error::store)?;
    tracing::info!(
      source = %source.key,
      bytes = snapshot.raw_content.len(),
      "source snapshot refreshed"
    );
    Ok(snapshot)
  }

  /// Compare the stored snapshot against the live remote version.
  ///
  /// A remote lookup failure degrades to "remote unknown" rather than
  /// failing the status report.
  pub async fn status<S: TaxonomyStore>(
    &self,
    store: &S,
    source: &Source,
  ) -> Result<SourceStatus> {
    let snapshot =
      store.get_snapshot(source.key).await.map_err(Error::store)?;

    let (remote_token, remote_date) = match source.fetch {
      FetchSpec::GithubFile { repo, path, .. } => {
        match self.github.latest_commit(repo, path).await {
          Ok(commit) => (Some(commit.sha), Some(commit.date)),
          Err(e) => {
            tracing::warn!(source = %source.key, error = %e,
              "could not check remote version");
            (None, None)
          }
        }
      }
      FetchSpec::Sparql { .. } => (None, None),
    };

    let local_token =
      snapshot.as_ref().and_then(|s| s.version_token.clone());
    let is_new = match (&local_token, &remote_token) {
      (Some(local), Some(remote)) => local != remote,
      _ => false,
    };

    Ok(SourceStatus {
      key: source.key,
      label: source.label,
      local_token,
      local_date: snapshot.as_ref().and_then(|s| s.version_date),
      fetched_at: snapshot.as_ref().map(|s| s.fetched_at),
      remote_token,
      remote_date,
      is_new,
    })
  }
}
