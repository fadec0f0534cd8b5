//! HTTP client for a SPARQL query service.
//!
//! Queries go out as a URL-encoded `query` parameter (GET) or form body
//! (POST), always with the product `User-Agent` and a JSON `Accept`
//! header. No retries — retry policy belongs to callers.

use std::time::Duration;

use birdatlas_core::sparql::SparqlResults;
use reqwest::header::ACCEPT;

use crate::{Result, USER_AGENT};

pub const ACCEPT_SPARQL_JSON: &str = "application/sparql-results+json";

pub struct SparqlClient {
  http:     reqwest::Client,
  endpoint: String,
}

impl SparqlClient {
  pub fn new(endpoint: impl Into<String>) -> Result<Self> {
    let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    Ok(Self { http, endpoint: endpoint.into() })
  }

  pub fn endpoint(&self) -> &str { &self.endpoint }

  /// Execute `query` via GET and return the raw response body.
  pub async fn get(&self, query: &str, timeout: Duration) -> Result<String> {
    let body = self
      .http
      .get(&self.endpoint)
      .query(&[("query", query)])
      .header(ACCEPT, ACCEPT_SPARQL_JSON)
      .timeout(timeout)
      .send()
      .await?
      .error_for_status()?
      .text()
      .await?;
    Ok(body)
  }

  /// Execute `query` via POST (form-encoded body) and return the raw
  /// response body. Preferred for large generated queries that would
  /// overflow a URL.
  pub async fn post(&self, query: &str, timeout: Duration) -> Result<String> {
    let body = self
      .http
      .post(&self.endpoint)
      .form(&[("query", query)])
      .header(ACCEPT, ACCEPT_SPARQL_JSON)
      .timeout(timeout)
      .send()
      .await?
      .error_for_status()?
      .text()
      .await?;
    Ok(body)
  }

  pub async fn get_results(
    &self,
    query: &str,
    timeout: Duration,
  ) -> Result<SparqlResults> {
    let body = self.get(query, timeout).await?;
    Ok(SparqlResults::from_json(&body)?)
  }

  pub async fn post_results(
    &self,
    query: &str,
    timeout: Duration,
  ) -> Result<SparqlResults> {
    let body = self.post(query, timeout).await?;
    Ok(SparqlResults::from_json(&body)?)
  }
}
