//! The per-species enrichment cache.
//!
//! Sits in front of the Wikidata query service: every fetch passes through
//! one shared cross-process throttle, fresh cache hits short-circuit
//! before any network call, and every successful fetch (including "no data
//! found") is re-cached with a jittered expiry so a whole installation
//! never refreshes at once.

use std::time::Duration;

use birdatlas_core::{
  enrichment::{CachedEnrichment, EnrichmentRecord, derive_common_name},
  entity::EntityId,
  sparql::{Binding, bound_value},
  store::TaxonomyStore,
};
use chrono::{DateTime, Utc};
use rand::Rng as _;

use crate::{
  Error, Result, image::ImageResolver, sparql::SparqlClient,
  throttle::FileThrottle,
};

/// All Wikidata calls share this throttle namespace — the limit protects
/// the upstream service, not any one species.
pub const THROTTLE_NAMESPACE: &str = "wikidata";

const ENTITY_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables sourced from configuration.
#[derive(Debug, Clone)]
pub struct CacheOptions {
  /// Two-letter language code for labels, aliases and Wikipedia links.
  pub language: String,
  /// Lower bound of the expiry jitter window.
  pub ttl_min:  Duration,
  /// Upper bound of the expiry jitter window.
  pub ttl_max:  Duration,
}

impl Default for CacheOptions {
  fn default() -> Self {
    Self {
      language: "en".to_owned(),
      ttl_min:  Duration::from_secs(7 * 24 * 60 * 60),
      ttl_max:  Duration::from_secs(14 * 24 * 60 * 60),
    }
  }
}

pub struct EnrichmentCache<S> {
  store:    S,
  sparql:   SparqlClient,
  throttle: FileThrottle,
  images:   ImageResolver,
  options:  CacheOptions,
}

impl<S: TaxonomyStore> EnrichmentCache<S> {
  pub fn new(
    store: S,
    sparql: SparqlClient,
    throttle: FileThrottle,
    options: CacheOptions,
  ) -> Result<Self> {
    Ok(Self { store, sparql, throttle, images: ImageResolver::new()?, options })
  }

  /// The cache entry for `birdnet_id`, fresh or stale, if one exists.
  pub async fn get_cached(
    &self,
    birdnet_id: u32,
  ) -> Result<Option<CachedEnrichment>> {
    self
      .store
      .get_cached_enrichment(birdnet_id)
      .await
      .map_err(Error::store)
  }

  /// Return the enrichment record for `birdnet_id`, fetching from
  /// Wikidata and re-caching unless a fresh entry already exists.
  ///
  /// `Ok(None)` means Wikidata has no data for the entity — a valid,
  /// cached outcome. Transport and format failures are errors and are
  /// never written to the cache.
  pub async fn fetch_and_refresh(
    &self,
    birdnet_id: u32,
    qid: &str,
  ) -> Result<Option<EnrichmentRecord>> {
    // Validate before any throttle wait or network traffic.
    let qid: EntityId = qid.parse()?;

    self.throttle.wait_until_allowed().await?;

    if let Some(entry) = self.get_cached(birdnet_id).await? {
      if entry.is_fresh(Utc::now()) {
        return Ok(entry.record);
      }
    }

    let query = entity_query(&qid, &self.options.language);
    let doc = self.sparql.get_results(&query, ENTITY_QUERY_TIMEOUT).await?;

    let record = match doc.results.bindings.first() {
      Some(binding) => Some(self.build_record(binding).await),
      None => None,
    };

    let expires_at =
      jittered_expiry(Utc::now(), self.options.ttl_min, self.options.ttl_max);
    self
      .store
      .put_cached_enrichment(birdnet_id, record.clone(), expires_at)
      .await
      .map_err(Error::store)?;
    tracing::debug!(birdnet_id, %expires_at, "enrichment cache refreshed");

    Ok(record)
  }

  async fn build_record(&self, binding: &Binding) -> EnrichmentRecord {
    let scientific_name =
      bound_value(binding, "scientificName").map(str::to_owned);
    let common_name = derive_common_name(
      bound_value(binding, "itemLabel"),
      bound_value(binding, "alias"),
      scientific_name.as_deref(),
    );

    let original_image = bound_value(binding, "image").map(str::to_owned);
    let image = match &original_image {
      Some(url) => Some(self.images.resolve_special_file_path(url).await),
      None => None,
    };

    EnrichmentRecord {
      common_name,
      description: bound_value(binding, "itemDescription").map(str::to_owned),
      scientific_name,
      original_image,
      image,
      wikipedia: bound_value(binding, "wikipedia").map(str::to_owned),
    }
  }
}

// ─── Query construction ──────────────────────────────────────────────────────

/// Keep only characters that can appear in a BCP 47 language tag; fall
/// back to English for degenerate input. The tag is interpolated into
/// query text, so it gets the same treatment as any other identifier.
fn language_tag(language: &str) -> String {
  let tag: String = language
    .chars()
    .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
    .collect();
  if tag.is_empty() { "en".to_owned() } else { tag }
}

/// Per-entity enrichment query: scientific name, description, an
/// alternate label in the requested language distinct from the scientific
/// name, an image, and the language's Wikipedia article.
fn entity_query(qid: &EntityId, language: &str) -> String {
  let lang = language_tag(language);
  format!(
    "SELECT ?itemLabel ?itemDescription ?scientificName ?alias ?image ?wikipedia WHERE {{
    BIND(wd:{qid} AS ?item)
    OPTIONAL {{ ?item wdt:P225 ?scientificName. }}
    OPTIONAL {{
        SELECT ?alias WHERE {{
            wd:{qid} skos:altLabel ?alias .
            FILTER(LANG(?alias) = \"{lang}\")
            OPTIONAL {{ wd:{qid} wdt:P225 ?scientificName. }}
            FILTER(?alias != ?scientificName)
        }}
        LIMIT 1
    }}
    OPTIONAL {{ ?item wdt:P18 ?image. }}
    OPTIONAL {{
        ?wikipedia schema:about ?item;
            schema:isPartOf <https://{lang}.wikipedia.org/>.
    }}
    SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"{lang},en\". }}
}}
LIMIT 1",
  )
}

/// Expiry uniformly drawn from `[now + ttl_min, now + ttl_max]` so cache
/// entries written together do not all expire together.
fn jittered_expiry(
  now: DateTime<Utc>,
  ttl_min: Duration,
  ttl_max: Duration,
) -> DateTime<Utc> {
  let min_secs = ttl_min.as_secs();
  let max_secs = ttl_max.as_secs().max(min_secs);
  let jitter = if max_secs > min_secs {
    rand::rng().random_range(min_secs..=max_secs)
  } else {
    min_secs
  };
  now + chrono::Duration::seconds(jitter as i64)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn entity_query_binds_the_requested_entity() {
    let qid: EntityId = "Q25334".parse().unwrap();
    let query = entity_query(&qid, "fr");
    assert!(query.contains("BIND(wd:Q25334 AS ?item)"));
    assert!(query.contains("LANG(?alias) = \"fr\""));
    assert!(query.contains("https://fr.wikipedia.org/"));
    assert!(query.contains("wikibase:language \"fr,en\""));
  }

  #[test]
  fn degenerate_language_tags_fall_back_to_english() {
    assert_eq!(language_tag("fr"), "fr");
    assert_eq!(language_tag("pt-br"), "pt-br");
    assert_eq!(language_tag("\"} harmful {"), "harmful");
    assert_eq!(language_tag("!!"), "en");
  }

  #[test]
  fn jittered_expiry_stays_inside_the_window() {
    let now = Utc::now();
    let ttl_min = Duration::from_secs(7 * 24 * 60 * 60);
    let ttl_max = Duration::from_secs(14 * 24 * 60 * 60);
    for _ in 0..200 {
      let expires = jittered_expiry(now, ttl_min, ttl_max);
      assert!(expires >= now + chrono::Duration::days(7));
      assert!(expires <= now + chrono::Duration::days(14));
    }
  }

  #[test]
  fn jittered_expiry_with_equal_bounds_is_exact() {
    let now = Utc::now();
    let ttl = Duration::from_secs(3600);
    assert_eq!(
      jittered_expiry(now, ttl, ttl),
      now + chrono::Duration::seconds(3600)
    );
  }
}
