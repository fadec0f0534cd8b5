//! Per-species enrichment records and their cache envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Biological metadata fetched from Wikidata for one species.
///
/// Every field is optional — an upstream entity may carry any subset of
/// them. An all-`None` record is still a valid, cacheable outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
  /// Display name in the configured language; see [`derive_common_name`].
  pub common_name:     Option<String>,
  pub description:     Option<String>,
  pub scientific_name: Option<String>,
  /// Image URL exactly as returned by Wikidata (may be a
  /// `Special:FilePath` indirection).
  pub original_image:  Option<String>,
  /// Image URL after redirect resolution, ready for display.
  pub image:           Option<String>,
  /// Wikipedia article in the configured language, if one exists.
  pub wikipedia:       Option<String>,
}

/// A cache entry for one BirdNET id.
///
/// `record = None` means the last fetch found no data upstream — a cached
/// negative, distinct from "never fetched" (no entry at all).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEnrichment {
  pub record:     Option<EnrichmentRecord>,
  pub expires_at: DateTime<Utc>,
}

impl CachedEnrichment {
  /// Freshness is binary: a stale entry is always refetched before use.
  pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
    self.expires_at > now
  }
}

/// Pick the display name for a species from the available Wikidata fields.
///
/// The label wins if it is present and differs from the scientific name
/// (a label equal to the scientific name means no vernacular label exists
/// in the requested language). Next preference is the alias, then the
/// scientific name itself.
pub fn derive_common_name(
  label:           Option<&str>,
  alias:           Option<&str>,
  scientific_name: Option<&str>,
) -> Option<String> {
  match (label, scientific_name) {
    (Some(l), Some(s)) if l != s => Some(l),
    (Some(l), None) => Some(l),
    _ => alias.or(scientific_name),
  }
  .map(str::to_owned)
}
