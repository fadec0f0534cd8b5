//! The three configured mapping sources and their fetched snapshots.
//!
//! Sources are immutable configuration, compiled in. Two are versioned text
//! files in the upstream whoBIRD repository; the third is a full SPARQL
//! export of bird taxa from Wikidata.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default SPARQL endpoint for the Wikidata query service.
pub const SPARQL_ENDPOINT: &str = "https://query.wikidata.org/sparql";

/// Full export of bird species from Wikidata: every taxon of rank species
/// descending from Aves, with its scientific name and eBird taxon id.
const WIKIDATA_SPECIES_QUERY: &str = "\
SELECT ?item ?itemLabel ?scientificName ?taxonRankLabel ?eBirdID WHERE {
    ?item wdt:P105 wd:Q7432.
    ?item wdt:P225 ?scientificName.
    OPTIONAL { ?item wdt:P3444 ?eBirdID. }
    OPTIONAL { ?item wdt:P105 ?taxonRank. }
    ?item wdt:P171* wd:Q5113.
    SERVICE wikibase:label { bd:serviceParam wikibase:language \"en\". }
}";

// ─── Keys ────────────────────────────────────────────────────────────────────

/// Identifies one of the three configured sources.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKey {
  TaxoCode,
  BirdnetSpecies,
  WikidataSpecies,
}

impl SourceKey {
  pub fn as_str(self) -> &'static str {
    match self {
      SourceKey::TaxoCode => "taxo_code",
      SourceKey::BirdnetSpecies => "birdnet_species",
      SourceKey::WikidataSpecies => "wikidata_species",
    }
  }
}

impl fmt::Display for SourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SourceKey {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "taxo_code" => Ok(SourceKey::TaxoCode),
      "birdnet_species" => Ok(SourceKey::BirdnetSpecies),
      "wikidata_species" => Ok(SourceKey::WikidataSpecies),
      other => Err(Error::UnknownSourceKey(other.to_owned())),
    }
  }
}

// ─── Descriptors ─────────────────────────────────────────────────────────────

/// How a source's raw content is retrieved.
#[derive(Debug, Clone, Copy)]
pub enum FetchSpec {
  /// A file in a GitHub repository; versioned by its latest commit.
  GithubFile {
    repo:    &'static str,
    path:    &'static str,
    raw_url: &'static str,
  },
  /// A SPARQL query result set. No natural version exists upstream.
  Sparql { query: &'static str },
}

/// Static configuration for one mapping source.
#[derive(Debug, Clone, Copy)]
pub struct Source {
  pub key:         SourceKey,
  pub label:       &'static str,
  pub description: &'static str,
  pub fetch:       FetchSpec,
}

/// The three sources the mapping pipeline reconciles.
pub const SOURCES: [Source; 3] = [
  Source {
    key:         SourceKey::TaxoCode,
    label:       "whoBIRD taxo_code.txt",
    description: "Maps BirdNET ids to eBird ids",
    fetch:       FetchSpec::GithubFile {
      repo:    "woheller69/whoBIRD",
      path:    "app/src/main/assets/taxo_code.txt",
      raw_url:
        "https://github.com/woheller69/whoBIRD/raw/master/app/src/main/assets/taxo_code.txt",
    },
  },
  Source {
    key:         SourceKey::BirdnetSpecies,
    label:       "whoBIRD BirdNET species file (labels_en.txt)",
    description: "BirdNET species list (scientific and common names), kept \
                  in sync with taxo_code.txt",
    fetch:       FetchSpec::GithubFile {
      repo:    "woheller69/whoBIRD",
      path:    "app/src/main/assets/labels_en.txt",
      raw_url:
        "https://github.com/woheller69/whoBIRD/raw/master/app/src/main/assets/labels_en.txt",
    },
  },
  Source {
    key:         SourceKey::WikidataSpecies,
    label:       "Wikidata birds SPARQL export",
    description: "Bird species exported from Wikidata: Q-id, English label, \
                  scientific name, taxon rank, and eBird taxon id",
    fetch:       FetchSpec::Sparql { query: WIKIDATA_SPECIES_QUERY },
  },
];

/// Look up the static descriptor for `key`.
pub fn source(key: SourceKey) -> &'static Source {
  SOURCES
    .iter()
    .find(|s| s.key == key)
    .expect("every SourceKey has a SOURCES entry")
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

/// The latest raw content fetched for one source, with provenance.
///
/// One snapshot per source key; a new fetch replaces the previous snapshot.
/// History is deliberately not retained — the pipeline only ever needs the
/// latest content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSnapshot {
  pub source:        SourceKey,
  pub raw_content:   String,
  pub fetched_at:    DateTime<Utc>,
  /// Commit sha for file sources; `None` for query sources.
  pub version_token: Option<String>,
  /// Commit date for file sources; `None` for query sources.
  pub version_date:  Option<DateTime<Utc>>,
}
