//! Row types for the structured taxonomy tables.
//!
//! Each table is rebuilt by a full drop-and-recreate from its source
//! snapshot; rows are never mutated in place outside the mapping pipeline.

use serde::{Deserialize, Serialize};

/// One line of `taxo_code.txt`: the zero-based line number is the BirdNET id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxoCodeRow {
  pub birdnet_id: u32,
  pub ebird_id:   String,
}

/// One line of `labels_en.txt`: `<scientific name>_<common name>`, with the
/// zero-based line number as the BirdNET id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesRow {
  pub birdnet_id:      u32,
  pub scientific_name: String,
  pub common_name:     String,
}

/// One binding of the Wikidata full-export result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikidataSpeciesRow {
  /// Q-id extracted from the trailing path segment of the entity URI.
  pub qid:             String,
  pub item_label:      Option<String>,
  pub scientific_name: Option<String>,
  pub taxon_rank:      Option<String>,
  pub ebird_id:        Option<String>,
}

/// The consolidated mapping output: one row per BirdNET id.
///
/// Seeded from [`SpeciesRow`]s; `qid` is filled in by successive join
/// passes and, once set, never overwritten by a later pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRow {
  pub birdnet_id:      u32,
  pub scientific_name: Option<String>,
  pub qid:             Option<String>,
}
