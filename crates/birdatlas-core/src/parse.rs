//! Parsers turning raw source snapshots into structured rows.
//!
//! All three parsers tolerate bad input rows: a malformed line or binding
//! is counted and (where useful) reported as a warning, never an abort.
//! Parsing the same snapshot twice yields identical output.

use crate::{
  Result,
  sparql::{SparqlResults, bound_value, qid_from_entity_uri},
  taxonomy::{SpeciesRow, TaxoCodeRow, WikidataSpeciesRow},
};

/// Outcome of parsing one snapshot: the valid rows plus an account of what
/// was dropped along the way.
#[derive(Debug, Clone)]
pub struct ImportBatch<T> {
  pub rows:     Vec<T>,
  pub skipped:  usize,
  pub warnings: Vec<String>,
}

impl<T> Default for ImportBatch<T> {
  fn default() -> Self {
    Self {
      rows:     Vec::new(),
      skipped:  0,
      warnings: Vec::new(),
    }
  }
}

/// Parse `taxo_code.txt`: one eBird id per line, the zero-based line number
/// being the BirdNET id. Blank lines are skipped but still consume an id.
pub fn parse_taxo_codes(raw: &str) -> ImportBatch<TaxoCodeRow> {
  let mut batch = ImportBatch::default();
  for (i, line) in raw.trim().lines().enumerate() {
    let ebird_id = line.trim();
    if ebird_id.is_empty() {
      batch.skipped += 1;
      continue;
    }
    batch.rows.push(TaxoCodeRow {
      birdnet_id: i as u32,
      ebird_id:   ebird_id.to_owned(),
    });
  }
  batch
}

/// Parse `labels_en.txt`: `<scientific name>_<common name>` per line, the
/// zero-based line number being the BirdNET id. Lines without the delimiter
/// or empty after trimming are skipped but still consume an id.
pub fn parse_species_list(raw: &str) -> ImportBatch<SpeciesRow> {
  let mut batch = ImportBatch::default();
  for (i, line) in raw.trim().lines().enumerate() {
    let line = line.trim();
    if line.is_empty() || !line.contains('_') {
      batch.skipped += 1;
      continue;
    }
    let mut parts = line.splitn(3, '_');
    let scientific_name = parts.next().unwrap_or("").trim().to_owned();
    let common_name = parts.next().unwrap_or("").trim().to_owned();
    batch.rows.push(SpeciesRow {
      birdnet_id: i as u32,
      scientific_name,
      common_name,
    });
  }
  batch
}

/// Parse the Wikidata full-export result document into species rows.
///
/// A document without the `head`/`results` shape is an error; individual
/// bindings without a usable `?item` entity URI are skipped with a warning.
pub fn parse_wikidata_results(
  raw: &str,
) -> Result<ImportBatch<WikidataSpeciesRow>> {
  let doc = SparqlResults::from_json(raw)?;

  let mut batch = ImportBatch::default();
  for (i, binding) in doc.results.bindings.iter().enumerate() {
    let qid = bound_value(binding, "item").and_then(qid_from_entity_uri);
    let Some(qid) = qid else {
      batch.skipped += 1;
      batch
        .warnings
        .push(format!("binding {i}: missing or empty ?item entity URI"));
      continue;
    };

    batch.rows.push(WikidataSpeciesRow {
      qid:             qid.to_owned(),
      item_label:      bound_value(binding, "itemLabel").map(str::to_owned),
      scientific_name: bound_value(binding, "scientificName")
        .map(str::to_owned),
      taxon_rank:      bound_value(binding, "taxonRankLabel")
        .map(str::to_owned),
      ebird_id:        bound_value(binding, "eBirdID").map(str::to_owned),
    });
  }
  Ok(batch)
}
