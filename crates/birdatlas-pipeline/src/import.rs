//! Importing stored snapshots into the structured taxonomy tables.

use birdatlas_core::{
  parse::{parse_species_list, parse_taxo_codes, parse_wikidata_results},
  source::SourceKey,
  store::TaxonomyStore,
};

use crate::{Error, Result};

/// Outcome of one import: how many rows landed, how many input rows were
/// dropped, and why.
#[derive(Debug, Clone)]
pub struct ImportReport {
  pub source:   SourceKey,
  pub inserted: usize,
  pub skipped:  usize,
  pub warnings: Vec<String>,
}

/// Parse the stored snapshot for `key` and rebuild its structured table.
///
/// Bad input rows are skipped and reported in the returned
/// [`ImportReport`]; only a missing snapshot or an unusable document shape
/// aborts the import. Importing the same snapshot twice yields the same
/// table contents.
pub async fn import_source<S: TaxonomyStore>(
  store: &S,
  key: SourceKey,
) -> Result<ImportReport> {
  let snapshot = store
    .get_snapshot(key)
    .await
    .map_err(Error::store)?
    .ok_or(Error::SnapshotMissing(key))?;

  let (inserted, skipped, warnings) = match key {
    SourceKey::TaxoCode => {
      let batch = parse_taxo_codes(&snapshot.raw_content);
      let inserted = batch.rows.len();
      store
        .replace_taxo_codes(batch.rows)
        .await
        .map_err(Error::store)?;
      (inserted, batch.skipped, batch.warnings)
    }
    SourceKey::BirdnetSpecies => {
      let batch = parse_species_list(&snapshot.raw_content);
      let inserted = batch.rows.len();
      store
        .replace_species(batch.rows)
        .await
        .map_err(Error::store)?;
      (inserted, batch.skipped, batch.warnings)
    }
    SourceKey::WikidataSpecies => {
      let batch = parse_wikidata_results(&snapshot.raw_content)?;
      let inserted = batch.rows.len();
      store
        .replace_wikidata_species(batch.rows)
        .await
        .map_err(Error::store)?;
      (inserted, batch.skipped, batch.warnings)
    }
  };

  if !warnings.is_empty() {
    tracing::warn!(
      source = %key,
      dropped = warnings.len(),
      "import dropped malformed rows"
    );
  }
  tracing::info!(source = %key, inserted, skipped, "source imported");

  Ok(ImportReport { source: key, inserted, skipped, warnings })
}
