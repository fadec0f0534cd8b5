//! Building and loading the mapping export document.

use birdatlas_core::{
  export::{ExportMetadata, MappingExport, SourceProvenance},
  source::{FetchSpec, SOURCES},
  store::TaxonomyStore,
};
use chrono::{DateTime, Utc};

use crate::{Error, Result};

/// Assemble the export document: every mapping row (ordered by BirdNET
/// id) plus provenance for each source that has a stored snapshot.
///
/// `exported_at` is supplied by the caller so the document is a pure
/// function of its inputs — identical tables and timestamp give identical
/// bytes.
pub async fn build_export<S: TaxonomyStore>(
  store: &S,
  exported_at: DateTime<Utc>,
) -> Result<MappingExport> {
  let data = store.all_mappings().await.map_err(Error::store)?;

  let mut sources = Vec::new();
  for source in &SOURCES {
    let Some(snapshot) =
      store.get_snapshot(source.key).await.map_err(Error::store)?
    else {
      continue;
    };
    sources.push(SourceProvenance {
      key:           source.key,
      label:         source.label.to_owned(),
      version_token: snapshot.version_token,
      version_date:  snapshot.version_date,
      fetched_at:    Some(snapshot.fetched_at),
      sparql_query:  match source.fetch {
        FetchSpec::Sparql { query } => Some(query.to_owned()),
        FetchSpec::GithubFile { .. } => None,
      },
    });
  }

  let row_count = data.len();
  Ok(MappingExport {
    metadata: ExportMetadata { exported_at, sources, row_count },
    data,
  })
}

/// Replace the mapping table with the rows of a previously exported
/// document — used to seed a fresh installation. Returns the number of
/// rows loaded.
pub async fn load_export<S: TaxonomyStore>(
  store: &S,
  export: &MappingExport,
) -> Result<usize> {
  store
    .replace_mappings(export.data.clone())
    .await
    .map_err(Error::store)?;
  tracing::info!(rows = export.data.len(), "mapping table loaded from export");
  Ok(export.data.len())
}
