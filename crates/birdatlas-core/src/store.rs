//! The `TaxonomyStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `birdatlas-store-sqlite`). The pipeline layer depends on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  enrichment::{CachedEnrichment, EnrichmentRecord},
  entity::EntityId,
  source::{SourceKey, SourceSnapshot},
  taxonomy::{MappingRow, SpeciesRow, TaxoCodeRow, WikidataSpeciesRow},
};

// ─── Index management ────────────────────────────────────────────────────────

/// The two lookup indexes the join passes rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WikidataIndex {
  ScientificName,
  EbirdId,
}

/// Whether `ensure_wikidata_index` had to do anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
  Created,
  AlreadyPresent,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a birdatlas storage backend.
///
/// The `replace_*` operations are full drop-and-recreate rebuilds, so they
/// are idempotent for a given input. The `link_*`/`assign_qid` operations
/// only ever fill rows whose Q-id is still unset — a Q-id, once written, is
/// never overwritten by a later pass.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait TaxonomyStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Source snapshots ──────────────────────────────────────────────────

  /// Replace the stored snapshot for the snapshot's source key.
  fn upsert_snapshot(
    &self,
    snapshot: SourceSnapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_snapshot(
    &self,
    key: SourceKey,
  ) -> impl Future<Output = Result<Option<SourceSnapshot>, Self::Error>> + Send + '_;

  // ── Structured table imports ──────────────────────────────────────────

  /// Drop and recreate the taxo-code table with `rows`.
  fn replace_taxo_codes(
    &self,
    rows: Vec<TaxoCodeRow>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Drop and recreate the BirdNET species table with `rows`.
  fn replace_species(
    &self,
    rows: Vec<SpeciesRow>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Drop and recreate the Wikidata species table with `rows`.
  fn replace_wikidata_species(
    &self,
    rows: Vec<WikidataSpeciesRow>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Mapping build steps ───────────────────────────────────────────────

  fn drop_mapping_table(
    &self,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn create_mapping_table(
    &self,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Create `index` on the Wikidata species table if it is absent.
  fn ensure_wikidata_index(
    &self,
    index: WikidataIndex,
  ) -> impl Future<Output = Result<IndexOutcome, Self::Error>> + Send + '_;

  /// Insert `(birdnet_id, scientific_name)` for every BirdNET species row.
  /// Rows already present are left untouched, so the step can be re-run.
  /// Returns the number of rows inserted.
  fn seed_mapping_from_species(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Fill unset Q-ids by exact, case-sensitive scientific-name equality
  /// against the Wikidata species table. Returns rows updated.
  fn link_mapping_by_scientific_name(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Fill unset Q-ids via the two-hop join BirdNET id → eBird id →
  /// Wikidata species. Returns rows updated.
  fn link_mapping_by_ebird_id(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Scientific names of mapping rows still lacking a Q-id.
  fn unresolved_scientific_names(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Set `qid` on rows matching `scientific_name` whose Q-id is unset.
  /// Returns rows updated.
  fn assign_qid(
    &self,
    scientific_name: String,
    qid: EntityId,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Mapping reads and bulk load ───────────────────────────────────────

  fn get_mapping(
    &self,
    birdnet_id: u32,
  ) -> impl Future<Output = Result<Option<MappingRow>, Self::Error>> + Send + '_;

  /// Every mapping row, ordered by BirdNET id.
  fn all_mappings(
    &self,
  ) -> impl Future<Output = Result<Vec<MappingRow>, Self::Error>> + Send + '_;

  /// Drop and recreate the mapping table with `rows` — used to seed a
  /// fresh installation from a previously exported document.
  fn replace_mappings(
    &self,
    rows: Vec<MappingRow>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Enrichment cache ──────────────────────────────────────────────────

  fn get_cached_enrichment(
    &self,
    birdnet_id: u32,
  ) -> impl Future<Output = Result<Option<CachedEnrichment>, Self::Error>> + Send + '_;

  /// Insert or overwrite the cache entry for `birdnet_id`. A `None` record
  /// caches the "no data upstream" outcome.
  fn put_cached_enrichment(
    &self,
    birdnet_id: u32,
    record: Option<EnrichmentRecord>,
    expires_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove every cache entry; returns the number removed.
  fn clear_enrichment_cache(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}
