//! [`SqliteStore`] — the SQLite implementation of [`TaxonomyStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;

use birdatlas_core::{
  enrichment::{CachedEnrichment, EnrichmentRecord},
  entity::EntityId,
  source::{SourceKey, SourceSnapshot},
  store::{IndexOutcome, TaxonomyStore, WikidataIndex},
  taxonomy::{MappingRow, SpeciesRow, TaxoCodeRow, WikidataSpeciesRow},
};
use chrono::{DateTime, Utc};

use crate::{
  Error, Result,
  encode::{
    RawCacheEntry, RawMapping, RawSnapshot, encode_dt, encode_record,
    encode_source_key,
  },
  schema::{
    BIRDNET_SPECIES_DDL, CREATE_MAPPING_DDL, DROP_MAPPING_DDL, SCHEMA,
    TAXO_CODES_DDL, WIKIDATA_SPECIES_DDL,
  },
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A birdatlas taxonomy store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── TaxonomyStore impl ──────────────────────────────────────────────────────

impl TaxonomyStore for SqliteStore {
  type Error = Error;

  // ── Source snapshots ──────────────────────────────────────────────────────

  async fn upsert_snapshot(&self, snapshot: SourceSnapshot) -> Result<()> {
    let source_str = encode_source_key(snapshot.source).to_owned();
    let fetched_at = encode_dt(snapshot.fetched_at);
    let version_date = snapshot.version_date.map(encode_dt);
    let raw_content = snapshot.raw_content;
    let version_token = snapshot.version_token;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO source_snapshots
             (source, raw_content, fetched_at, version_token, version_date)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            source_str,
            raw_content,
            fetched_at,
            version_token,
            version_date,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_snapshot(
    &self,
    key: SourceKey,
  ) -> Result<Option<SourceSnapshot>> {
    let key_str = encode_source_key(key).to_owned();

    let raw: Option<RawSnapshot> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT source, raw_content, fetched_at, version_token, version_date
               FROM source_snapshots WHERE source = ?1",
              rusqlite::params![key_str],
              |row| {
                Ok(RawSnapshot {
                  source:        row.get(0)?,
                  raw_content:   row.get(1)?,
                  fetched_at:    row.get(2)?,
                  version_token: row.get(3)?,
                  version_date:  row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSnapshot::into_snapshot).transpose()
  }

  // ── Structured table imports ──────────────────────────────────────────────

  async fn replace_taxo_codes(&self, rows: Vec<TaxoCodeRow>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute_batch(TAXO_CODES_DDL)?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO taxo_codes (birdnet_id, ebird_id) VALUES (?1, ?2)",
          )?;
          for row in &rows {
            stmt.execute(rusqlite::params![row.birdnet_id, row.ebird_id])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn replace_species(&self, rows: Vec<SpeciesRow>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute_batch(BIRDNET_SPECIES_DDL)?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO birdnet_species (birdnet_id, scientific_name, common_name)
             VALUES (?1, ?2, ?3)",
          )?;
          for row in &rows {
            stmt.execute(rusqlite::params![
              row.birdnet_id,
              row.scientific_name,
              row.common_name,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn replace_wikidata_species(
    &self,
    rows: Vec<WikidataSpeciesRow>,
  ) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute_batch(WIKIDATA_SPECIES_DDL)?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO wikidata_species
               (wikidata_qid, item_label, scientific_name, taxon_rank, ebird_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          for row in &rows {
            stmt.execute(rusqlite::params![
              row.qid,
              row.item_label,
              row.scientific_name,
              row.taxon_rank,
              row.ebird_id,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Mapping build steps ───────────────────────────────────────────────────

  async fn drop_mapping_table(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute(DROP_MAPPING_DDL, [])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn create_mapping_table(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(CREATE_MAPPING_DDL)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn ensure_wikidata_index(
    &self,
    index: WikidataIndex,
  ) -> Result<IndexOutcome> {
    let (name, create_sql) = match index {
      WikidataIndex::ScientificName => (
        "idx_wikidata_scientific_name",
        "CREATE INDEX idx_wikidata_scientific_name
           ON wikidata_species (scientific_name)",
      ),
      WikidataIndex::EbirdId => (
        "idx_wikidata_ebird_id",
        "CREATE INDEX idx_wikidata_ebird_id ON wikidata_species (ebird_id)",
      ),
    };

    let outcome = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare("PRAGMA index_list('wikidata_species')")?;
        let existing = stmt
          .query_map([], |row| row.get::<_, String>(1))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        if existing.iter().any(|n| n == name) {
          return Ok(IndexOutcome::AlreadyPresent);
        }
        conn.execute(create_sql, [])?;
        Ok(IndexOutcome::Created)
      })
      .await?;
    Ok(outcome)
  }

  async fn seed_mapping_from_species(&self) -> Result<u64> {
    let inserted = self
      .conn
      .call(|conn| {
        // OR IGNORE keeps the step re-runnable: rows already seeded are
        // left untouched.
        let n = conn.execute(
          "INSERT OR IGNORE INTO bird_mapping (birdnet_id, scientific_name)
           SELECT birdnet_id, scientific_name FROM birdnet_species",
          [],
        )?;
        Ok(n as u64)
      })
      .await?;
    Ok(inserted)
  }

  async fn link_mapping_by_scientific_name(&self) -> Result<u64> {
    let updated = self
      .conn
      .call(|conn| {
        let n = conn.execute(
          "UPDATE bird_mapping
           SET wikidata_qid = (
             SELECT w.wikidata_qid FROM wikidata_species w
             WHERE w.scientific_name = bird_mapping.scientific_name
             LIMIT 1
           )
           WHERE wikidata_qid IS NULL
             AND scientific_name IS NOT NULL
             AND EXISTS (
               SELECT 1 FROM wikidata_species w
               WHERE w.scientific_name = bird_mapping.scientific_name
             )",
          [],
        )?;
        Ok(n as u64)
      })
      .await?;
    Ok(updated)
  }

  async fn link_mapping_by_ebird_id(&self) -> Result<u64> {
    let updated = self
      .conn
      .call(|conn| {
        let n = conn.execute(
          "UPDATE bird_mapping
           SET wikidata_qid = (
             SELECT w.wikidata_qid
             FROM taxo_codes t
             JOIN wikidata_species w ON w.ebird_id = t.ebird_id
             WHERE t.birdnet_id = bird_mapping.birdnet_id
             LIMIT 1
           )
           WHERE wikidata_qid IS NULL
             AND EXISTS (
               SELECT 1
               FROM taxo_codes t
               JOIN wikidata_species w ON w.ebird_id = t.ebird_id
               WHERE t.birdnet_id = bird_mapping.birdnet_id
             )",
          [],
        )?;
        Ok(n as u64)
      })
      .await?;
    Ok(updated)
  }

  async fn unresolved_scientific_names(&self) -> Result<Vec<String>> {
    let names = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT scientific_name FROM bird_mapping
           WHERE wikidata_qid IS NULL AND scientific_name IS NOT NULL
           ORDER BY scientific_name",
        )?;
        let rows = stmt
          .query_map([], |row| row.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(names)
  }

  async fn assign_qid(
    &self,
    scientific_name: String,
    qid: EntityId,
  ) -> Result<u64> {
    let qid_str = qid.into_string();
    let updated = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE bird_mapping SET wikidata_qid = ?2
           WHERE scientific_name = ?1 AND wikidata_qid IS NULL",
          rusqlite::params![scientific_name, qid_str],
        )?;
        Ok(n as u64)
      })
      .await?;
    Ok(updated)
  }

  // ── Mapping reads and bulk load ───────────────────────────────────────────

  async fn get_mapping(&self, birdnet_id: u32) -> Result<Option<MappingRow>> {
    let raw: Option<RawMapping> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT birdnet_id, scientific_name, wikidata_qid
               FROM bird_mapping WHERE birdnet_id = ?1",
              rusqlite::params![birdnet_id],
              |row| {
                Ok(RawMapping {
                  birdnet_id:      row.get(0)?,
                  scientific_name: row.get(1)?,
                  qid:             row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawMapping::into_mapping).transpose()
  }

  async fn all_mappings(&self) -> Result<Vec<MappingRow>> {
    let raws: Vec<RawMapping> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT birdnet_id, scientific_name, wikidata_qid
           FROM bird_mapping ORDER BY birdnet_id",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawMapping {
              birdnet_id:      row.get(0)?,
              scientific_name: row.get(1)?,
              qid:             row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMapping::into_mapping).collect()
  }

  async fn replace_mappings(&self, rows: Vec<MappingRow>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(DROP_MAPPING_DDL, [])?;
        tx.execute_batch(CREATE_MAPPING_DDL)?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO bird_mapping (birdnet_id, scientific_name, wikidata_qid)
             VALUES (?1, ?2, ?3)",
          )?;
          for row in &rows {
            stmt.execute(rusqlite::params![
              row.birdnet_id,
              row.scientific_name,
              row.qid,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Enrichment cache ──────────────────────────────────────────────────────

  async fn get_cached_enrichment(
    &self,
    birdnet_id: u32,
  ) -> Result<Option<CachedEnrichment>> {
    let raw: Option<RawCacheEntry> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT result, expires_at FROM enrichment_cache
               WHERE birdnet_id = ?1",
              rusqlite::params![birdnet_id],
              |row| {
                Ok(RawCacheEntry {
                  result:     row.get(0)?,
                  expires_at: row.get(1)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCacheEntry::into_cached).transpose()
  }

  async fn put_cached_enrichment(
    &self,
    birdnet_id: u32,
    record: Option<EnrichmentRecord>,
    expires_at: DateTime<Utc>,
  ) -> Result<()> {
    let result_json = record.as_ref().map(encode_record).transpose()?;
    let expires_str = encode_dt(expires_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO enrichment_cache (birdnet_id, result, expires_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![birdnet_id, result_json, expires_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn clear_enrichment_cache(&self) -> Result<u64> {
    let removed = self
      .conn
      .call(|conn| {
        let n = conn.execute("DELETE FROM enrichment_cache", [])?;
        Ok(n as u64)
      })
      .await?;
    Ok(removed)
  }
}
