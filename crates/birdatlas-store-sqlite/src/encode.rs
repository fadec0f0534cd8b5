//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, enrichment records as
//! compact JSON, and source keys in their canonical string form.

use birdatlas_core::{
  enrichment::{CachedEnrichment, EnrichmentRecord},
  source::{SourceKey, SourceSnapshot},
  taxonomy::MappingRow,
};
use chrono::{DateTime, Utc};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── SourceKey ───────────────────────────────────────────────────────────────

pub fn encode_source_key(key: SourceKey) -> &'static str { key.as_str() }

pub fn decode_source_key(s: &str) -> Result<SourceKey> {
  Ok(s.parse::<SourceKey>()?)
}

// ─── EnrichmentRecord ────────────────────────────────────────────────────────

pub fn encode_record(record: &EnrichmentRecord) -> Result<String> {
  Ok(serde_json::to_string(record)?)
}

pub fn decode_record(s: &str) -> Result<EnrichmentRecord> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `source_snapshots` row.
pub struct RawSnapshot {
  pub source:        String,
  pub raw_content:   String,
  pub fetched_at:    String,
  pub version_token: Option<String>,
  pub version_date:  Option<String>,
}

impl RawSnapshot {
  pub fn into_snapshot(self) -> Result<SourceSnapshot> {
    Ok(SourceSnapshot {
      source:        decode_source_key(&self.source)?,
      raw_content:   self.raw_content,
      fetched_at:    decode_dt(&self.fetched_at)?,
      version_token: self.version_token,
      version_date:  self
        .version_date
        .as_deref()
        .map(decode_dt)
        .transpose()?,
    })
  }
}

/// Raw columns read directly from a `bird_mapping` row.
pub struct RawMapping {
  pub birdnet_id:      i64,
  pub scientific_name: Option<String>,
  pub qid:             Option<String>,
}

impl RawMapping {
  pub fn into_mapping(self) -> Result<MappingRow> {
    let birdnet_id = u32::try_from(self.birdnet_id).map_err(|_| {
      Error::Decode(format!("birdnet_id out of range: {}", self.birdnet_id))
    })?;
    Ok(MappingRow {
      birdnet_id,
      scientific_name: self.scientific_name,
      qid: self.qid,
    })
  }
}

/// Raw columns read directly from an `enrichment_cache` row.
pub struct RawCacheEntry {
  pub result:     Option<String>,
  pub expires_at: String,
}

impl RawCacheEntry {
  pub fn into_cached(self) -> Result<CachedEnrichment> {
    Ok(CachedEnrichment {
      record:     self.result.as_deref().map(decode_record).transpose()?,
      expires_at: decode_dt(&self.expires_at)?,
    })
  }
}
