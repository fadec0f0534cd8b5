//! The mapping export document — the one durable artifact the pipeline
//! produces.
//!
//! Serialisation must be byte-for-byte reproducible for identical inputs:
//! field order is fixed by struct declaration order, absent provenance
//! fields are omitted entirely, and `exported_at` is supplied by the
//! caller rather than sampled here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, source::SourceKey, taxonomy::MappingRow};

/// Provenance for one source as it stood when the export was taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProvenance {
  pub key:   SourceKey,
  pub label: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub version_token: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub version_date:  Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fetched_at:    Option<DateTime<Utc>>,
  /// The exact query text, for query-backed sources.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sparql_query:  Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
  pub exported_at: DateTime<Utc>,
  pub sources:     Vec<SourceProvenance>,
  pub row_count:   usize,
}

/// The full export: metadata plus every mapping row, ordered by BirdNET id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingExport {
  pub metadata: ExportMetadata,
  pub data:     Vec<MappingRow>,
}

impl MappingExport {
  pub fn to_pretty_json(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  pub fn from_json(raw: &str) -> Result<Self> {
    Ok(serde_json::from_str(raw)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> MappingExport {
    MappingExport {
      metadata: ExportMetadata {
        exported_at: "2025-06-01T12:00:00Z".parse().unwrap(),
        sources:     vec![SourceProvenance {
          key:           SourceKey::TaxoCode,
          label:         "whoBIRD taxo_code.txt".to_owned(),
          version_token: Some("abc123".to_owned()),
          version_date:  None,
          fetched_at:    None,
          sparql_query:  None,
        }],
        row_count:   1,
      },
      data:     vec![MappingRow {
        birdnet_id:      0,
        scientific_name: Some("Turdus migratorius".to_owned()),
        qid:             Some("Q25334".to_owned()),
      }],
    }
  }

  #[test]
  fn round_trips_through_json() {
    let doc = sample();
    let json = doc.to_pretty_json().unwrap();
    let back = MappingExport::from_json(&json).unwrap();
    assert_eq!(back.metadata.row_count, 1);
    assert_eq!(back.data, doc.data);
  }

  #[test]
  fn serialisation_is_deterministic() {
    assert_eq!(
      sample().to_pretty_json().unwrap(),
      sample().to_pretty_json().unwrap()
    );
  }

  #[test]
  fn absent_provenance_fields_are_omitted() {
    let json = sample().to_pretty_json().unwrap();
    assert!(json.contains("\"version_token\""));
    assert!(!json.contains("\"version_date\""));
    assert!(!json.contains("\"sparql_query\""));
  }
}
