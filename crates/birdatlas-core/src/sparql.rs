//! SPARQL result-document model and query-text helpers.
//!
//! Covers the `application/sparql-results+json` format: a `head.vars` list
//! naming the selected variables and a `results.bindings` array of
//! variable-to-value maps.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{Error, Result};

// ─── Result document ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SparqlResults {
  pub head:    SparqlHead,
  pub results: SparqlBindings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SparqlHead {
  #[serde(default)]
  pub vars: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SparqlBindings {
  #[serde(default)]
  pub bindings: Vec<Binding>,
}

/// One result row: selected variable name → bound value. Unbound variables
/// are simply absent from the map.
pub type Binding = BTreeMap<String, SparqlValue>;

#[derive(Debug, Clone, Deserialize)]
pub struct SparqlValue {
  pub value: String,
  #[serde(rename = "type")]
  pub value_type: Option<String>,
  #[serde(rename = "xml:lang")]
  pub lang: Option<String>,
}

impl SparqlResults {
  /// Parse a raw response body. A document missing the expected
  /// `head`/`results` shape is an upstream format error, not a panic.
  pub fn from_json(raw: &str) -> Result<Self> {
    serde_json::from_str(raw).map_err(|e| Error::ResultFormat(e.to_string()))
  }
}

/// The value bound to `var` in this row, if any.
pub fn bound_value<'a>(binding: &'a Binding, var: &str) -> Option<&'a str> {
  binding.get(var).map(|v| v.value.as_str())
}

/// Extract the trailing path segment of an entity URI, e.g.
/// `http://www.wikidata.org/entity/Q25334` → `Q25334`.
pub fn qid_from_entity_uri(uri: &str) -> Option<&str> {
  let segment = uri.rsplit('/').next().unwrap_or("");
  if segment.is_empty() { None } else { Some(segment) }
}

/// Escape a string for use inside a double-quoted SPARQL literal.
pub fn escape_literal(s: &str) -> String {
  s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"{
    "head": { "vars": ["item", "scientificName"] },
    "results": { "bindings": [
      {
        "item": { "type": "uri", "value": "http://www.wikidata.org/entity/Q25334" },
        "scientificName": { "type": "literal", "value": "Turdus migratorius" }
      },
      {
        "scientificName": { "type": "literal", "value": "Sialia sialis" }
      }
    ] }
  }"#;

  #[test]
  fn parses_vars_and_bindings() {
    let doc = SparqlResults::from_json(SAMPLE).unwrap();
    assert_eq!(doc.head.vars, ["item", "scientificName"]);
    assert_eq!(doc.results.bindings.len(), 2);

    let first = &doc.results.bindings[0];
    assert_eq!(
      bound_value(first, "scientificName"),
      Some("Turdus migratorius")
    );
    assert_eq!(bound_value(first, "eBirdID"), None);

    // Second row has no ?item binding.
    assert_eq!(bound_value(&doc.results.bindings[1], "item"), None);
  }

  #[test]
  fn rejects_documents_without_the_results_shape() {
    assert!(SparqlResults::from_json("{}").is_err());
    assert!(SparqlResults::from_json("not json").is_err());
    assert!(SparqlResults::from_json(r#"{"error": "boom"}"#).is_err());
  }

  #[test]
  fn qid_extraction() {
    assert_eq!(
      qid_from_entity_uri("http://www.wikidata.org/entity/Q25334"),
      Some("Q25334")
    );
    assert_eq!(qid_from_entity_uri("Q42"), Some("Q42"));
    assert_eq!(qid_from_entity_uri("http://example.org/"), None);
    assert_eq!(qid_from_entity_uri(""), None);
  }

  #[test]
  fn literal_escaping() {
    assert_eq!(escape_literal("plain"), "plain");
    assert_eq!(escape_literal(r#"say "hi""#), r#"say \"hi\""#);
    assert_eq!(escape_literal(r"a\b"), r"a\\b");
  }
}
