//! Integration tests for the pipeline against an in-memory SQLite store.
//!
//! Everything here runs offline: the SPARQL endpoint points at a closed
//! local port, so any code path that reaches for the network either
//! short-circuits first (and passes) or fails fast (and the test asserts
//! the failure is handled).

use std::{path::PathBuf, time::Duration};

use birdatlas_core::{
  enrichment::EnrichmentRecord,
  source::{SourceKey, SourceSnapshot},
  store::TaxonomyStore,
  taxonomy::{MappingRow, SpeciesRow, TaxoCodeRow, WikidataSpeciesRow},
};
use birdatlas_store_sqlite::SqliteStore;
use chrono::Utc;

use crate::{
  Error,
  builder::{MappingBuilder, MappingStep},
  cache::{CacheOptions, EnrichmentCache, THROTTLE_NAMESPACE},
  export::{build_export, load_export},
  import::import_source,
  sparql::SparqlClient,
  throttle::FileThrottle,
};

/// A closed port: connections are refused immediately, never served.
const DEAD_ENDPOINT: &str = "http://127.0.0.1:9/sparql";

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn sparql() -> SparqlClient {
  SparqlClient::new(DEAD_ENDPOINT).expect("client")
}

fn throttle_dir(tag: &str) -> PathBuf {
  let dir = std::env::temp_dir()
    .join(format!("birdatlas-test-{tag}-{}", std::process::id()));
  std::fs::create_dir_all(&dir).expect("create throttle dir");
  dir
}

async fn seed_tables(s: &SqliteStore, wikidata: Vec<WikidataSpeciesRow>) {
  s.replace_species(vec![
    SpeciesRow {
      birdnet_id:      0,
      scientific_name: "Turdus migratorius".into(),
      common_name:     "American Robin".into(),
    },
    SpeciesRow {
      birdnet_id:      1,
      scientific_name: "Sialia sialis".into(),
      common_name:     "Eastern Bluebird".into(),
    },
  ])
  .await
  .unwrap();
  s.replace_taxo_codes(vec![
    TaxoCodeRow { birdnet_id: 0, ebird_id: "amerob".into() },
    TaxoCodeRow { birdnet_id: 1, ebird_id: "easblu".into() },
  ])
  .await
  .unwrap();
  s.replace_wikidata_species(wikidata).await.unwrap();
}

fn wikidata_row(
  qid: &str,
  scientific_name: &str,
  ebird_id: Option<&str>,
) -> WikidataSpeciesRow {
  WikidataSpeciesRow {
    qid:             qid.into(),
    item_label:      None,
    scientific_name: Some(scientific_name.into()),
    taxon_rank:      Some("species".into()),
    ebird_id:        ebird_id.map(str::to_owned),
  }
}

// ─── Throttle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn throttle_requires_an_existing_directory() {
  let missing = std::env::temp_dir().join("birdatlas-no-such-dir-xyzzy");
  let result =
    FileThrottle::new("t", Duration::from_millis(10), &missing);
  assert!(matches!(result, Err(Error::Throttle(_))));
}

#[tokio::test]
async fn throttle_first_permit_is_immediate() {
  let throttle = FileThrottle::new(
    "first-permit",
    Duration::from_secs(60),
    throttle_dir("first-permit"),
  )
  .unwrap();

  let started = std::time::Instant::now();
  throttle.wait_until_allowed().await.unwrap();
  // No prior stamp: a 60 s minimum gap must not delay the first caller.
  assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn throttle_enforces_the_minimum_gap() {
  let delay = Duration::from_millis(150);
  let throttle =
    FileThrottle::new("gap", delay, throttle_dir("gap")).unwrap();

  let started = std::time::Instant::now();
  throttle.wait_until_allowed().await.unwrap();
  throttle.wait_until_allowed().await.unwrap();

  // Between the start of the first permit and the return of the second,
  // at least one full minimum gap must have elapsed.
  assert!(started.elapsed() >= delay);
}

#[tokio::test]
async fn throttle_namespaces_are_independent() {
  let dir = throttle_dir("namespaces");
  let delay = Duration::from_secs(60);
  let a = FileThrottle::new("ns-a", delay, &dir).unwrap();
  let b = FileThrottle::new("ns-b", delay, &dir).unwrap();

  a.wait_until_allowed().await.unwrap();
  let started = std::time::Instant::now();
  b.wait_until_allowed().await.unwrap();
  // b's namespace has no stamp; a's permit must not block it.
  assert!(started.elapsed() < Duration::from_secs(5));
}

// ─── Import ──────────────────────────────────────────────────────────────────

fn snapshot(source: SourceKey, raw_content: &str) -> SourceSnapshot {
  SourceSnapshot {
    source,
    raw_content: raw_content.to_owned(),
    fetched_at: Utc::now(),
    version_token: None,
    version_date: None,
  }
}

#[tokio::test]
async fn import_without_a_snapshot_is_an_error() {
  let s = store().await;
  let result = import_source(&s, SourceKey::TaxoCode).await;
  assert!(matches!(result, Err(Error::SnapshotMissing(SourceKey::TaxoCode))));
}

#[tokio::test]
async fn import_parses_and_replaces_the_table() {
  let s = store().await;
  s.upsert_snapshot(snapshot(SourceKey::TaxoCode, "amerob\n\neasblu"))
    .await
    .unwrap();

  let report = import_source(&s, SourceKey::TaxoCode).await.unwrap();
  assert_eq!(report.inserted, 2);
  assert_eq!(report.skipped, 1);

  // Importing the same snapshot again yields the same table.
  let again = import_source(&s, SourceKey::TaxoCode).await.unwrap();
  assert_eq!(again.inserted, 2);
}

#[tokio::test]
async fn import_wikidata_reports_dropped_bindings() {
  let s = store().await;
  let raw = r#"{
    "head": { "vars": ["item", "scientificName"] },
    "results": { "bindings": [
      { "item": { "type": "uri", "value": "http://www.wikidata.org/entity/Q25334" },
        "scientificName": { "type": "literal", "value": "Turdus migratorius" } },
      { "scientificName": { "type": "literal", "value": "orphan" } }
    ] }
  }"#;
  s.upsert_snapshot(snapshot(SourceKey::WikidataSpecies, raw))
    .await
    .unwrap();

  let report =
    import_source(&s, SourceKey::WikidataSpecies).await.unwrap();
  assert_eq!(report.inserted, 1);
  assert_eq!(report.skipped, 1);
  assert_eq!(report.warnings.len(), 1);
}

// ─── Mapping builder ─────────────────────────────────────────────────────────

#[tokio::test]
async fn full_sequence_resolves_and_reports() {
  let s = store().await;
  // Both species resolvable locally, so the fallback steps have nothing
  // to fetch and never touch the network.
  seed_tables(&s, vec![
    wikidata_row("Q25334", "Turdus migratorius", Some("amerob")),
    wikidata_row("Q28086", "Sialia sialis", Some("easblu")),
  ])
  .await;

  let builder = MappingBuilder::new(s.clone(), sparql());
  let reports = builder.run_all().await;

  assert_eq!(reports.len(), MappingStep::SEQUENCE.len());
  assert!(reports.iter().all(|r| r.ok), "reports: {reports:?}");
  assert!(reports.last().unwrap().message.contains("none missing"));

  let rows = s.all_mappings().await.unwrap();
  assert_eq!(rows.len(), 2);
  assert!(rows.iter().all(|r| r.qid.is_some()));
}

#[tokio::test]
async fn full_sequence_twice_produces_identical_tables() {
  let s = store().await;
  seed_tables(&s, vec![
    wikidata_row("Q25334", "Turdus migratorius", Some("amerob")),
    wikidata_row("Q28086", "Sialia sialis", Some("easblu")),
  ])
  .await;

  let builder = MappingBuilder::new(s.clone(), sparql());
  builder.run_all().await;
  let first = s.all_mappings().await.unwrap();
  builder.run_all().await;
  let second = s.all_mappings().await.unwrap();

  assert_eq!(first, second);
}

#[tokio::test]
async fn unresolved_rows_survive_failed_lookup_batches() {
  let s = store().await;
  // The bluebird has no Wikidata row at all: the fallback steps will try
  // the (dead) endpoint, skip the failed batch, and report success with
  // zero updates.
  seed_tables(&s, vec![wikidata_row("Q25334", "Turdus migratorius", None)])
    .await;

  let builder = MappingBuilder::new(s.clone(), sparql());
  let reports = builder.run_all().await;

  assert!(reports.iter().all(|r| r.ok));
  assert!(reports.last().unwrap().message.contains("0 rows updated"));

  let robin = s.get_mapping(0).await.unwrap().unwrap();
  assert_eq!(robin.qid.as_deref(), Some("Q25334"));
  let bluebird = s.get_mapping(1).await.unwrap().unwrap();
  assert_eq!(bluebird.scientific_name.as_deref(), Some("Sialia sialis"));
  assert_eq!(bluebird.qid, None);
}

#[tokio::test]
async fn snapshots_flow_through_import_and_build() {
  let s = store().await;
  s.upsert_snapshot(snapshot(SourceKey::TaxoCode, "amerob\neasblu"))
    .await
    .unwrap();
  s.upsert_snapshot(snapshot(
    SourceKey::BirdnetSpecies,
    "Turdus migratorius_American Robin\nSialia sialis_Eastern Bluebird",
  ))
  .await
  .unwrap();
  s.upsert_snapshot(snapshot(
    SourceKey::WikidataSpecies,
    r#"{
      "head": { "vars": ["item", "scientificName", "eBirdID"] },
      "results": { "bindings": [
        { "item": { "type": "uri", "value": "http://www.wikidata.org/entity/Q123" },
          "scientificName": { "type": "literal", "value": "Turdus migratorius" },
          "eBirdID": { "type": "literal", "value": "amerob" } }
      ] }
    }"#,
  ))
  .await
  .unwrap();

  for key in [
    SourceKey::TaxoCode,
    SourceKey::BirdnetSpecies,
    SourceKey::WikidataSpecies,
  ] {
    import_source(&s, key).await.unwrap();
  }

  let builder = MappingBuilder::new(s.clone(), sparql());
  let reports = builder.run_all().await;
  assert!(reports.iter().all(|r| r.ok));

  // The robin resolves through the scientific-name join; the bluebird has
  // no Wikidata row anywhere and stays open for the fallback lookups.
  let rows = s.all_mappings().await.unwrap();
  assert_eq!(rows, vec![
    MappingRow {
      birdnet_id:      0,
      scientific_name: Some("Turdus migratorius".into()),
      qid:             Some("Q123".into()),
    },
    MappingRow {
      birdnet_id:      1,
      scientific_name: Some("Sialia sialis".into()),
      qid:             None,
    },
  ]);
}

#[tokio::test]
async fn run_all_stops_at_the_first_failing_step() {
  let s = store().await;
  // No wikidata_species table: the first index step must fail and halt
  // the sequence there.
  let builder = MappingBuilder::new(s, sparql());
  let reports = builder.run_all().await;

  assert_eq!(reports.len(), 3);
  assert!(reports[0].ok && reports[1].ok);
  assert!(!reports[2].ok);
  assert_eq!(reports[2].step, MappingStep::IndexScientificName);
  // A failing step still tells the driver where to resume.
  assert_eq!(reports[2].next, Some(MappingStep::IndexEbirdId));
}

#[tokio::test]
async fn single_steps_are_individually_runnable() {
  let s = store().await;
  seed_tables(&s, vec![]).await;
  let builder = MappingBuilder::new(s.clone(), sparql());

  // Out-of-order invocation: a join before seeding affects zero rows and
  // still succeeds.
  assert!(builder.run_step(MappingStep::DropTable).await.ok);
  assert!(builder.run_step(MappingStep::CreateTable).await.ok);
  let report = builder.run_step(MappingStep::LinkScientificNames).await;
  assert!(report.ok);
  assert!(report.message.contains("Matched 0 rows"));
}

// ─── Export ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn export_is_reproducible_and_carries_provenance() {
  let s = store().await;
  s.replace_mappings(vec![MappingRow {
    birdnet_id:      0,
    scientific_name: Some("Turdus migratorius".into()),
    qid:             Some("Q25334".into()),
  }])
  .await
  .unwrap();
  s.upsert_snapshot(SourceSnapshot {
    source:        SourceKey::WikidataSpecies,
    raw_content:   "{}".into(),
    fetched_at:    "2025-06-01T00:00:00Z".parse().unwrap(),
    version_token: None,
    version_date:  None,
  })
  .await
  .unwrap();

  let exported_at = "2025-06-02T00:00:00Z".parse().unwrap();
  let first = build_export(&s, exported_at).await.unwrap();
  let second = build_export(&s, exported_at).await.unwrap();

  assert_eq!(
    first.to_pretty_json().unwrap(),
    second.to_pretty_json().unwrap()
  );
  assert_eq!(first.metadata.row_count, 1);

  // Only sources with a stored snapshot appear; the query-backed source
  // carries its query text.
  assert_eq!(first.metadata.sources.len(), 1);
  let provenance = &first.metadata.sources[0];
  assert_eq!(provenance.key, SourceKey::WikidataSpecies);
  assert!(provenance.sparql_query.is_some());
  assert!(provenance.version_token.is_none());
}

#[tokio::test]
async fn load_export_replaces_the_mapping_table() {
  let s = store().await;
  s.replace_mappings(vec![MappingRow {
    birdnet_id:      9,
    scientific_name: Some("stale".into()),
    qid:             None,
  }])
  .await
  .unwrap();

  let exported_at = "2025-06-02T00:00:00Z".parse().unwrap();
  let mut export = build_export(&s, exported_at).await.unwrap();
  export.data = vec![
    MappingRow {
      birdnet_id:      0,
      scientific_name: Some("Turdus migratorius".into()),
      qid:             Some("Q25334".into()),
    },
    MappingRow {
      birdnet_id:      1,
      scientific_name: Some("Sialia sialis".into()),
      qid:             None,
    },
  ];

  assert_eq!(load_export(&s, &export).await.unwrap(), 2);
  let rows = s.all_mappings().await.unwrap();
  assert_eq!(rows.len(), 2);
  assert_eq!(rows[0].qid.as_deref(), Some("Q25334"));
}

// ─── Enrichment cache ────────────────────────────────────────────────────────

fn cache(s: SqliteStore, tag: &str) -> EnrichmentCache<SqliteStore> {
  let throttle = FileThrottle::new(
    format!("{THROTTLE_NAMESPACE}-{tag}"),
    Duration::from_millis(10),
    throttle_dir(tag),
  )
  .unwrap();
  EnrichmentCache::new(s, sparql(), throttle, CacheOptions::default())
    .unwrap()
}

#[tokio::test]
async fn malformed_qid_fails_before_any_network_call() {
  let s = store().await;
  let cache = cache(s, "bad-qid");

  for bad in ["123", "Qabc", "", "P225"] {
    let result = cache.fetch_and_refresh(0, bad).await;
    assert!(
      matches!(
        result,
        Err(Error::Core(birdatlas_core::Error::InvalidEntityId(_)))
      ),
      "accepted {bad:?}"
    );
  }
}

#[tokio::test]
async fn fresh_cache_hits_skip_the_network() {
  let s = store().await;
  let record = EnrichmentRecord {
    common_name: Some("American Robin".into()),
    scientific_name: Some("Turdus migratorius".into()),
    ..Default::default()
  };
  s.put_cached_enrichment(
    0,
    Some(record.clone()),
    Utc::now() + chrono::Duration::days(10),
  )
  .await
  .unwrap();

  // The endpoint is dead: if this tried the network it would error.
  let cache = cache(s, "fresh-hit");
  let fetched = cache.fetch_and_refresh(0, "Q25334").await.unwrap();
  assert_eq!(fetched, Some(record));
}

#[tokio::test]
async fn cached_no_data_outcome_is_served_while_fresh() {
  let s = store().await;
  s.put_cached_enrichment(7, None, Utc::now() + chrono::Duration::days(10))
    .await
    .unwrap();

  let cache = cache(s, "no-data");
  assert_eq!(cache.fetch_and_refresh(7, "Q1").await.unwrap(), None);
}

#[tokio::test]
async fn stale_entries_are_refetched_and_errors_do_not_poison_the_cache() {
  let s = store().await;
  let stale_record = EnrichmentRecord {
    common_name: Some("American Robin".into()),
    ..Default::default()
  };
  s.put_cached_enrichment(
    0,
    Some(stale_record.clone()),
    Utc::now() - chrono::Duration::days(1),
  )
  .await
  .unwrap();

  let cache = cache(s.clone(), "stale");
  // The refetch hits the dead endpoint: a transport error, surfaced.
  let result = cache.fetch_and_refresh(0, "Q25334").await;
  assert!(matches!(result, Err(Error::Transport(_))));

  // The failed fetch must not have overwritten the stale entry.
  let entry = s.get_cached_enrichment(0).await.unwrap().unwrap();
  assert_eq!(entry.record, Some(stale_record));
  assert!(!entry.is_fresh(Utc::now()));
}
