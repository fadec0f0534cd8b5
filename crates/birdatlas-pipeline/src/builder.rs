//! The mapping build state machine.
//!
//! A fixed, ordered sequence of idempotent steps turns the three
//! structured tables into the consolidated mapping table. Each step can be
//! run individually (for an external driver sequencing one step at a time)
//! or through [`MappingBuilder::run_all`]; every failure is converted into
//! a [`StepReport`] so a run can stop at the failing step and later resume
//! by re-running it.

use std::{fmt, str::FromStr, time::Duration};

use birdatlas_core::{
  entity::EntityId,
  sparql::{bound_value, escape_literal, qid_from_entity_uri},
  store::{IndexOutcome, TaxonomyStore, WikidataIndex},
};

use crate::{Error, Result, sparql::SparqlClient};

/// How many scientific names go into one lookup query.
pub const QID_BATCH_SIZE: usize = 50;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Steps ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingStep {
  DropTable,
  CreateTable,
  IndexScientificName,
  IndexEbirdId,
  SeedSpecies,
  LinkScientificNames,
  LinkEbirdIds,
  FetchQidsTruthy,
  FetchQidsAll,
}

impl MappingStep {
  /// The declared build order. `run_all` executes exactly this sequence.
  pub const SEQUENCE: [MappingStep; 9] = [
    MappingStep::DropTable,
    MappingStep::CreateTable,
    MappingStep::IndexScientificName,
    MappingStep::IndexEbirdId,
    MappingStep::SeedSpecies,
    MappingStep::LinkScientificNames,
    MappingStep::LinkEbirdIds,
    MappingStep::FetchQidsTruthy,
    MappingStep::FetchQidsAll,
  ];

  pub fn name(self) -> &'static str {
    match self {
      MappingStep::DropTable => "drop_table",
      MappingStep::CreateTable => "create_table",
      MappingStep::IndexScientificName => "index_scientific_name",
      MappingStep::IndexEbirdId => "index_ebird_id",
      MappingStep::SeedSpecies => "seed_species",
      MappingStep::LinkScientificNames => "link_scientific_names",
      MappingStep::LinkEbirdIds => "link_ebird_ids",
      MappingStep::FetchQidsTruthy => "fetch_qids_truthy",
      MappingStep::FetchQidsAll => "fetch_qids_all",
    }
  }

  pub fn description(self) -> &'static str {
    match self {
      MappingStep::DropTable => "Drop the previous mapping table",
      MappingStep::CreateTable => "Create an empty mapping table",
      MappingStep::IndexScientificName => {
        "Index the Wikidata species table by scientific name"
      }
      MappingStep::IndexEbirdId => {
        "Index the Wikidata species table by eBird id"
      }
      MappingStep::SeedSpecies => {
        "Seed the mapping table from the BirdNET species list"
      }
      MappingStep::LinkScientificNames => {
        "Fill Q-ids by exact scientific-name match"
      }
      MappingStep::LinkEbirdIds => {
        "Fill remaining Q-ids via eBird ids"
      }
      MappingStep::FetchQidsTruthy => {
        "Look up remaining names on Wikidata (direct statements)"
      }
      MappingStep::FetchQidsAll => {
        "Look up remaining names on Wikidata (all statement values)"
      }
    }
  }

  /// The step after this one in [`Self::SEQUENCE`], if any.
  pub fn next(self) -> Option<MappingStep> {
    let position =
      Self::SEQUENCE.iter().position(|s| *s == self).unwrap_or(0);
    Self::SEQUENCE.get(position + 1).copied()
  }
}

impl fmt::Display for MappingStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for MappingStep {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Self::SEQUENCE
      .into_iter()
      .find(|step| step.name() == s)
      .ok_or_else(|| Error::UnknownStep(s.to_owned()))
  }
}

/// Result of one step execution.
#[derive(Debug, Clone)]
pub struct StepReport {
  pub step:    MappingStep,
  pub ok:      bool,
  pub message: String,
  /// The step an external driver should run next to continue the build.
  pub next:    Option<MappingStep>,
}

// ─── Name lookup queries ─────────────────────────────────────────────────────

/// Which P225 statements a fallback lookup matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameMatch {
  /// Directly asserted ("truthy") values only — the stricter, safer pass.
  Truthy,
  /// Every statement value, sourced or deprecated included. A superset of
  /// [`NameMatch::Truthy`] with more false-positive risk, so it runs last.
  AllStatements,
}

impl NameMatch {
  fn property_path(self) -> &'static str {
    match self {
      NameMatch::Truthy => "wdt:P225",
      NameMatch::AllStatements => "p:P225/ps:P225",
    }
  }

  fn describe(self) -> &'static str {
    match self {
      NameMatch::Truthy => "directly asserted scientific names",
      NameMatch::AllStatements => "all scientific-name statement values",
    }
  }
}

fn name_lookup_query(mode: NameMatch, names: &[String]) -> String {
  let mut values = String::new();
  for name in names {
    values.push_str(" \"");
    values.push_str(&escape_literal(name));
    values.push('"');
  }
  format!(
    "SELECT ?item ?scientificName WHERE {{\n    \
       ?item {path} ?scientificName .\n    \
       VALUES ?scientificName {{{values} }}\n}}",
    path = mode.property_path(),
  )
}

// ─── Builder ─────────────────────────────────────────────────────────────────

pub struct MappingBuilder<S> {
  store:  S,
  sparql: SparqlClient,
}

impl<S: TaxonomyStore> MappingBuilder<S> {
  pub fn new(store: S, sparql: SparqlClient) -> Self {
    Self { store, sparql }
  }

  /// Run one step, converting any failure into an `ok: false` report.
  pub async fn run_step(&self, step: MappingStep) -> StepReport {
    match self.execute(step).await {
      Ok(message) => {
        tracing::info!(step = step.name(), "{message}");
        StepReport { step, ok: true, message, next: step.next() }
      }
      Err(e) => {
        tracing::error!(step = step.name(), error = %e, "mapping step failed");
        StepReport { step, ok: false, message: e.to_string(), next: step.next() }
      }
    }
  }

  /// Run the full sequence in order, stopping at the first failure.
  pub async fn run_all(&self) -> Vec<StepReport> {
    let mut reports = Vec::new();
    for step in MappingStep::SEQUENCE {
      let report = self.run_step(step).await;
      let failed = !report.ok;
      reports.push(report);
      if failed {
        break;
      }
    }
    reports
  }

  async fn execute(&self, step: MappingStep) -> Result<String> {
    match step {
      MappingStep::DropTable => {
        self.store.drop_mapping_table().await.map_err(Error::store)?;
        Ok("Dropped previous mapping table (if any).".into())
      }
      MappingStep::CreateTable => {
        self.store.create_mapping_table().await.map_err(Error::store)?;
        Ok("Created mapping table.".into())
      }
      MappingStep::IndexScientificName => {
        self.ensure_index(WikidataIndex::ScientificName).await
      }
      MappingStep::IndexEbirdId => {
        self.ensure_index(WikidataIndex::EbirdId).await
      }
      MappingStep::SeedSpecies => {
        let inserted = self
          .store
          .seed_mapping_from_species()
          .await
          .map_err(Error::store)?;
        Ok(format!("Seeded {inserted} species into the mapping table."))
      }
      MappingStep::LinkScientificNames => {
        let updated = self
          .store
          .link_mapping_by_scientific_name()
          .await
          .map_err(Error::store)?;
        Ok(format!("Matched {updated} rows by scientific name."))
      }
      MappingStep::LinkEbirdIds => {
        let updated = self
          .store
          .link_mapping_by_ebird_id()
          .await
          .map_err(Error::store)?;
        Ok(format!("Matched {updated} rows by eBird id."))
      }
      MappingStep::FetchQidsTruthy => {
        self.fetch_missing_qids(NameMatch::Truthy).await
      }
      MappingStep::FetchQidsAll => {
        self.fetch_missing_qids(NameMatch::AllStatements).await
      }
    }
  }

  async fn ensure_index(&self, index: WikidataIndex) -> Result<String> {
    let outcome = self
      .store
      .ensure_wikidata_index(index)
      .await
      .map_err(Error::store)?;
    let noun = match index {
      WikidataIndex::ScientificName => "scientific name",
      WikidataIndex::EbirdId => "eBird id",
    };
    Ok(match outcome {
      IndexOutcome::Created => format!("Created index on {noun}."),
      IndexOutcome::AlreadyPresent => {
        format!("Index on {noun} already present.")
      }
    })
  }

  /// Chase Q-ids for rows no local join resolved, in batches of
  /// [`QID_BATCH_SIZE`] names per query. A failed batch is skipped, not
  /// fatal — whatever the other batches resolve still lands.
  async fn fetch_missing_qids(&self, mode: NameMatch) -> Result<String> {
    let missing = self
      .store
      .unresolved_scientific_names()
      .await
      .map_err(Error::store)?;
    if missing.is_empty() {
      return Ok(format!(
        "Queried Wikidata for {}: none missing.",
        mode.describe()
      ));
    }

    let mut updated = 0u64;
    for batch in missing.chunks(QID_BATCH_SIZE) {
      let query = name_lookup_query(mode, batch);
      let doc = match self.sparql.post_results(&query, LOOKUP_TIMEOUT).await
      {
        Ok(doc) => doc,
        Err(e) => {
          tracing::warn!(error = %e, batch = batch.len(),
            "skipping failed Q-id lookup batch");
          continue;
        }
      };

      for binding in &doc.results.bindings {
        let Some(name) = bound_value(binding, "scientificName") else {
          continue;
        };
        let Some(qid) = bound_value(binding, "item")
          .and_then(qid_from_entity_uri)
          .and_then(|q| q.parse::<EntityId>().ok())
        else {
          continue;
        };
        updated += self
          .store
          .assign_qid(name.to_owned(), qid)
          .await
          .map_err(Error::store)?;
      }
    }

    Ok(format!(
      "Queried Wikidata for {}: {updated} rows updated.",
      mode.describe()
    ))
  }
}
