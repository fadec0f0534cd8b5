//! `birdatlas` — build and query the BirdNET → Wikidata species mapping.
//!
//! Reads `birdatlas.toml` (or the path given with `--config`), opens the
//! SQLite store, and runs one subcommand: refreshing source snapshots,
//! importing them, building the mapping table step by step, exporting it,
//! or fetching enrichment records through the throttled cache.

mod settings;

use std::{path::PathBuf, str::FromStr as _, time::Duration};

use anyhow::Context as _;
use birdatlas_core::{
  export::MappingExport,
  source::{SOURCES, SourceKey, source},
  store::TaxonomyStore as _,
};
use birdatlas_pipeline::{
  builder::{MappingBuilder, MappingStep, StepReport},
  cache::{CacheOptions, EnrichmentCache, THROTTLE_NAMESPACE},
  export::{build_export, load_export},
  fetch::SourceFetcher,
  import::import_source,
  sparql::SparqlClient,
  throttle::FileThrottle,
};
use birdatlas_store_sqlite::SqliteStore;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use settings::Settings;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
  name = "birdatlas",
  about = "BirdNET species mapping and Wikidata enrichment"
)]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "birdatlas.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Inspect and refresh the configured sources.
  Sources {
    #[command(subcommand)]
    command: SourcesCommand,
  },
  /// Build, export, and load the mapping table.
  Mapping {
    #[command(subcommand)]
    command: MappingCommand,
  },
  /// Print the mapping row for a BirdNET id.
  Lookup { birdnet_id: u32 },
  /// Print the enrichment record for a BirdNET id, fetching from
  /// Wikidata unless a fresh cache entry exists.
  Enrich {
    birdnet_id: u32,
    /// Wikidata Q-id; defaults to the one in the mapping table.
    #[arg(long)]
    qid: Option<String>,
  },
  /// Enrichment cache maintenance.
  Cache {
    #[command(subcommand)]
    command: CacheCommand,
  },
}

#[derive(Subcommand)]
enum SourcesCommand {
  /// Compare stored snapshots against the live remote versions.
  Status,
  /// Fetch the latest content and replace the stored snapshot(s).
  Update {
    /// Source key; all sources when omitted.
    key: Option<String>,
  },
  /// Parse stored snapshot(s) into the structured tables.
  Import {
    /// Source key; all sources when omitted.
    key: Option<String>,
  },
}

#[derive(Subcommand)]
enum MappingCommand {
  /// List the build steps in order.
  Steps,
  /// Run the full step sequence, stopping at the first failure.
  Build,
  /// Run a single step by name.
  Step { name: String },
  /// Write the mapping export document as JSON.
  Export {
    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Replace the mapping table from an export document.
  Load { file: PathBuf },
}

#[derive(Subcommand)]
enum CacheCommand {
  /// Remove every cached enrichment record.
  Clear,
}

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store = SqliteStore::open(&settings.db_path)
    .await
    .with_context(|| {
      format!("failed to open store at {:?}", settings.db_path)
    })?;

  match cli.command {
    Command::Sources { command } => {
      run_sources(command, &store, &settings).await
    }
    Command::Mapping { command } => {
      run_mapping(command, &store, &settings).await
    }
    Command::Lookup { birdnet_id } => {
      match store.get_mapping(birdnet_id).await? {
        Some(row) => println!("{}", serde_json::to_string_pretty(&row)?),
        None => println!("no mapping for BirdNET id {birdnet_id}"),
      }
      Ok(())
    }
    Command::Enrich { birdnet_id, qid } => {
      run_enrich(birdnet_id, qid, &store, &settings).await
    }
    Command::Cache { command: CacheCommand::Clear } => {
      let removed = store.clear_enrichment_cache().await?;
      println!("removed {removed} cached records");
      Ok(())
    }
  }
}

// ─── Sources ──────────────────────────────────────────────────────────────────

/// Resolve an optional key argument into the sources to operate on.
fn selected_sources(
  key: Option<&str>,
) -> anyhow::Result<Vec<&'static birdatlas_core::source::Source>> {
  match key {
    Some(key) => Ok(vec![source(SourceKey::from_str(key)?)]),
    None => Ok(SOURCES.iter().collect()),
  }
}

async fn run_sources(
  command: SourcesCommand,
  store: &SqliteStore,
  settings: &Settings,
) -> anyhow::Result<()> {
  match command {
    SourcesCommand::Status => {
      let fetcher = SourceFetcher::new(&settings.sparql_endpoint)?;
      for source in &SOURCES {
        let status = fetcher.status(store, source).await?;
        println!("{} — {}", status.key, status.label);
        println!(
          "  local:  {} ({})",
          status.local_token.as_deref().unwrap_or("-"),
          status
            .fetched_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never fetched".to_owned()),
        );
        println!(
          "  remote: {}{}",
          status.remote_token.as_deref().unwrap_or("-"),
          if status.is_new { "  [update available]" } else { "" },
        );
      }
      Ok(())
    }
    SourcesCommand::Update { key } => {
      let fetcher = SourceFetcher::new(&settings.sparql_endpoint)?;
      for source in selected_sources(key.as_deref())? {
        let snapshot = fetcher.refresh(store, source).await?;
        println!(
          "{}: {} bytes fetched",
          source.key,
          snapshot.raw_content.len()
        );
      }
      Ok(())
    }
    SourcesCommand::Import { key } => {
      for source in selected_sources(key.as_deref())? {
        let report = import_source(store, source.key).await?;
        println!(
          "{}: {} rows imported, {} skipped",
          report.source, report.inserted, report.skipped
        );
        for warning in &report.warnings {
          println!("  warning: {warning}");
        }
      }
      Ok(())
    }
  }
}

// ─── Mapping ──────────────────────────────────────────────────────────────────

fn print_report(report: &StepReport) {
  let marker = if report.ok { "ok" } else { "FAILED" };
  println!("[{marker}] {}: {}", report.step, report.message);
}

async fn run_mapping(
  command: MappingCommand,
  store: &SqliteStore,
  settings: &Settings,
) -> anyhow::Result<()> {
  match command {
    MappingCommand::Steps => {
      for step in MappingStep::SEQUENCE {
        println!("{} — {}", step.name(), step.description());
      }
      Ok(())
    }
    MappingCommand::Build => {
      let builder = MappingBuilder::new(
        store.clone(),
        SparqlClient::new(&settings.sparql_endpoint)?,
      );
      let reports = builder.run_all().await;
      for report in &reports {
        print_report(report);
      }
      if let Some(failed) = reports.iter().find(|r| !r.ok) {
        anyhow::bail!("mapping build stopped at step {}", failed.step);
      }
      Ok(())
    }
    MappingCommand::Step { name } => {
      let step = MappingStep::from_str(&name)?;
      let builder = MappingBuilder::new(
        store.clone(),
        SparqlClient::new(&settings.sparql_endpoint)?,
      );
      let report = builder.run_step(step).await;
      print_report(&report);
      if let Some(next) = report.next {
        println!("next step: {next}");
      }
      if !report.ok {
        anyhow::bail!("step {} failed", report.step);
      }
      Ok(())
    }
    MappingCommand::Export { output } => {
      let export = build_export(store, Utc::now()).await?;
      let json = export.to_pretty_json()?;
      match output {
        Some(path) => {
          std::fs::write(&path, json)
            .with_context(|| format!("failed to write {path:?}"))?;
          println!(
            "wrote {} rows to {}",
            export.metadata.row_count,
            path.display()
          );
        }
        None => println!("{json}"),
      }
      Ok(())
    }
    MappingCommand::Load { file } => {
      let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {file:?}"))?;
      let export = MappingExport::from_json(&raw)?;
      let loaded = load_export(store, &export).await?;
      println!("loaded {loaded} mapping rows");
      Ok(())
    }
  }
}

// ─── Enrich ───────────────────────────────────────────────────────────────────

async fn run_enrich(
  birdnet_id: u32,
  qid: Option<String>,
  store: &SqliteStore,
  settings: &Settings,
) -> anyhow::Result<()> {
  let qid = match qid {
    Some(qid) => qid,
    None => store
      .get_mapping(birdnet_id)
      .await?
      .and_then(|row| row.qid)
      .with_context(|| {
        format!("no Wikidata Q-id mapped for BirdNET id {birdnet_id}")
      })?,
  };

  let throttle = FileThrottle::new(
    THROTTLE_NAMESPACE,
    Duration::from_millis(settings.request_interval_ms),
    &settings.throttle_dir,
  )?;
  let cache = EnrichmentCache::new(
    store.clone(),
    SparqlClient::new(&settings.sparql_endpoint)?,
    throttle,
    CacheOptions {
      language: settings.language.clone(),
      ttl_min:  Duration::from_secs(
        settings.cache_ttl_min_days * 24 * 60 * 60,
      ),
      ttl_max:  Duration::from_secs(
        settings.cache_ttl_max_days * 24 * 60 * 60,
      ),
    },
  )?;

  match cache.fetch_and_refresh(birdnet_id, &qid).await {
    Ok(Some(record)) => {
      println!("{}", serde_json::to_string_pretty(&record)?)
    }
    Ok(None) => println!("Wikidata has no data for {qid}"),
    Err(e) => {
      tracing::debug!(error = %e, "enrichment fetch failed");
      anyhow::bail!("could not fetch data for BirdNET id {birdnet_id}");
    }
  }
  Ok(())
}
