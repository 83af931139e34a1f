#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the property geocoding pipeline.

mod terminal;

use std::path::{Path, PathBuf};
use std::str::FromStr as _;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use property_geo_cli_utils::{MultiProgress, init_logger, print_line};
use property_geo_database::import::import_csv;
use property_geo_database::records_db::DuckDbStore;
use property_geo_database::RecordStore;
use property_geo_database_models::{FetchOrder, RecordKind, ResolutionStatus};
use property_geo_geocoder::service_registry::{all_services, build_providers, enabled_services};
use property_geo_resolver::config::PipelineConfig;
use property_geo_resolver::orchestrator::{ResolveMode, RunOptions};
use property_geo_resolver::pool::ProviderPool;
use property_geo_resolver::report::write_summary;
use property_geo_resolver::{Pipeline, ResolveError};
use strum::IntoEnumIterator as _;

use crate::terminal::TerminalProgress;

/// Environment variable naming the `DuckDB` file when `--db` is omitted.
const DB_ENV: &str = "PROPERTY_GEO_DB";

#[derive(Parser)]
#[command(
    name = "property_geo_resolver",
    about = "Geocode property listings and transactions"
)]
struct Cli {
    /// Path to the `DuckDB` record store (defaults to `$PROPERTY_GEO_DB`)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Which records to work on: `listings` or `transactions`
    #[arg(long, global = true, default_value = "listings", value_parser = parse_table)]
    table: RecordKind,
    /// Pipeline config TOML (defaults to the built-in Malaysia config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve coordinates for pending, failed or suspect records
    Resolve {
        /// `pending` (first pass), `failed` (retry) or `suspect` (repair)
        #[arg(long, default_value = "pending", value_parser = ResolveMode::from_str)]
        mode: ResolveMode,
        /// Records fetched per batch (defaults to `run.batch_size`)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Maximum number of records to process
        #[arg(long)]
        limit: Option<u64>,
        /// Walk record ids `asc` or `desc`
        #[arg(long, default_value = "asc", value_parser = FetchOrder::from_str)]
        order: FetchOrder,
        /// Reject results that fail the region distance check
        #[arg(long)]
        strict: bool,
        /// Also write the run summary to this file
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Flag resolved records that sit too far from their region center
    Audit {
        /// Distance threshold in km (defaults to
        /// `validation.max_region_distance_km`)
        #[arg(long)]
        threshold_km: Option<f64>,
        /// Records fetched per batch (defaults to `run.batch_size`)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Also write the audit report to this file
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Re-geocode resolved records whose address is precise enough to
    /// improve on a region-level coordinate
    Improve {
        /// Records fetched per batch (defaults to `run.batch_size`)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Maximum number of records to process
        #[arg(long)]
        limit: Option<u64>,
        /// Also write the run summary to this file
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Show record counts per resolution status
    Status,
    /// List configured geocoding services
    Services,
    /// Load records from a CSV file (`id,address,region`) as pending
    Import {
        /// CSV file to import
        csv: PathBuf,
    },
}

fn parse_table(value: &str) -> Result<RecordKind, String> {
    RecordKind::iter()
        .find(|kind| {
            kind.table_name().eq_ignore_ascii_case(value) || kind.as_ref().eq_ignore_ascii_case(value)
        })
        .ok_or_else(|| format!("unknown table '{value}' (expected listings or transactions)"))
}

fn db_path(cli_path: Option<PathBuf>) -> Result<PathBuf, ResolveError> {
    cli_path
        .or_else(|| std::env::var_os(DB_ENV).map(PathBuf::from))
        .ok_or_else(|| ResolveError::Config {
            message: format!("no database given; pass --db or set {DB_ENV}"),
        })
}

/// Builds the pipeline for a record pass over the enabled providers, with
/// terminal progress labelled `label`.
async fn build_pipeline(
    config: PipelineConfig,
    db: &Path,
    kind: RecordKind,
    multi: &MultiProgress,
    label: &str,
) -> Result<Pipeline, Box<dyn std::error::Error>> {
    let contact = std::env::var(&config.http.contact_env).ok();
    let client = reqwest::Client::builder()
        .user_agent(config.http.user_agent_with(contact.as_deref()))
        .timeout(config.http.timeout())
        .build()?;

    let providers = build_providers(
        &enabled_services(),
        &client,
        &config.country_context(),
        |name| std::env::var(name).ok(),
    );
    let pool = ProviderPool::new(providers, config.degenerate.clone());
    log::info!("Using provider(s): {}", pool.provider_ids().join(", "));

    let store: Arc<dyn RecordStore> = Arc::new(DuckDbStore::open(db, kind)?);
    let mut pipeline =
        Pipeline::new(config, pool, store)?.with_progress(TerminalProgress::new(multi, label));

    let warmed = pipeline.warm_centers().await?;
    if warmed > 0 {
        log::info!("Loaded {warmed} region center(s) from earlier runs");
    }
    Ok(pipeline)
}

fn emit(multi: &MultiProgress, text: &str, summary: Option<&Path>) -> Result<(), ResolveError> {
    print_line(multi, text.trim_end())?;
    if let Some(path) = summary {
        write_summary(path, text)?;
    }
    Ok(())
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;
    let kind = cli.table;

    match cli.command {
        Commands::Services => {
            println!("{:<12} {:<8} {:<9} NAME", "ID", "PRIORITY", "ENABLED");
            println!("{}", "-".repeat(60));
            for service in &all_services() {
                let note = match service.required_env() {
                    Some(var) if std::env::var(var).is_ok_and(|v| !v.trim().is_empty()) => {
                        String::new()
                    }
                    Some(var) => format!(" (needs {var})"),
                    None => String::new(),
                };
                println!(
                    "{:<12} {:<8} {:<9} {}{note}",
                    service.id, service.priority, service.enabled, service.name
                );
            }
        }
        Commands::Import { csv } => {
            let db = db_path(cli.db)?;
            let store = DuckDbStore::open(&db, kind)?;
            let start = Instant::now();
            let count = import_csv(&store, &csv)?;
            log::info!(
                "Imported {count} record(s) into {} in {:.1}s",
                kind.table_name(),
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Status => {
            let db = db_path(cli.db)?;
            let store = DuckDbStore::open(&db, kind)?;
            let counts = store.count_by_status().await?;
            println!("{:<10} COUNT ({})", "STATUS", kind.table_name());
            println!("{}", "-".repeat(30));
            for status in ResolutionStatus::iter() {
                println!(
                    "{:<10} {}",
                    status.as_ref(),
                    counts.get(&status).copied().unwrap_or(0)
                );
            }
        }
        Commands::Resolve {
            mode,
            batch_size,
            limit,
            order,
            strict,
            summary,
        } => {
            let db = db_path(cli.db)?;
            let mut options = RunOptions::from_config(&config, mode);
            options.batch_size = batch_size.unwrap_or(options.batch_size);
            options.limit = limit;
            options.order = order;
            options.strict |= strict;

            let mut pipeline =
                build_pipeline(config, &db, kind, &multi, &format!("Resolving {mode}")).await?;
            let result = pipeline.resolve(&options).await?;
            emit(&multi, &result.render(), summary.as_deref())?;
        }
        Commands::Audit {
            threshold_km,
            batch_size,
            summary,
        } => {
            let db = db_path(cli.db)?;
            let batch_size = batch_size.unwrap_or(config.run.batch_size);
            let mut pipeline = build_pipeline(config, &db, kind, &multi, "Auditing").await?;
            let report = pipeline.audit(threshold_km, batch_size).await?;
            emit(&multi, &report.render(), summary.as_deref())?;
        }
        Commands::Improve {
            batch_size,
            limit,
            summary,
        } => {
            let db = db_path(cli.db)?;
            let batch_size = batch_size.unwrap_or(config.run.batch_size);
            let mut pipeline = build_pipeline(config, &db, kind, &multi, "Improving").await?;
            let result = pipeline.improve(batch_size, limit).await?;
            emit(&multi, &result.render(), summary.as_deref())?;
        }
    }

    Ok(())
}
