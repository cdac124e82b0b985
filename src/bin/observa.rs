use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use observa::{DirStore, ObservationStore, Rollover, StoreConfig};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Parser)]
#[command(name = "observa", version, about = "Time-partitioned observation store")]
struct Cli {
    /// Store root directory
    #[arg(long, default_value = "./observa-data")]
    root: PathBuf,

    /// JSON store config (timezone, parallel_scans, max_scan_threads, sync_writes)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Triple {
    #[arg(long)]
    sensor: String,
    #[arg(long)]
    property: String,
    #[arg(long)]
    feature: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a (sensor, property, feature) triple
    Register {
        #[command(flatten)]
        triple: Triple,
        /// YEAR, MONTH, DAY, HOUR or MINUTE
        #[arg(long, default_value = "DAY")]
        rollover: Rollover,
    },
    /// Store a payload at a point in time
    Write {
        #[command(flatten)]
        triple: Triple,
        /// RFC 3339 timestamp (defaults to now)
        #[arg(long, value_parser = parse_time)]
        time: Option<OffsetDateTime>,
        #[arg(long, conflicts_with = "file")]
        payload: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print payloads stamped in [from, to)
    Query {
        #[command(flatten)]
        triple: Triple,
        #[arg(long, value_parser = parse_time)]
        from: OffsetDateTime,
        #[arg(long, value_parser = parse_time)]
        to: OffsetDateTime,
    },
    /// List registrations
    Registrations,
    /// List partitions holding data
    Partitions,
}

fn parse_time(value: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|err| format!("{value}: {err}"))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StoreConfig::default(),
    };
    let backend = Arc::new(
        DirStore::open_with_config(&cli.root, &config)
            .with_context(|| format!("opening store at {}", cli.root.display()))?,
    );
    let store = ObservationStore::open(backend.clone(), config)?;
    let mut out = io::BufWriter::new(io::stdout());

    match cli.command {
        Commands::Register { triple, rollover } => {
            let registration =
                store.register(&triple.sensor, &triple.property, &triple.feature, rollover)?;
            writeln!(out, "{registration}")?;
        }
        Commands::Write {
            triple,
            time,
            payload,
            file,
        } => {
            let bytes = match (payload, file) {
                (Some(text), None) => text.into_bytes(),
                (None, Some(path)) => fs::read(&path)
                    .with_context(|| format!("reading payload {}", path.display()))?,
                _ => bail!("one of --payload or --file is required"),
            };
            let at = time.unwrap_or_else(OffsetDateTime::now_utc);
            let key = store.write(
                &triple.sensor,
                &triple.property,
                &triple.feature,
                at,
                &bytes,
            )?;
            writeln!(out, "key={key}")?;
        }
        Commands::Query { triple, from, to } => {
            let mut payloads: Vec<_> = store
                .query_range(&triple.sensor, &triple.property, &triple.feature, from, to)?
                .into_iter()
                .collect();
            payloads.sort();
            for payload in &payloads {
                writeln!(out, "{}", String::from_utf8_lossy(payload))?;
            }
            writeln!(out, "count={}", payloads.len())?;
        }
        Commands::Registrations => {
            for registration in store.registrations() {
                writeln!(out, "{registration}")?;
            }
        }
        Commands::Partitions => {
            for key in backend.partition_keys()? {
                writeln!(out, "{key}")?;
            }
        }
    }

    out.flush()?;
    store.close()?;
    Ok(())
}
