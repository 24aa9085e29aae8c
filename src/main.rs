//! CLI entry point for the congestion pricing audit.
//!
//! Provides subcommands for running the full audit over a normalized trip
//! table, running ghost trip detection alone, and listing the zone set.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use congestion_audit::analyzers::analyzer::{ExecutionOptions, run_audit, run_classify};
use congestion_audit::config::{AuditConfig, DEFAULT_TOP_K, ZoneSet, default_cutoff};
use congestion_audit::output::print_pretty;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "congestion_audit")]
#[command(about = "Audit taxi trips for ghost records and toll compliance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify trips, audit zone compliance and write all outputs
    Audit {
        /// Normalized trip table (.csv or .csv.gz)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Directory to write tables and the summary into
        #[arg(short, long, default_value = "outputs")]
        output_dir: PathBuf,

        /// Toll start date; trips picked up on or after it are audited
        #[arg(long, default_value_t = default_cutoff())]
        cutoff: NaiveDate,

        /// Number of leakage pickup locations to report
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Optional: JSON file listing the zone ids to use instead of the built-in set
        #[arg(long)]
        zones_file: Option<PathBuf>,

        /// Records per chunk (0 = whole table at once)
        #[arg(long, default_value_t = ExecutionOptions::default().chunk_size)]
        chunk_size: usize,

        /// Maximum number of chunks processed concurrently
        #[arg(short, long, default_value_t = ExecutionOptions::default().concurrency)]
        concurrency: usize,

        /// Gzip compress output tables
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Split trips into clean and ghost tables only
    Classify {
        /// Normalized trip table (.csv or .csv.gz)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Directory to write tables into
        #[arg(short, long, default_value = "outputs")]
        output_dir: PathBuf,

        /// Gzip compress output tables
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// List the congestion zone ids
    Zones {
        /// Optional: JSON file listing the zone ids to use instead of the built-in set
        #[arg(long)]
        zones_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/congestion_audit.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("congestion_audit.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Audit {
            input,
            output_dir,
            cutoff,
            top_k,
            zones_file,
            chunk_size,
            concurrency,
            gzip,
        } => {
            let config = AuditConfig::default()
                .with_zones(load_zones(zones_file.as_deref())?)
                .with_cutoff(cutoff)
                .with_top_k(top_k);
            let options = ExecutionOptions {
                chunk_size,
                concurrency,
            };

            let report = run_audit(&input, &output_dir, &config, &options, gzip).await?;
            print_pretty(&report);
        }
        Commands::Classify {
            input,
            output_dir,
            gzip,
        } => {
            let counts = run_classify(&input, &output_dir, gzip)?;
            info!(
                clean = counts.clean(),
                ghost = counts.ghost,
                output_dir = %output_dir.display(),
                "Classification written"
            );
        }
        Commands::Zones { zones_file } => {
            let zones = load_zones(zones_file.as_deref())?;
            let ids: Vec<u32> = zones.iter().collect();
            info!(count = zones.len(), zones = ?ids, "Congestion zone");
        }
    }

    Ok(())
}

fn load_zones(path: Option<&Path>) -> Result<ZoneSet> {
    match path {
        Some(path) => {
            let zones = ZoneSet::load(path)?;
            info!(path = %path.display(), count = zones.len(), "Loaded zone set");
            Ok(zones)
        }
        None => Ok(ZoneSet::congestion_zone()),
    }
}
