//! CLI entry point for the transit ELT pipeline.
//!
//! Each stage can be run on its own; `run` downloads a fresh export and runs
//! every stage in order, exiting non-zero on the first failure.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use transit_elt::{
    bronze::ingest_raw_data,
    config::ConfigArgs,
    download::{SourceClient, download_dataset},
    gold::{DashboardSummary, GoldViews, aggregate_data, load_views},
    pipeline::{record_stage, run_pipeline},
    silver::clean_data,
    store::open_store,
};

#[derive(Parser)]
#[command(name = "transit_elt")]
#[command(about = "Bronze/silver/gold ELT pipeline for Chicago taxi trips", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the latest trips into the raw CSV
    Download,
    /// Load the raw CSV into the bronze collection
    Ingest,
    /// Clean bronze into the silver snapshot and collection
    Clean,
    /// Compute the gold views from the silver snapshot
    Aggregate,
    /// Download, then run every stage in order
    Run,
    /// Print headline metrics from the gold views
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/transit_elt.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("transit_elt.log"));

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
    let config = cli.config.into_config()?;

    match cli.command {
        Commands::Download => {
            let client = SourceClient::from_config(&config)?;
            match download_dataset(&client, &config).await? {
                Some(path) => info!(path = %path.display(), "Raw export ready"),
                None => anyhow::bail!("download failed; see log for details"),
            }
        }
        Commands::Ingest => {
            let store = open_store(&config).await?;
            let stats = ingest_raw_data(&config.raw_csv, store.as_ref()).await?;
            record_stage(&config, &stats)?;
        }
        Commands::Clean => {
            let store = open_store(&config).await?;
            let stats = clean_data(store.as_ref(), &config).await?;
            record_stage(&config, &stats)?;
        }
        Commands::Aggregate => {
            let store = open_store(&config).await?;
            let (stats, _) = aggregate_data(store.as_ref(), &config).await?;
            record_stage(&config, &stats)?;
        }
        Commands::Run => {
            let client = SourceClient::from_config(&config)?;
            let store = open_store(&config).await?;
            let summary = run_pipeline(&client, store.as_ref(), &config).await?;
            if let Some(views) = &summary.views {
                print_summary(views);
            }
        }
        Commands::Summary => {
            let store = open_store(&config).await?;
            let views = load_views(store.as_ref()).await?;
            print_summary(&views);
        }
    }

    Ok(())
}

fn print_summary(views: &GoldViews) {
    match DashboardSummary::from_views(views) {
        Some(summary) => {
            info!(
                total_trips = summary.total_trips,
                top_pickup_area = ?summary.top_pickup_area,
                "Dashboard summary"
            );
            println!("{summary}");
        }
        None => warn!("No data yet; run the pipeline first"),
    }
}
