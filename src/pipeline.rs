//! Orchestrates the stages of one pipeline run.
//!
//! Stages run strictly in order: download, bronze, silver, gold. A soft stop
//! in bronze or silver ends the run early without touching later layers; any
//! error aborts the run and is returned to the caller.

use anyhow::{Result, anyhow};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::bronze::ingest_raw_data;
use crate::config::PipelineConfig;
use crate::download::download_dataset;
use crate::fetch::HttpClient;
use crate::gold::{GoldViews, aggregate_data};
use crate::output::{append_record, print_json, print_pretty};
use crate::silver::clean_data;
use crate::stats::StageStats;
use crate::store::DocumentStore;

/// Outcome of a run: the statistics of every stage that ran, and the gold
/// views if the run got that far.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub stages: Vec<StageStats>,
    pub views: Option<GoldViews>,
}

impl RunSummary {
    /// True when every stage ran to completion.
    pub fn completed(&self) -> bool {
        self.views.is_some()
    }
}

/// Logs `stats` and appends them to the run log.
pub fn record_stage(config: &PipelineConfig, stats: &StageStats) -> Result<()> {
    print_pretty(stats);
    print_json(stats)?;
    append_record(&config.run_log, stats)
}

/// Runs bronze, silver and gold against the raw file at `config.raw_csv`.
#[tracing::instrument(skip_all, fields(raw = %config.raw_csv.display()))]
pub async fn run_stages(store: &dyn DocumentStore, config: &PipelineConfig) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    let bronze = ingest_raw_data(&config.raw_csv, store).await?;
    record_stage(config, &bronze)?;
    let stop = bronze.skipped;
    summary.stages.push(bronze);
    if stop {
        warn!("Bronze stage wrote nothing; stopping run");
        return Ok(summary);
    }

    let silver = clean_data(store, config).await?;
    record_stage(config, &silver)?;
    let stop = silver.skipped;
    summary.stages.push(silver);
    if stop {
        warn!("Silver stage wrote nothing; stopping run");
        return Ok(summary);
    }

    let (gold, views) = aggregate_data(store, config).await?;
    record_stage(config, &gold)?;
    summary.stages.push(gold);
    summary.views = Some(views);

    Ok(summary)
}

/// Downloads a fresh export and runs every stage on it.
///
/// A failed download aborts the run. Errors from any stage are logged here
/// and returned unchanged.
pub async fn run_pipeline<C: HttpClient>(
    client: &C,
    store: &dyn DocumentStore,
    config: &PipelineConfig,
) -> Result<RunSummary> {
    let start = Instant::now();
    info!(">>> Starting pipeline run");

    let result = async {
        download_dataset(client, config)
            .await?
            .ok_or_else(|| anyhow!("download failed; no raw export to ingest"))?;
        run_stages(store, config).await
    }
    .await;

    match &result {
        Ok(summary) if summary.completed() => info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            "<<< Pipeline finished successfully"
        ),
        Ok(_) => warn!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            "<<< Pipeline stopped early; no new gold views"
        ),
        Err(e) => error!("Pipeline failed: {e:#}"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;
    use crate::store::{MemoryStore, RAW_TRIPS, SILVER_TRIPS};
    use std::fs;

    #[tokio::test]
    async fn test_run_stages_stops_when_raw_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::with_data_dir(dir.path());
        let store = MemoryStore::new();

        let summary = run_stages(&store, &config).await.unwrap();

        assert_eq!(summary.stages.len(), 1);
        assert!(!summary.completed());
        assert!(!config.snapshot.exists());
        assert!(config.run_log.exists());
    }

    #[tokio::test]
    async fn test_run_stages_stops_when_nothing_survives_bronze() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::with_data_dir(dir.path());
        fs::write(&config.raw_csv, "trip_id,fare\n,1.0\n").unwrap();
        let store = MemoryStore::new();

        let summary = run_stages(&store, &config).await.unwrap();

        assert_eq!(summary.stages.len(), 1);
        assert!(store.find_all(RAW_TRIPS).await.unwrap().is_empty());
        assert!(store.find_all(SILVER_TRIPS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_pipeline_fails_when_download_fails() {
        let dir = tempfile::tempdir().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = PipelineConfig::with_data_dir(dir.path());
        config.source_url = format!("http://{addr}/trips.csv");
        let store = MemoryStore::new();

        let result = run_pipeline(&BasicClient::new().unwrap(), &store, &config).await;

        assert!(result.is_err());
        assert!(store.find_all(RAW_TRIPS).await.unwrap().is_empty());
    }
}
