//! Gold layer: business aggregates computed from the silver snapshot.

pub mod aggregate;
pub mod dashboard;
pub mod types;

pub use aggregate::compute_views;
pub use dashboard::DashboardSummary;
pub use types::{AreaStats, GoldViews, HourlyStats, PaymentStats};

use anyhow::{Context, Result, bail};
use std::time::Instant;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::snapshot::read_snapshot;
use crate::stats::{Stage, StageStats};
use crate::store::{
    DocumentStore, GOLD_AREA_STATS, GOLD_HOURLY_STATS, GOLD_PAYMENT_STATS, from_documents,
    to_documents,
};

/// Reads the silver snapshot, computes the three gold views and replaces each
/// gold collection with its view.
///
/// A missing snapshot is an error rather than a soft stop.
#[tracing::instrument(skip_all, fields(snapshot = %config.snapshot.display()))]
pub async fn aggregate_data(
    store: &dyn DocumentStore,
    config: &PipelineConfig,
) -> Result<(StageStats, GoldViews)> {
    if !config.snapshot.exists() {
        bail!(
            "silver snapshot {} not found; run the clean step first",
            config.snapshot.display()
        );
    }

    let start = Instant::now();
    let rows = read_snapshot(&config.snapshot)
        .with_context(|| format!("failed to read {}", config.snapshot.display()))?;
    info!(rows = rows.len(), "Loaded silver snapshot");

    let mut stats = StageStats::new(Stage::Gold);
    stats.rows_read = rows.len();

    let (views, unparsable) = compute_views(&rows);
    stats.parse_failures = unparsable;
    if unparsable > 0 {
        warn!(
            unparsable,
            "Start timestamps could not be parsed and were grouped under a null hour"
        );
    }

    store
        .replace_all(GOLD_HOURLY_STATS, to_documents(&views.hourly)?)
        .await?;
    info!(collection = GOLD_HOURLY_STATS, rows = views.hourly.len(), "Gold view updated");

    store
        .replace_all(GOLD_AREA_STATS, to_documents(&views.areas)?)
        .await?;
    info!(collection = GOLD_AREA_STATS, rows = views.areas.len(), "Gold view updated");

    store
        .replace_all(GOLD_PAYMENT_STATS, to_documents(&views.payments)?)
        .await?;
    info!(collection = GOLD_PAYMENT_STATS, rows = views.payments.len(), "Gold view updated");

    stats.rows_written = views.row_count();
    info!(
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Gold aggregation complete"
    );
    Ok((stats, views))
}

/// Loads the gold views the way the dashboard reads them: every document of
/// each collection, without the store's `_id` field. Absent collections load
/// as empty views.
pub async fn load_views(store: &dyn DocumentStore) -> Result<GoldViews> {
    Ok(GoldViews {
        hourly: from_documents(store.find_all(GOLD_HOURLY_STATS).await?)?,
        areas: from_documents(store.find_all(GOLD_AREA_STATS).await?)?,
        payments: from_documents(store.find_all(GOLD_PAYMENT_STATS).await?)?,
    })
}
