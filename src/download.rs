//! Downloads the latest trip export from the Chicago open-data portal.

use anyhow::Result;
use reqwest::Url;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::fetch::{ApiKey, BasicClient, HttpClient, fetch_to_file};

/// Fetches up to `row_limit` rows, newest first, into `config.raw_csv`.
///
/// Returns `Ok(None)` when the portal answers with a non-success status or
/// the payload is smaller than `min_download_bytes`; in both cases no file is
/// left at the target path. Transport failures are returned as errors.
#[tracing::instrument(skip_all, fields(url = %config.source_url, limit = config.row_limit))]
pub async fn download_dataset<C: HttpClient>(
    client: &C,
    config: &PipelineConfig,
) -> Result<Option<PathBuf>> {
    let url = Url::parse_with_params(
        &config.source_url,
        &[
            ("$limit", config.row_limit.to_string()),
            ("$order", "trip_start_timestamp DESC".to_string()),
        ],
    )?;

    info!(limit = config.row_limit, "Downloading latest rows");

    let target = config.raw_csv.clone();
    let outcome = fetch_to_file(client, url, &target).await?;

    if !outcome.status.is_success() {
        error!(status = %outcome.status, "Download rejected by source");
        remove_stale(&target).await?;
        return Ok(None);
    }

    let size_mb = outcome.bytes_written as f64 / (1024.0 * 1024.0);
    if outcome.bytes_written < config.min_download_bytes {
        error!(
            bytes = outcome.bytes_written,
            min_bytes = config.min_download_bytes,
            "File is too small ({size_mb:.2} MB)"
        );
        remove_stale(&target).await?;
        return Ok(None);
    }

    info!(path = %target.display(), "Downloaded {size_mb:.2} MB");
    Ok(Some(target))
}

/// Removes an export left at `path`, so a failed download never leaves a
/// file for the ingest step to pick up.
async fn remove_stale(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            warn!(path = %path.display(), "Removed unusable raw export");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// HTTP client for the open-data portal, with the app token attached when one is configured.
pub enum SourceClient {
    Anonymous(BasicClient),
    Token(ApiKey<BasicClient>),
}

impl SourceClient {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let basic = BasicClient::new()?;
        Ok(match config.app_token.as_deref() {
            Some(token) => SourceClient::Token(ApiKey::socrata(basic, token)?),
            None => SourceClient::Anonymous(basic),
        })
    }
}

#[async_trait::async_trait]
impl HttpClient for SourceClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        match self {
            SourceClient::Anonymous(client) => client.execute(req).await,
            SourceClient::Token(client) => client.execute(req).await,
        }
    }
}
