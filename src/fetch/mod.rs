mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use auth::ApiKey;
pub use client::HttpClient;

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::{StatusCode, Url};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Result of streaming a GET response to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOutcome {
    pub status: StatusCode,
    /// Bytes written to the target file. Zero when the status was not a success.
    pub bytes_written: u64,
}

/// Streams the body of a GET for `url` into `path`.
///
/// The body is written to a `.part` sibling first and renamed into place only
/// once the stream completes, so a failed transfer never leaves a partial
/// file at `path`. Non-success statuses are returned without touching `path`;
/// transport errors propagate.
pub async fn fetch_to_file<C: HttpClient>(
    client: &C,
    url: Url,
    path: &Path,
) -> Result<FetchOutcome> {
    let req = reqwest::Request::new(reqwest::Method::GET, url);
    let resp = client.execute(req).await?;
    let status = resp.status();

    if !status.is_success() {
        return Ok(FetchOutcome {
            status,
            bytes_written: 0,
        });
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let part = path.with_extension("part");
    let mut file = tokio::fs::File::create(&part)
        .await
        .with_context(|| format!("failed to create {}", part.display()))?;

    let mut bytes_written = 0u64;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e).context("download interrupted");
            }
        };
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&part, path).await?;
    debug!(path = %path.display(), bytes_written, "Response body saved");

    Ok(FetchOutcome {
        status,
        bytes_written,
    })
}
