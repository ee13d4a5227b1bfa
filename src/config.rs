//! Pipeline configuration.
//!
//! All paths, the store connection and the download parameters live in one
//! [`PipelineConfig`] value that is passed explicitly to every stage. The CLI
//! builds it from [`ConfigArgs`], whose flags each fall back to an
//! environment variable (a `.env` file is loaded first) and then to the
//! defaults below.

use clap::{Args, ValueEnum};
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_SOURCE_URL: &str = "https://data.cityofchicago.org/resource/wrvz-psew.csv";
pub const DEFAULT_ROW_LIMIT: u64 = 800_000;
pub const DEFAULT_MIN_DOWNLOAD_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_DATABASE: &str = "chicago_transit";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("store backend `s3` requires --s3-bucket (or S3_BUCKET)")]
    MissingBucket,
    #[error("row limit must be greater than zero")]
    ZeroRowLimit,
    #[error("database name must not be empty")]
    EmptyDatabase,
}

/// Where the document store keeps its collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Process memory; contents vanish when the process exits.
    Memory,
    /// JSON-lines files under `store_dir`.
    Fs,
    /// JSON objects in an S3 bucket.
    S3,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bronze input written by the downloader.
    pub raw_csv: PathBuf,
    /// Silver Parquet snapshot, the input of the gold stage.
    pub snapshot: PathBuf,
    /// CSV file that per-stage statistics are appended to.
    pub run_log: PathBuf,
    pub database: String,
    pub store: StoreBackend,
    pub store_dir: PathBuf,
    pub s3_bucket: Option<String>,
    pub source_url: String,
    pub row_limit: u64,
    pub min_download_bytes: u64,
    pub app_token: Option<String>,
    /// Abort the silver stage on the first row that fails the clean model.
    pub strict_validation: bool,
}

impl PipelineConfig {
    /// Default layout rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            raw_csv: data_dir.join("raw_data.csv"),
            snapshot: data_dir.join("processed").join("silver_trips.parquet"),
            run_log: data_dir.join("run_log.csv"),
            store_dir: data_dir.join("store"),
            database: DEFAULT_DATABASE.to_string(),
            store: StoreBackend::Fs,
            s3_bucket: None,
            source_url: DEFAULT_SOURCE_URL.to_string(),
            row_limit: DEFAULT_ROW_LIMIT,
            min_download_bytes: DEFAULT_MIN_DOWNLOAD_BYTES,
            app_token: None,
            strict_validation: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store == StoreBackend::S3 && self.s3_bucket.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingBucket);
        }
        if self.row_limit == 0 {
            return Err(ConfigError::ZeroRowLimit);
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError::EmptyDatabase);
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_data_dir("data")
    }
}

/// Configuration flags shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Root directory for pipeline files
    #[arg(long, env = "DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// Raw CSV path [default: <DATA_DIR>/raw_data.csv]
    #[arg(long, env = "RAW_CSV", global = true)]
    pub raw_csv: Option<PathBuf>,

    /// Silver Parquet snapshot path [default: <DATA_DIR>/processed/silver_trips.parquet]
    #[arg(long, env = "SNAPSHOT_PATH", global = true)]
    pub snapshot: Option<PathBuf>,

    /// Run statistics CSV [default: <DATA_DIR>/run_log.csv]
    #[arg(long, env = "RUN_LOG", global = true)]
    pub run_log: Option<PathBuf>,

    /// Database name that namespaces all collections
    #[arg(long, env = "DB_NAME", default_value = DEFAULT_DATABASE, global = true)]
    pub database: String,

    /// Document store backend
    #[arg(long, env = "STORE_BACKEND", value_enum, default_value_t = StoreBackend::Fs, global = true)]
    pub store: StoreBackend,

    /// Root directory of the filesystem store [default: <DATA_DIR>/store]
    #[arg(long, env = "STORE_DIR", global = true)]
    pub store_dir: Option<PathBuf>,

    /// S3 bucket for the s3 store backend
    #[arg(long, env = "S3_BUCKET", global = true)]
    pub s3_bucket: Option<String>,

    /// Open-data CSV endpoint
    #[arg(long, env = "SOURCE_URL", default_value = DEFAULT_SOURCE_URL, global = true)]
    pub source_url: String,

    /// Maximum number of rows requested from the source
    #[arg(long, env = "ROW_LIMIT", default_value_t = DEFAULT_ROW_LIMIT, global = true)]
    pub row_limit: u64,

    /// Downloads smaller than this many bytes are treated as failed
    #[arg(long, env = "MIN_DOWNLOAD_BYTES", default_value_t = DEFAULT_MIN_DOWNLOAD_BYTES, global = true)]
    pub min_download_bytes: u64,

    /// Optional Socrata application token
    #[arg(long, env = "SOCRATA_APP_TOKEN", hide_env_values = true, global = true)]
    pub app_token: Option<String>,

    /// Fail the clean stage on the first row that violates the clean model
    #[arg(long, env = "STRICT_VALIDATION", global = true)]
    pub strict_validation: bool,
}

impl ConfigArgs {
    pub fn into_config(self) -> Result<PipelineConfig, ConfigError> {
        let defaults = PipelineConfig::with_data_dir(&self.data_dir);
        let config = PipelineConfig {
            raw_csv: self.raw_csv.unwrap_or(defaults.raw_csv),
            snapshot: self.snapshot.unwrap_or(defaults.snapshot),
            run_log: self.run_log.unwrap_or(defaults.run_log),
            store_dir: self.store_dir.unwrap_or(defaults.store_dir),
            database: self.database,
            store: self.store,
            s3_bucket: self.s3_bucket,
            source_url: self.source_url,
            row_limit: self.row_limit,
            min_download_bytes: self.min_download_bytes,
            app_token: self.app_token.filter(|t| !t.is_empty()),
            strict_validation: self.strict_validation,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: ConfigArgs,
    }

    #[test]
    fn test_default_layout() {
        let config = PipelineConfig::with_data_dir("/tmp/elt");
        assert_eq!(config.raw_csv, PathBuf::from("/tmp/elt/raw_data.csv"));
        assert_eq!(
            config.snapshot,
            PathBuf::from("/tmp/elt/processed/silver_trips.parquet")
        );
        assert_eq!(config.store_dir, PathBuf::from("/tmp/elt/store"));
        assert_eq!(config.database, "chicago_transit");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_s3_requires_bucket() {
        let mut config = PipelineConfig::default();
        config.store = StoreBackend::S3;
        assert_eq!(config.validate(), Err(ConfigError::MissingBucket));

        config.s3_bucket = Some("trips".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_row_limit_rejected() {
        let mut config = PipelineConfig::default();
        config.row_limit = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroRowLimit));
    }

    #[test]
    fn test_args_override_paths() {
        let cli = TestCli::try_parse_from([
            "test",
            "--data-dir",
            "/srv/elt",
            "--snapshot",
            "/mnt/silver.parquet",
            "--store",
            "memory",
            "--row-limit",
            "500",
        ])
        .unwrap();
        let config = cli.config.into_config().unwrap();

        assert_eq!(config.raw_csv, PathBuf::from("/srv/elt/raw_data.csv"));
        assert_eq!(config.snapshot, PathBuf::from("/mnt/silver.parquet"));
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.row_limit, 500);
    }

    #[test]
    fn test_args_derive_layout_from_data_dir() {
        let cli = TestCli::try_parse_from(["test", "--data-dir", "/srv/elt"]).unwrap();
        let config = cli.config.into_config().unwrap();

        assert_eq!(config.raw_csv, PathBuf::from("/srv/elt/raw_data.csv"));
        assert_eq!(
            config.snapshot,
            PathBuf::from("/srv/elt/processed/silver_trips.parquet")
        );
        assert_eq!(config.run_log, PathBuf::from("/srv/elt/run_log.csv"));
        assert_eq!(config.store_dir, PathBuf::from("/srv/elt/store"));
    }
}
