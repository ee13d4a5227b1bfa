//! Output formatting and persistence for stage statistics.
//!
//! Supports pretty-printing, JSON logging, and appending to the run log CSV.

use anyhow::Result;
use tracing::{debug, info};

use crate::stats::StageStats;
use csv::WriterBuilder;
use std::fs::{self, OpenOptions};
use std::path::Path;

/// Logs stage statistics using Rust's debug pretty-print format.
pub fn print_pretty(stats: &StageStats) {
    debug!("{:#?}", stats);
}

/// Logs stage statistics as JSON.
pub fn print_json(stats: &StageStats) -> Result<()> {
    info!(stage = %stats.stage, "{}", serde_json::to_string(stats)?);
    Ok(())
}

/// Appends a [`StageStats`] record as a row to the run log CSV.
///
/// Creates the file (and its parent directory) with headers if it does not
/// already exist.
pub fn append_record(path: &Path, stats: &StageStats) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending run log record");

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(stats)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{Stage, StageStats};

    #[test]
    fn test_print_pretty_does_not_panic() {
        let stats = StageStats::default();
        print_pretty(&stats);
    }

    #[test]
    fn test_print_json_does_not_panic() {
        let stats = StageStats::new(Stage::Gold);
        print_json(&stats).unwrap();
    }

    #[test]
    fn test_append_record_creates_file_and_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run_log.csv");

        append_record(&path, &StageStats::new(Stage::Bronze)).unwrap();

        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("bronze"));
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_log.csv");

        append_record(&path, &StageStats::new(Stage::Bronze)).unwrap();
        append_record(&path, &StageStats::new(Stage::Silver)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("timestamp")).count();
        assert_eq!(header_count, 1);
        // 1 header + 2 data rows
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_append_record_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_log.csv");

        let mut stats = StageStats::new(Stage::Silver);
        stats.rows_read = 10;
        stats.parse_failures = 2;
        append_record(&path, &stats).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<StageStats> = rdr.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows, vec![stats]);
    }
}
