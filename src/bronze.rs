//! Bronze layer: the raw CSV export loaded into the store as-is.
//!
//! The only row-level rule applied here is that a trip needs an id. Cells
//! that cannot be parsed into their column type are dropped from the
//! document instead of failing the load, and counted as parse failures.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::models::{FieldKind, RawTripRecord, canonical_field, field_kind};
use crate::parsing::{parse_f64, parse_i64};
use crate::stats::{Stage, StageStats};
use crate::store::{Document, DocumentStore, RAW_TRIPS};

/// Documents parsed from a raw CSV export, plus the counters gathered on the way.
#[derive(Debug, Default)]
pub struct ParsedExport {
    pub documents: Vec<Document>,
    pub stats: StageStats,
}

/// Parses a raw CSV export into bronze documents.
///
/// Header names are mapped to canonical names, cells are typed according to
/// the raw schema, empty cells are omitted, and rows without a `trip_id` are
/// dropped. Rows with a different number of fields than the header are
/// accepted; missing trailing cells are treated as empty.
pub fn parse_export(path: &Path) -> Result<ParsedExport> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let columns: Vec<(String, FieldKind)> = reader
        .byte_headers()?
        .iter()
        .map(|h| {
            let name = canonical_field(String::from_utf8_lossy(h).trim()).to_string();
            let kind = field_kind(&name);
            (name, kind)
        })
        .collect();

    let mut stats = StageStats::new(Stage::Bronze);
    let mut documents = Vec::new();

    for record in reader.byte_records() {
        let record = record?;
        stats.rows_read += 1;

        let mut doc = Document::new();
        for ((name, kind), cell) in columns.iter().zip(record.iter()) {
            let Ok(cell) = std::str::from_utf8(cell) else {
                stats.parse_failures += 1;
                continue;
            };
            if cell.trim().is_empty() {
                continue;
            }
            match typed_cell(*kind, cell) {
                Some(value) => {
                    doc.insert(name.clone(), value);
                }
                None => stats.parse_failures += 1,
            }
        }

        if !doc.contains_key("trip_id") {
            stats.dropped_null_id += 1;
            continue;
        }

        if let Err(e) = RawTripRecord::from_document(&doc) {
            stats.schema_violations += 1;
            debug!(error = %e, "Row does not match the raw trip model");
        }

        documents.push(doc);
    }

    Ok(ParsedExport { documents, stats })
}

fn typed_cell(kind: FieldKind, cell: &str) -> Option<Value> {
    match kind {
        FieldKind::Text => Some(Value::String(cell.to_string())),
        FieldKind::Float => parse_f64(cell).map(Value::from),
        FieldKind::Integer => parse_i64(cell).map(Value::from),
    }
}

/// Loads the raw CSV at `path` into the bronze collection, replacing its contents.
///
/// A missing file or an export with no usable rows is a soft stop: a warning
/// is logged, nothing is written, and the returned stats are marked skipped.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub async fn ingest_raw_data(path: &Path, store: &dyn DocumentStore) -> Result<StageStats> {
    if !path.exists() {
        warn!("Raw file not found; run the download step first");
        return Ok(StageStats::new(Stage::Bronze).skipped());
    }

    let start = Instant::now();
    info!("Reading raw export");
    let ParsedExport {
        documents,
        mut stats,
    } = parse_export(path)?;

    if stats.parse_failures > 0 {
        warn!(
            parse_failures = stats.parse_failures,
            "Unparsable cells were left empty"
        );
    }
    if stats.schema_violations > 0 {
        warn!(
            schema_violations = stats.schema_violations,
            "Rows loaded without satisfying the raw trip model"
        );
    }

    if documents.is_empty() {
        warn!(
            rows_read = stats.rows_read,
            "No rows with a trip id; bronze layer left untouched"
        );
        return Ok(stats.skipped());
    }

    let count = documents.len();
    info!(count, "Replacing bronze collection");
    store.replace_all(RAW_TRIPS, documents).await?;
    stats.rows_written = count;

    info!(
        count,
        dropped_null_id = stats.dropped_null_id,
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Bronze ingest complete"
    );
    Ok(stats)
}
