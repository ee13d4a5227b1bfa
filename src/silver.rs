//! Silver layer: projection, coercion, deduplication and filtering of bronze trips.
//!
//! The transform itself ([`transform`]) is pure and works on bronze documents
//! in memory. [`clean_data`] wraps it with the I/O: read the bronze
//! collection, write the Parquet snapshot, replace the silver collection.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::models::{CleanTripRecord, ValidationError};
use crate::parsing::{coerce_f64, coerce_i64, coerce_text, parse_timestamp};
use crate::snapshot::write_snapshot;
use crate::stats::{Stage, StageStats};
use crate::store::{Document, DocumentStore, RAW_TRIPS, SILVER_TRIPS, to_documents};
use crate::utility::round2;

/// Bronze columns carried into the silver layer, in snapshot order.
pub const SILVER_COLUMNS: &[&str] = &[
    "trip_id",
    "taxi_id",
    "trip_start_timestamp",
    "trip_end_timestamp",
    "trip_seconds",
    "trip_miles",
    "fare",
    "tips",
    "tolls",
    "extras",
    "trip_total",
    "payment_type",
    "company",
    "pickup_community_area",
    "dropoff_community_area",
];

/// One cleaned trip, as stored in the snapshot and the silver collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverTrip {
    pub trip_id: String,
    pub taxi_id: Option<String>,
    pub trip_start_timestamp: Option<String>,
    pub trip_end_timestamp: Option<String>,
    pub trip_seconds: f64,
    pub trip_miles: f64,
    pub fare: f64,
    pub tips: f64,
    pub tolls: f64,
    pub extras: f64,
    pub trip_total: Option<f64>,
    pub payment_type: Option<String>,
    pub company: Option<String>,
    pub pickup_community_area: i64,
    pub dropoff_community_area: i64,
    pub duration_min: f64,
}

impl SilverTrip {
    /// Checks this row against the clean trip model.
    pub fn to_clean_record(&self) -> Result<CleanTripRecord, ValidationError> {
        let start = self
            .trip_start_timestamp
            .as_deref()
            .ok_or(ValidationError::MissingField {
                field: "start_time",
            })?;
        let start_time = parse_timestamp(start).ok_or_else(|| ValidationError::TypeCoercion {
            field: "start_time",
            expected: "datetime",
            value: start.to_string(),
        })?;
        let end_time = match self.trip_end_timestamp.as_deref() {
            Some(end) => Some(parse_timestamp(end).ok_or_else(|| {
                ValidationError::TypeCoercion {
                    field: "end_time",
                    expected: "datetime",
                    value: end.to_string(),
                }
            })?),
            None => None,
        };

        CleanTripRecord {
            trip_id: self.trip_id.clone(),
            start_time,
            end_time,
            duration_min: self.duration_min,
            distance_miles: self.trip_miles,
            pickup_area: self.pickup_community_area,
            dropoff_area: self.dropoff_community_area,
            total_cost: self.trip_total.ok_or(ValidationError::MissingField {
                field: "total_cost",
            })?,
            payment_type: self.payment_type.clone().ok_or(ValidationError::MissingField {
                field: "payment_type",
            })?,
            company: self.company.clone().ok_or(ValidationError::MissingField {
                field: "company",
            })?,
        }
        .validate()
    }
}

/// A bronze document projected onto the silver columns, before filtering.
#[derive(Debug, Clone, Default)]
struct ProjectedTrip {
    trip_id: Option<String>,
    taxi_id: Option<String>,
    trip_start_timestamp: Option<String>,
    trip_end_timestamp: Option<String>,
    trip_seconds: Option<f64>,
    trip_miles: Option<f64>,
    fare: Option<f64>,
    tips: f64,
    tolls: f64,
    extras: f64,
    trip_total: Option<f64>,
    payment_type: Option<String>,
    company: Option<String>,
    pickup_community_area: Option<i64>,
    dropoff_community_area: Option<i64>,
}

/// Reads typed columns out of one document, counting values that fail to coerce.
struct Projector<'a> {
    doc: &'a Document,
    failures: usize,
}

impl<'a> Projector<'a> {
    fn new(doc: &'a Document) -> Self {
        Self { doc, failures: 0 }
    }

    fn coerce<T>(&mut self, name: &str, f: impl Fn(&serde_json::Value) -> Option<T>) -> Option<T> {
        let value = self.doc.get(name).filter(|v| !v.is_null())?;
        let coerced = f(value);
        if coerced.is_none() {
            self.failures += 1;
        }
        coerced
    }

    fn text(&mut self, name: &str) -> Option<String> {
        self.coerce(name, coerce_text)
    }

    fn float(&mut self, name: &str) -> Option<f64> {
        self.coerce(name, coerce_f64)
    }

    fn code(&mut self, name: &str) -> Option<i64> {
        self.coerce(name, coerce_i64)
    }

    fn project(mut self) -> (ProjectedTrip, usize) {
        let trip = ProjectedTrip {
            trip_id: self.text("trip_id"),
            taxi_id: self.text("taxi_id"),
            trip_start_timestamp: self.text("trip_start_timestamp"),
            trip_end_timestamp: self.text("trip_end_timestamp"),
            trip_seconds: self.float("trip_seconds"),
            trip_miles: self.float("trip_miles"),
            fare: self.float("fare"),
            tips: self.float("tips").unwrap_or(0.0),
            tolls: self.float("tolls").unwrap_or(0.0),
            extras: self.float("extras").unwrap_or(0.0),
            trip_total: self.float("trip_total"),
            payment_type: self.text("payment_type"),
            company: self.text("company"),
            pickup_community_area: self.code("pickup_community_area"),
            dropoff_community_area: self.code("dropoff_community_area"),
        };
        (trip, self.failures)
    }
}

impl ProjectedTrip {
    /// Applies the silver filters and derives `duration_min`.
    fn into_silver(self) -> Option<SilverTrip> {
        let trip_id = self.trip_id?;
        let trip_seconds = self.trip_seconds.filter(|s| *s > 60.0)?;
        let trip_miles = self.trip_miles.filter(|m| *m > 0.0)?;
        let fare = self.fare.filter(|f| *f >= 0.0)?;
        let pickup_community_area = self.pickup_community_area?;
        let dropoff_community_area = self.dropoff_community_area?;

        Some(SilverTrip {
            trip_id,
            taxi_id: self.taxi_id,
            trip_start_timestamp: self.trip_start_timestamp,
            trip_end_timestamp: self.trip_end_timestamp,
            trip_seconds,
            trip_miles,
            fare,
            tips: self.tips,
            tolls: self.tolls,
            extras: self.extras,
            trip_total: self.trip_total,
            payment_type: self.payment_type,
            company: self.company,
            pickup_community_area,
            dropoff_community_area,
            duration_min: round2(trip_seconds / 60.0),
        })
    }
}

/// Cleans bronze documents into silver rows.
///
/// Steps, in order: project and coerce, deduplicate by `trip_id` keeping the
/// first occurrence, keep only trips longer than a minute with positive
/// distance, a non-negative fare and both community areas, then derive
/// `duration_min`. Documents without a trip id are dropped with the
/// filtered rows.
pub fn transform(docs: &[Document]) -> (Vec<SilverTrip>, StageStats) {
    let mut stats = StageStats::new(Stage::Silver);
    stats.rows_read = docs.len();

    let mut seen = HashSet::with_capacity(docs.len());
    let mut rows = Vec::new();

    for doc in docs {
        let (trip, failures) = Projector::new(doc).project();
        stats.parse_failures += failures;

        let Some(trip_id) = trip.trip_id.as_deref() else {
            stats.filtered_out += 1;
            continue;
        };
        if !seen.insert(trip_id.to_string()) {
            stats.duplicates_removed += 1;
            continue;
        }

        match trip.into_silver() {
            Some(row) => rows.push(row),
            None => stats.filtered_out += 1,
        }
    }

    stats.rows_written = rows.len();
    (rows, stats)
}

/// Rebuilds the silver layer from the bronze collection.
///
/// An empty bronze collection is a soft stop. Otherwise the snapshot at
/// `config.snapshot` is overwritten first and the silver collection is then
/// replaced with the same rows, so both copies always come from one pass.
#[tracing::instrument(skip_all, fields(snapshot = %config.snapshot.display()))]
pub async fn clean_data(store: &dyn DocumentStore, config: &PipelineConfig) -> Result<StageStats> {
    info!("Fetching raw data");
    let docs = store.find_all(RAW_TRIPS).await?;
    if docs.is_empty() {
        warn!("Bronze layer is empty; skipping clean");
        return Ok(StageStats::new(Stage::Silver).skipped());
    }

    info!(rows = docs.len(), "Processing rows with strict cleaning");
    let (rows, mut stats) = transform(&docs);
    drop(docs);

    for row in &rows {
        if let Err(e) = row.to_clean_record() {
            if config.strict_validation {
                return Err(e).with_context(|| format!("trip {} failed validation", row.trip_id));
            }
            stats.schema_violations += 1;
        }
    }

    if stats.parse_failures > 0 {
        warn!(
            parse_failures = stats.parse_failures,
            "Values could not be coerced and were treated as missing"
        );
    }
    if stats.schema_violations > 0 {
        warn!(
            schema_violations = stats.schema_violations,
            "Cleaned rows do not satisfy the clean trip model"
        );
    }
    info!(
        rows = rows.len(),
        duplicates_removed = stats.duplicates_removed,
        filtered_out = stats.filtered_out,
        rejection_pct = stats.rejection_pct(),
        "Final cleaned count"
    );

    let bytes = write_snapshot(&config.snapshot, &rows)?;
    info!(
        path = %config.snapshot.display(),
        "Saved parquet snapshot ({:.2} MB)",
        bytes as f64 / (1024.0 * 1024.0)
    );

    if rows.is_empty() {
        warn!("No rows survived cleaning; clearing silver collection");
    }
    store
        .replace_all(SILVER_TRIPS, to_documents(&rows)?)
        .await?;
    info!(collection = SILVER_TRIPS, "Silver collection updated");

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::{Value, json};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn trip(id: &str, seconds: f64, miles: f64, fare: f64, pickup: Option<i64>, dropoff: Option<i64>) -> Document {
        doc(json!({
            "trip_id": id,
            "trip_seconds": seconds,
            "trip_miles": miles,
            "fare": fare,
            "pickup_community_area": pickup,
            "dropoff_community_area": dropoff,
        }))
    }

    #[test]
    fn test_scenario_dedup_and_short_trip() {
        let docs = vec![
            trip("1", 120.0, 2.0, 10.0, Some(8), Some(32)),
            trip("1", 120.0, 2.0, 10.0, Some(8), Some(32)),
            trip("2", 30.0, 1.0, 5.0, Some(3), Some(4)),
        ];

        let (rows, stats) = transform(&docs);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].trip_id, "1");
        assert_eq!(rows[0].duration_min, 2.0);
        assert_eq!(stats.duplicates_removed, 1);
        assert_eq!(stats.filtered_out, 1);
    }

    #[test]
    fn test_each_filter_excludes_row() {
        let docs = vec![
            trip("ok", 61.0, 0.1, 0.0, Some(1), Some(2)),
            trip("short", 60.0, 1.0, 5.0, Some(1), Some(2)),
            trip("still", 300.0, 0.0, 5.0, Some(1), Some(2)),
            trip("refund", 300.0, 1.0, -0.5, Some(1), Some(2)),
            trip("no_pickup", 300.0, 1.0, 5.0, None, Some(2)),
            trip("no_dropoff", 300.0, 1.0, 5.0, Some(1), None),
        ];

        let (rows, stats) = transform(&docs);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].trip_id, "ok");
        assert_eq!(rows[0].duration_min, 1.02);
        assert_eq!(stats.filtered_out, 5);
        for row in &rows {
            assert!(row.trip_seconds > 60.0);
            assert!(row.trip_miles > 0.0);
            assert!(row.fare >= 0.0);
        }
    }

    #[test]
    fn test_dedup_keeps_first_seen() {
        let mut first = trip("dup", 120.0, 2.0, 10.0, Some(8), Some(32));
        first.insert("company".into(), json!("First Cab"));
        let mut second = trip("dup", 120.0, 2.0, 10.0, Some(8), Some(32));
        second.insert("company".into(), json!("Second Cab"));

        let (rows, _) = transform(&[first, second]);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].company.as_deref(), Some("First Cab"));
    }

    #[test]
    fn test_coercion_and_null_fill() {
        let docs = vec![doc(json!({
            "trip_id": 991,
            "trip_seconds": "600",
            "trip_miles": "3.5",
            "fare": 14.25,
            "tips": null,
            "tolls": "n/a",
            "trip_total": "19.75",
            "pickup_community_area": "8.0",
            "dropoff_community_area": 32,
            "unrelated": "dropped",
        }))];

        let (rows, stats) = transform(&docs);

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.trip_id, "991");
        assert_eq!(row.trip_seconds, 600.0);
        assert_eq!(row.trip_miles, 3.5);
        assert_eq!(row.tips, 0.0);
        assert_eq!(row.tolls, 0.0);
        assert_eq!(row.extras, 0.0);
        assert_eq!(row.trip_total, Some(19.75));
        assert_eq!(row.pickup_community_area, 8);
        assert_eq!(row.duration_min, 10.0);
        // "n/a" tolls
        assert_eq!(stats.parse_failures, 1);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let docs = vec![
            trip("a", 120.0, 2.0, 10.0, Some(8), Some(32)),
            trip("b", 400.0, 3.0, 12.0, Some(6), Some(8)),
            trip("a", 900.0, 9.0, 30.0, Some(1), Some(2)),
            trip("c", 10.0, 3.0, 12.0, Some(6), Some(8)),
        ];

        let (first, _) = transform(&docs);
        let (second, _) = transform(&docs);

        assert_eq!(first, second);
        let ids: Vec<_> = first.iter().map(|r| r.trip_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_trip_id_is_filtered() {
        let mut no_id = trip("x", 120.0, 2.0, 10.0, Some(8), Some(32));
        no_id.remove("trip_id");
        let (rows, stats) = transform(&[no_id]);
        assert!(rows.is_empty());
        assert_eq!(stats.filtered_out, 1);
    }

    #[test]
    fn test_to_clean_record() {
        let row = SilverTrip {
            trip_id: "12345".into(),
            taxi_id: Some("t".into()),
            trip_start_timestamp: Some("2024-03-01T08:15:00.000".into()),
            trip_end_timestamp: None,
            trip_seconds: 930.0,
            trip_miles: 3.2,
            fare: 20.0,
            tips: 5.5,
            tolls: 0.0,
            extras: 0.0,
            trip_total: Some(25.5),
            payment_type: Some("Credit Card".into()),
            company: Some("Flash Cab".into()),
            pickup_community_area: 8,
            dropoff_community_area: 32,
            duration_min: 15.5,
        };

        let clean = row.to_clean_record().unwrap();
        assert_eq!(clean.total_cost, 25.5);
        assert_eq!(clean.distance_miles, 3.2);

        let negative = SilverTrip {
            trip_total: Some(-1.0),
            ..row.clone()
        };
        assert!(matches!(
            negative.to_clean_record(),
            Err(ValidationError::BusinessRule { field: "total_cost", .. })
        ));

        let bad_start = SilverTrip {
            trip_start_timestamp: Some("soon".into()),
            ..row
        };
        assert!(matches!(
            bad_start.to_clean_record(),
            Err(ValidationError::TypeCoercion { field: "start_time", .. })
        ));
    }

    #[tokio::test]
    async fn test_clean_with_empty_bronze_is_soft_stop() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::with_data_dir(dir.path());
        let store = MemoryStore::new();
        store
            .insert_many(SILVER_TRIPS, vec![trip("kept", 120.0, 2.0, 10.0, Some(8), Some(32))])
            .await
            .unwrap();

        let stats = clean_data(&store, &config).await.unwrap();

        assert!(stats.skipped);
        assert_eq!(stats.rows_written, 0);
        assert!(!config.snapshot.exists());
        let silver = store.find_all(SILVER_TRIPS).await.unwrap();
        assert_eq!(silver.len(), 1);
        assert_eq!(silver[0].get("trip_id"), Some(&json!("kept")));
    }
}
