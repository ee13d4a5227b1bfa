//! Parquet snapshot of the silver layer.
//!
//! The snapshot is the silver → gold interchange: the gold stage reads only
//! this file. Writes go to a temporary sibling that is renamed over the
//! target, so a reader never sees a half-written snapshot.

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::silver::{SILVER_COLUMNS, SilverTrip};

/// Arrow type and nullability of a silver column.
fn column_field(name: &str) -> Field {
    match name {
        "trip_id" => Field::new(name, DataType::Utf8, false),
        "taxi_id" | "trip_start_timestamp" | "trip_end_timestamp" | "payment_type" | "company" => {
            Field::new(name, DataType::Utf8, true)
        }
        "trip_total" => Field::new(name, DataType::Float64, true),
        "pickup_community_area" | "dropoff_community_area" => {
            Field::new(name, DataType::Int64, false)
        }
        _ => Field::new(name, DataType::Float64, false),
    }
}

/// Arrow schema of the silver snapshot: the silver columns in order, then
/// the derived `duration_min`.
pub fn silver_schema() -> Arc<Schema> {
    let mut fields: Vec<Field> = SILVER_COLUMNS.iter().map(|name| column_field(name)).collect();
    fields.push(Field::new("duration_min", DataType::Float64, false));
    Arc::new(Schema::new(fields))
}

fn to_batch(rows: &[SilverTrip]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.trip_id.as_str()))),
        Arc::new(rows.iter().map(|r| r.taxi_id.as_deref()).collect::<StringArray>()),
        Arc::new(
            rows.iter()
                .map(|r| r.trip_start_timestamp.as_deref())
                .collect::<StringArray>(),
        ),
        Arc::new(
            rows.iter()
                .map(|r| r.trip_end_timestamp.as_deref())
                .collect::<StringArray>(),
        ),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.trip_seconds))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.trip_miles))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.fare))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.tips))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.tolls))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.extras))),
        Arc::new(rows.iter().map(|r| r.trip_total).collect::<Float64Array>()),
        Arc::new(rows.iter().map(|r| r.payment_type.as_deref()).collect::<StringArray>()),
        Arc::new(rows.iter().map(|r| r.company.as_deref()).collect::<StringArray>()),
        Arc::new(Int64Array::from_iter_values(
            rows.iter().map(|r| r.pickup_community_area),
        )),
        Arc::new(Int64Array::from_iter_values(
            rows.iter().map(|r| r.dropoff_community_area),
        )),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.duration_min))),
    ];

    Ok(RecordBatch::try_new(silver_schema(), columns)?)
}

/// Writes `rows` to a Snappy-compressed Parquet file at `path`, replacing any
/// previous snapshot. Returns the size of the written file in bytes.
pub fn write_snapshot(path: &Path, rows: &[SilverTrip]) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let batch = to_batch(rows)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let tmp = path.with_extension("parquet.tmp");
    let file = File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move snapshot into {}", path.display()))?;

    let bytes = fs::metadata(path)?.len();
    debug!(path = %path.display(), rows = rows.len(), bytes, "Snapshot written");
    Ok(bytes)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .with_context(|| format!("snapshot is missing column `{name}`"))?
        .as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("snapshot column `{name}` has an unexpected type"))
}

fn opt_str(array: &StringArray, i: usize) -> Option<String> {
    (!array.is_null(i)).then(|| array.value(i).to_string())
}

/// Reads every row of the snapshot at `path`.
pub fn read_snapshot(path: &Path) -> Result<Vec<SilverTrip>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;

        let trip_id = column::<StringArray>(&batch, "trip_id")?;
        let taxi_id = column::<StringArray>(&batch, "taxi_id")?;
        let start = column::<StringArray>(&batch, "trip_start_timestamp")?;
        let end = column::<StringArray>(&batch, "trip_end_timestamp")?;
        let seconds = column::<Float64Array>(&batch, "trip_seconds")?;
        let miles = column::<Float64Array>(&batch, "trip_miles")?;
        let fare = column::<Float64Array>(&batch, "fare")?;
        let tips = column::<Float64Array>(&batch, "tips")?;
        let tolls = column::<Float64Array>(&batch, "tolls")?;
        let extras = column::<Float64Array>(&batch, "extras")?;
        let total = column::<Float64Array>(&batch, "trip_total")?;
        let payment = column::<StringArray>(&batch, "payment_type")?;
        let company = column::<StringArray>(&batch, "company")?;
        let pickup = column::<Int64Array>(&batch, "pickup_community_area")?;
        let dropoff = column::<Int64Array>(&batch, "dropoff_community_area")?;
        let duration = column::<Float64Array>(&batch, "duration_min")?;

        for i in 0..batch.num_rows() {
            rows.push(SilverTrip {
                trip_id: trip_id.value(i).to_string(),
                taxi_id: opt_str(taxi_id, i),
                trip_start_timestamp: opt_str(start, i),
                trip_end_timestamp: opt_str(end, i),
                trip_seconds: seconds.value(i),
                trip_miles: miles.value(i),
                fare: fare.value(i),
                tips: tips.value(i),
                tolls: tolls.value(i),
                extras: extras.value(i),
                trip_total: (!total.is_null(i)).then(|| total.value(i)),
                payment_type: opt_str(payment, i),
                company: opt_str(company, i),
                pickup_community_area: pickup.value(i),
                dropoff_community_area: dropoff.value(i),
                duration_min: duration.value(i),
            });
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, total: Option<f64>, payment: Option<&str>) -> SilverTrip {
        SilverTrip {
            trip_id: id.to_string(),
            taxi_id: Some("taxi".into()),
            trip_start_timestamp: Some("2024-03-01T08:15:00.000".into()),
            trip_end_timestamp: None,
            trip_seconds: 600.0,
            trip_miles: 2.5,
            fare: 11.0,
            tips: 2.0,
            tolls: 0.0,
            extras: 1.0,
            trip_total: total,
            payment_type: payment.map(str::to_string),
            company: None,
            pickup_community_area: 8,
            dropoff_community_area: 32,
            duration_min: 10.0,
        }
    }

    #[test]
    fn test_schema_matches_silver_columns() {
        let schema = silver_schema();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        let mut expected = SILVER_COLUMNS.to_vec();
        expected.push("duration_min");
        assert_eq!(names, expected);
    }

    #[test]
    fn test_schema_column_types() {
        let schema = silver_schema();
        let field = |name: &str| schema.field_with_name(name).unwrap().clone();

        assert!(!field("trip_id").is_nullable());
        assert_eq!(field("company").data_type(), &DataType::Utf8);
        assert!(field("company").is_nullable());
        assert_eq!(field("trip_total").data_type(), &DataType::Float64);
        assert!(field("trip_total").is_nullable());
        assert_eq!(field("pickup_community_area").data_type(), &DataType::Int64);
        assert_eq!(field("tips").data_type(), &DataType::Float64);
        assert!(!field("tips").is_nullable());
    }

    #[test]
    fn test_snapshot_preserves_rows_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed").join("silver_trips.parquet");
        let rows = vec![row("1", Some(14.0), Some("Cash")), row("2", None, None)];

        let bytes = write_snapshot(&path, &rows).unwrap();
        assert!(bytes > 0);
        assert!(!path.with_extension("parquet.tmp").exists());

        assert_eq!(read_snapshot(&path).unwrap(), rows);
    }

    #[test]
    fn test_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silver.parquet");

        write_snapshot(&path, &[]).unwrap();
        assert!(read_snapshot(&path).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_overwrites_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silver.parquet");

        write_snapshot(&path, &[row("1", None, None), row("2", None, None)]).unwrap();
        write_snapshot(&path, &[row("3", None, None)]).unwrap();

        let rows = read_snapshot(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].trip_id, "3");
    }

    #[test]
    fn test_missing_snapshot_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_snapshot(&dir.path().join("absent.parquet")).is_err());
    }
}
