//! Canonical record shapes for the bronze and silver layers.
//!
//! [`RawTripRecord`] describes one trip as reported by the open-data portal,
//! after source column names have been mapped onto canonical names.
//! [`CleanTripRecord`] is the validated silver-layer shape and carries the
//! business rules every cleaned trip must satisfy.
//!
//! Both constructors are pure: they only inspect the [`Document`] they are
//! given and report the first offending field as a [`ValidationError`].

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::parsing::{coerce_f64, coerce_i64, coerce_text, parse_timestamp};
use crate::store::Document;

/// Why a document could not be turned into a canonical record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("field `{field}` could not be coerced to {expected}: {value}")]
    TypeCoercion {
        field: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("field `{field}` violates rule `{rule}`: {value}")]
    BusinessRule {
        field: &'static str,
        rule: &'static str,
        value: String,
    },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingField { field }
            | ValidationError::TypeCoercion { field, .. }
            | ValidationError::BusinessRule { field, .. } => field,
        }
    }
}

/// Storage type of a raw column, used to type CSV cells at ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Float,
    Integer,
}

/// Canonical raw columns and the type each CSV cell is parsed into.
pub const RAW_SCHEMA: &[(&str, FieldKind)] = &[
    ("trip_id", FieldKind::Text),
    ("taxi_id", FieldKind::Text),
    ("trip_start_timestamp", FieldKind::Text),
    ("trip_end_timestamp", FieldKind::Text),
    ("trip_seconds", FieldKind::Float),
    ("trip_miles", FieldKind::Float),
    ("pickup_community_area", FieldKind::Integer),
    ("dropoff_community_area", FieldKind::Integer),
    ("fare", FieldKind::Float),
    ("tips", FieldKind::Float),
    ("tolls", FieldKind::Float),
    ("extras", FieldKind::Float),
    ("trip_total", FieldKind::Float),
    ("payment_type", FieldKind::Text),
    ("company", FieldKind::Text),
    ("pickup_latitude", FieldKind::Float),
    ("pickup_longitude", FieldKind::Float),
    ("dropoff_latitude", FieldKind::Float),
    ("dropoff_longitude", FieldKind::Float),
];

/// Source column name → canonical name, for columns the portal names differently.
pub const FIELD_ALIASES: &[(&str, &str)] = &[
    ("pickup_centroid_latitude", "pickup_latitude"),
    ("pickup_centroid_longitude", "pickup_longitude"),
    ("dropoff_centroid_latitude", "dropoff_latitude"),
    ("dropoff_centroid_longitude", "dropoff_longitude"),
];

/// Maps a source column name onto its canonical name.
///
/// Names without an alias are returned unchanged, so unknown columns pass
/// through to the bronze layer as-is.
pub fn canonical_field(name: &str) -> &str {
    FIELD_ALIASES
        .iter()
        .find(|(source, _)| *source == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name)
}

/// The cell type a canonical column is stored as. Unknown columns are text.
pub fn field_kind(name: &str) -> FieldKind {
    RAW_SCHEMA
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, kind)| *kind)
        .unwrap_or(FieldKind::Text)
}

/// Looks up a canonical field, falling back to its source alias. Nulls count as absent.
fn lookup<'a>(doc: &'a Document, name: &str) -> Option<&'a Value> {
    doc.get(name)
        .or_else(|| {
            FIELD_ALIASES
                .iter()
                .find(|(_, canonical)| *canonical == name)
                .and_then(|(source, _)| doc.get(*source))
        })
        .filter(|v| !v.is_null())
}

fn require<'a>(doc: &'a Document, field: &'static str) -> Result<&'a Value, ValidationError> {
    lookup(doc, field).ok_or(ValidationError::MissingField { field })
}

fn require_text(doc: &Document, field: &'static str) -> Result<String, ValidationError> {
    let value = require(doc, field)?;
    coerce_text(value).ok_or_else(|| coercion(field, "string", value))
}

fn require_f64(doc: &Document, field: &'static str) -> Result<f64, ValidationError> {
    let value = require(doc, field)?;
    coerce_f64(value).ok_or_else(|| coercion(field, "float", value))
}

fn require_i64(doc: &Document, field: &'static str) -> Result<i64, ValidationError> {
    let value = require(doc, field)?;
    coerce_i64(value).ok_or_else(|| coercion(field, "integer", value))
}

fn datetime(field: &'static str, value: &Value) -> Result<NaiveDateTime, ValidationError> {
    value
        .as_str()
        .and_then(parse_timestamp)
        .ok_or_else(|| coercion(field, "datetime", value))
}

fn coercion(field: &'static str, expected: &'static str, value: &Value) -> ValidationError {
    ValidationError::TypeCoercion {
        field,
        expected,
        value: value.to_string(),
    }
}

/// A trip as reported by the source, with canonical field names.
///
/// Built only through [`RawTripRecord::from_document`], which resolves source
/// aliases via [`FIELD_ALIASES`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawTripRecord {
    pub trip_id: String,
    pub taxi_id: String,
    pub trip_start_timestamp: Option<String>,
    pub trip_end_timestamp: Option<String>,
    pub trip_seconds: Option<f64>,
    pub trip_miles: Option<f64>,
    pub pickup_community_area: Option<i64>,
    pub dropoff_community_area: Option<i64>,
    pub fare: Option<f64>,
    pub tips: Option<f64>,
    pub tolls: Option<f64>,
    pub extras: Option<f64>,
    pub trip_total: Option<f64>,
    pub payment_type: Option<String>,
    pub company: Option<String>,
    pub pickup_latitude: Option<f64>,
    pub pickup_longitude: Option<f64>,
    pub dropoff_latitude: Option<f64>,
    pub dropoff_longitude: Option<f64>,
}

impl RawTripRecord {
    /// Builds a raw record from a bronze document.
    ///
    /// Only `trip_id` and `taxi_id` are required. Optional fields that are
    /// missing or cannot be coerced are left absent rather than failing.
    pub fn from_document(doc: &Document) -> Result<Self, ValidationError> {
        let text = |name: &str| lookup(doc, name).and_then(coerce_text);
        let float = |name: &str| lookup(doc, name).and_then(coerce_f64);
        let code = |name: &str| lookup(doc, name).and_then(coerce_i64);

        Ok(Self {
            trip_id: require_text(doc, "trip_id")?,
            taxi_id: require_text(doc, "taxi_id")?,
            trip_start_timestamp: text("trip_start_timestamp"),
            trip_end_timestamp: text("trip_end_timestamp"),
            trip_seconds: float("trip_seconds"),
            trip_miles: float("trip_miles"),
            pickup_community_area: code("pickup_community_area"),
            dropoff_community_area: code("dropoff_community_area"),
            fare: float("fare"),
            tips: float("tips"),
            tolls: float("tolls"),
            extras: float("extras"),
            trip_total: float("trip_total"),
            payment_type: text("payment_type"),
            company: text("company"),
            pickup_latitude: float("pickup_latitude"),
            pickup_longitude: float("pickup_longitude"),
            dropoff_latitude: float("dropoff_latitude"),
            dropoff_longitude: float("dropoff_longitude"),
        })
    }
}

/// A validated silver-layer trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanTripRecord {
    pub trip_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub duration_min: f64,
    pub distance_miles: f64,
    pub pickup_area: i64,
    pub dropoff_area: i64,
    pub total_cost: f64,
    pub payment_type: String,
    pub company: String,
}

impl CleanTripRecord {
    /// Coerces and validates a document into a clean record.
    ///
    /// Numeric strings such as `"15.5"` are accepted for numeric fields;
    /// anything else that is not a number fails with
    /// [`ValidationError::TypeCoercion`].
    pub fn from_document(doc: &Document) -> Result<Self, ValidationError> {
        let end_time = match lookup(doc, "end_time") {
            Some(value) => Some(datetime("end_time", value)?),
            None => None,
        };

        Self {
            trip_id: require_text(doc, "trip_id")?,
            start_time: datetime("start_time", require(doc, "start_time")?)?,
            end_time,
            duration_min: require_f64(doc, "duration_min")?,
            distance_miles: require_f64(doc, "distance_miles")?,
            pickup_area: require_i64(doc, "pickup_area")?,
            dropoff_area: require_i64(doc, "dropoff_area")?,
            total_cost: require_f64(doc, "total_cost")?,
            payment_type: require_text(doc, "payment_type")?,
            company: require_text(doc, "company")?,
        }
        .validate()
    }

    /// Applies the business rules to an already-typed record.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if !(self.total_cost >= 0.0) {
            return Err(ValidationError::BusinessRule {
                field: "total_cost",
                rule: "cost cannot be negative",
                value: self.total_cost.to_string(),
            });
        }
        if !self.duration_min.is_finite() {
            return Err(ValidationError::TypeCoercion {
                field: "duration_min",
                expected: "float",
                value: self.duration_min.to_string(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clean_doc(total_cost: Value, duration_min: Value) -> Document {
        let value = json!({
            "trip_id": "12345",
            "start_time": "2024-03-01T08:15:00",
            "end_time": "2024-03-01T08:30:30",
            "duration_min": duration_min,
            "distance_miles": 3.2,
            "pickup_area": 8,
            "dropoff_area": 32,
            "total_cost": total_cost,
            "payment_type": "Credit Card",
            "company": "Flash Cab",
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_valid_clean_record_preserves_values() {
        let trip = CleanTripRecord::from_document(&clean_doc(json!(25.50), json!(15.5))).unwrap();
        assert_eq!(trip.trip_id, "12345");
        assert_eq!(trip.total_cost, 25.50);
        assert_eq!(trip.duration_min, 15.5);
        assert_eq!(trip.pickup_area, 8);
        assert_eq!(trip.dropoff_area, 32);
        assert!(trip.end_time.is_some());
    }

    #[test]
    fn test_negative_cost_fails() {
        let err = CleanTripRecord::from_document(&clean_doc(json!(-10.0), json!(15.5))).unwrap_err();
        assert!(matches!(err, ValidationError::BusinessRule { field: "total_cost", .. }));
        assert_eq!(err.field(), "total_cost");
        assert!(err.to_string().contains("-10"));
    }

    #[test]
    fn test_zero_cost_is_allowed() {
        assert!(CleanTripRecord::from_document(&clean_doc(json!(0.0), json!(1.0))).is_ok());
    }

    #[test]
    fn test_non_numeric_duration_fails() {
        let err = CleanTripRecord::from_document(&clean_doc(json!(25.5), json!("fifteen minutes")))
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::TypeCoercion {
                field: "duration_min",
                ..
            }
        ));
    }

    #[test]
    fn test_numeric_string_duration_is_coerced() {
        let trip = CleanTripRecord::from_document(&clean_doc(json!(25.5), json!("15.5"))).unwrap();
        assert_eq!(trip.duration_min, 15.5);
    }

    #[test]
    fn test_missing_required_field_fails() {
        let mut doc = clean_doc(json!(25.5), json!(15.5));
        doc.remove("company");
        assert_eq!(
            CleanTripRecord::from_document(&doc).unwrap_err(),
            ValidationError::MissingField { field: "company" }
        );
    }

    #[test]
    fn test_validate_rejects_negative_typed_cost() {
        let mut trip = CleanTripRecord::from_document(&clean_doc(json!(5.0), json!(2.0))).unwrap();
        trip.total_cost = -0.01;
        assert!(trip.validate().is_err());
    }

    #[test]
    fn test_canonical_field_aliases() {
        assert_eq!(canonical_field("pickup_centroid_latitude"), "pickup_latitude");
        assert_eq!(canonical_field("trip_id"), "trip_id");
        assert_eq!(canonical_field("something_new"), "something_new");
        assert_eq!(field_kind("trip_seconds"), FieldKind::Float);
        assert_eq!(field_kind("something_new"), FieldKind::Text);
    }

    #[test]
    fn test_raw_record_requires_ids_only() {
        let doc = match json!({"trip_id": "abc", "taxi_id": "t1"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let raw = RawTripRecord::from_document(&doc).unwrap();
        assert_eq!(raw.trip_id, "abc");
        assert!(raw.fare.is_none());
        assert!(raw.pickup_community_area.is_none());
    }

    #[test]
    fn test_raw_record_missing_taxi_id_fails() {
        let doc = match json!({"trip_id": "abc", "fare": 5.0}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert_eq!(
            RawTripRecord::from_document(&doc).unwrap_err(),
            ValidationError::MissingField { field: "taxi_id" }
        );
    }

    #[test]
    fn test_raw_record_reads_source_aliases_and_tolerates_bad_cells() {
        let doc = match json!({
            "trip_id": "abc",
            "taxi_id": "t1",
            "pickup_centroid_latitude": 41.88,
            "fare": "not a number",
            "pickup_community_area": "8",
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let raw = RawTripRecord::from_document(&doc).unwrap();
        assert_eq!(raw.pickup_latitude, Some(41.88));
        assert_eq!(raw.fare, None);
        assert_eq!(raw.pickup_community_area, Some(8));
    }
}
