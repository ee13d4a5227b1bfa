//! Row types of the gold views.
//!
//! Field names are the column names dashboard consumers read, so they must
//! not change.

use serde::{Deserialize, Serialize};

/// Trips per hour of day. `hour` is `None` for trips whose start timestamp
/// could not be parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyStats {
    pub hour: Option<u32>,
    pub trip_count: u64,
    pub avg_fare: f64,
    pub avg_duration: f64,
}

/// Trips per pickup community area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaStats {
    pub pickup_community_area: i64,
    pub trip_count: u64,
    pub avg_fare: f64,
}

/// Trips per payment type. `avg_cost` is `None` when no trip in the group
/// reported a total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStats {
    pub payment_type: Option<String>,
    pub count: u64,
    pub avg_cost: Option<f64>,
}

/// The three gold views as produced by one aggregate run, or as loaded back
/// from the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoldViews {
    pub hourly: Vec<HourlyStats>,
    pub areas: Vec<AreaStats>,
    pub payments: Vec<PaymentStats>,
}

impl GoldViews {
    pub fn is_empty(&self) -> bool {
        self.hourly.is_empty() && self.areas.is_empty() && self.payments.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.hourly.len() + self.areas.len() + self.payments.len()
    }
}
