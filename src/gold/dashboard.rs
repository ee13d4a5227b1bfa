//! Headline metrics for the dashboard, derived from the gold views.

use serde::Serialize;
use std::fmt;

use crate::gold::types::GoldViews;
use crate::utility::{mean, round2};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_trips: u64,
    /// Unweighted mean of the hourly average fares.
    pub avg_fare: Option<f64>,
    pub top_pickup_area: Option<i64>,
    pub top_payment_type: Option<String>,
}

impl DashboardSummary {
    /// Returns `None` when the gold views hold no data yet.
    pub fn from_views(views: &GoldViews) -> Option<Self> {
        if views.is_empty() {
            return None;
        }

        let fares: Vec<f64> = views.hourly.iter().map(|h| h.avg_fare).collect();

        Some(DashboardSummary {
            total_trips: views.hourly.iter().map(|h| h.trip_count).sum(),
            avg_fare: mean(&fares).map(round2),
            top_pickup_area: views.areas.first().map(|a| a.pickup_community_area),
            top_payment_type: views
                .payments
                .first()
                .map(|p| p.payment_type.clone().unwrap_or_else(|| "Unknown".to_string())),
        })
    }
}

impl fmt::Display for DashboardSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total analyzed trips: {}", self.total_trips)?;
        match self.avg_fare {
            Some(fare) => writeln!(f, "Average fare: ${fare:.2}")?,
            None => writeln!(f, "Average fare: n/a")?,
        }
        match self.top_pickup_area {
            Some(area) => writeln!(f, "Busiest pickup area: {area}")?,
            None => writeln!(f, "Busiest pickup area: n/a")?,
        }
        write!(
            f,
            "Leading payment type: {}",
            self.top_payment_type.as_deref().unwrap_or("n/a")
        )
    }
}
