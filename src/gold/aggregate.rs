//! Pure aggregation of silver rows into the gold views.

use chrono::Timelike;
use std::collections::{BTreeMap, HashMap};

use crate::gold::types::{AreaStats, GoldViews, HourlyStats, PaymentStats};
use crate::parsing::parse_timestamp;
use crate::silver::SilverTrip;
use crate::utility::{mean, round2};

/// Number of pickup areas kept in [`area_stats`].
pub const TOP_AREAS: usize = 10;

#[derive(Default)]
struct Group {
    fares: Vec<f64>,
    durations: Vec<f64>,
}

fn avg(values: &[f64]) -> f64 {
    mean(values).map(round2).unwrap_or_default()
}

/// Groups trips by hour of day, ascending, with the unparsable-timestamp
/// group first. Also returns how many timestamps failed to parse.
pub fn hourly_stats(rows: &[SilverTrip]) -> (Vec<HourlyStats>, usize) {
    let mut groups: BTreeMap<Option<u32>, Group> = BTreeMap::new();
    let mut unparsable = 0;

    for row in rows {
        let hour = row
            .trip_start_timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .map(|ts| ts.hour());
        if hour.is_none() {
            unparsable += 1;
        }

        let group = groups.entry(hour).or_default();
        group.fares.push(row.fare);
        group.durations.push(row.duration_min);
    }

    let stats = groups
        .into_iter()
        .map(|(hour, g)| HourlyStats {
            hour,
            trip_count: g.fares.len() as u64,
            avg_fare: avg(&g.fares),
            avg_duration: avg(&g.durations),
        })
        .collect();

    (stats, unparsable)
}

/// The [`TOP_AREAS`] busiest pickup areas, by descending trip count. Ties are
/// broken by ascending area code.
pub fn area_stats(rows: &[SilverTrip]) -> Vec<AreaStats> {
    let mut groups: HashMap<i64, Vec<f64>> = HashMap::new();
    for row in rows {
        groups
            .entry(row.pickup_community_area)
            .or_default()
            .push(row.fare);
    }

    let mut stats: Vec<AreaStats> = groups
        .into_iter()
        .map(|(area, fares)| AreaStats {
            pickup_community_area: area,
            trip_count: fares.len() as u64,
            avg_fare: avg(&fares),
        })
        .collect();

    stats.sort_by(|a, b| {
        b.trip_count
            .cmp(&a.trip_count)
            .then(a.pickup_community_area.cmp(&b.pickup_community_area))
    });
    stats.truncate(TOP_AREAS);
    stats
}

/// Trip count and mean total cost per payment type, by descending count. A
/// missing payment type is its own group.
pub fn payment_stats(rows: &[SilverTrip]) -> Vec<PaymentStats> {
    let mut groups: HashMap<Option<&str>, (u64, Vec<f64>)> = HashMap::new();
    for row in rows {
        let (count, totals) = groups.entry(row.payment_type.as_deref()).or_default();
        *count += 1;
        totals.extend(row.trip_total);
    }

    let mut stats: Vec<PaymentStats> = groups
        .into_iter()
        .map(|(payment_type, (count, totals))| PaymentStats {
            payment_type: payment_type.map(str::to_string),
            count,
            avg_cost: mean(&totals).map(round2),
        })
        .collect();

    stats.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.payment_type.cmp(&b.payment_type))
    });
    stats
}

/// Computes all three views. The second value is the number of start
/// timestamps that could not be parsed.
pub fn compute_views(rows: &[SilverTrip]) -> (GoldViews, usize) {
    let (hourly, unparsable) = hourly_stats(rows);
    let views = GoldViews {
        hourly,
        areas: area_stats(rows),
        payments: payment_stats(rows),
    };
    (views, unparsable)
}
