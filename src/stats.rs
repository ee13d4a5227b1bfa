//! Per-stage data-quality counters.
//!
//! Each stage fills in a [`StageStats`] as it runs. Rows the cleaning rules
//! reject are dropped without error, so these counters are the only place
//! that rejection shows up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Bronze,
    Silver,
    Gold,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Bronze => "bronze",
            Stage::Silver => "silver",
            Stage::Gold => "gold",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,

    // input
    pub rows_read: usize,
    pub dropped_null_id: usize,

    // data quality
    pub parse_failures: usize,
    pub schema_violations: usize,
    pub duplicates_removed: usize,
    pub filtered_out: usize,

    // output
    pub rows_written: usize,
    /// Set when the stage found no input and wrote nothing.
    pub skipped: bool,
}

impl StageStats {
    pub fn new(stage: Stage) -> Self {
        StageStats {
            timestamp: Utc::now(),
            stage,
            ..Default::default()
        }
    }

    /// Marks the stage as a soft stop.
    pub fn skipped(mut self) -> Self {
        self.skipped = true;
        self
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of input rows that did not make it into the output.
    pub fn rejection_pct(&self) -> f64 {
        Self::pct(
            self.rows_read.saturating_sub(self.rows_written),
            self.rows_read,
        )
    }
}
