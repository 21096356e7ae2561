//! Cycle clock: the time-of-month values every tracking key in one cycle shares.
//!
//! A `CycleContext` is computed exactly once per cycle and passed by
//! reference into the engine, the payout calculator and the report writers.
//! Nothing in the crate reads the wall clock on its own.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// How a stream tracks its accounting periods.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// One-shot detail reports. Periods only roll over through a day-boundary finalize.
    #[default]
    Detail,
    /// Long-running export streams. A new calendar month forces a period reset.
    Continuous,
}

impl TrackingMode {
    pub fn resets_on_new_month(&self) -> bool {
        matches!(self, Self::Continuous)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CycleContext {
    pub timestamp:    DateTime<Utc>,
    pub year:         i32,
    pub month:        u32,
    pub month_days:   u32,
    /// Fractional day-of-month `D`: whole days elapsed plus the elapsed part of today.
    pub day_of_month: f64,
    pub mode:         TrackingMode,
    /// Set by the scheduler on the last cycle of a UTC day.
    pub finalize_day: bool,
}

impl CycleContext {
    pub fn at(timestamp: DateTime<Utc>, mode: TrackingMode, finalize_day: bool) -> Self {
        let year = timestamp.year();
        let month = timestamp.month();
        let seconds = timestamp.num_seconds_from_midnight() as f64;
        Self {
            timestamp,
            year,
            month,
            month_days: days_in_month(year, month),
            day_of_month: f64::from(timestamp.day() - 1) + seconds / SECONDS_PER_DAY,
            mode,
            finalize_day,
        }
    }

    pub fn month_days_f64(&self) -> f64 {
        f64::from(self.month_days)
    }

    /// `YYYY-MM-DD` of the cycle, used for dated output file names.
    pub fn date_stamp(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }
}

/// Calendar length of `month` in `year`.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 31,
    }
}
