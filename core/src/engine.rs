//! Extrapolation engine: per-key period state machine and month-end projection.
//!
//! TRANSITION ORDER (fixed, evaluated every cycle, for every tracking key):
//!   1. Init          no record exists for the key
//!   2. Rollover      first_day == 0 and used_last_day > 0 (a finalize is pending)
//!   3. Forced reset  continuous modes only, first_month != current month
//!   4. Update        always
//!   5. Finalize      only when the scheduler signals the day boundary
//!
//! At most one of 1–3 fires: each of them sets first_month to the current
//! month and clears used_last_day, which disarms the later checks.

use crate::{
    clock::CycleContext,
    store::{AccountingRecord, AccountingStore, Lookup},
    types::{TrackingKey, GIGABYTE, MEGABYTE, TERABYTE},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Init,
    Rollover,
    ForcedReset,
    /// Record resumed as-is.
    Continue,
}

/// Projection for one tracking key after this cycle's update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEstimate {
    /// Terabytes.
    pub used_current: f64,
    /// Estimated month-end usage, terabytes.
    pub used_month:   f64,
    /// Growth since the period began, gigabytes.
    pub used_growth:  f64,
    /// Average growth per day, megabytes.
    pub used_average: f64,
    /// Day-of-month the period began at.
    pub first_day:    f64,
    pub days_elapsed: f64,
    pub transition:   Transition,
}

pub fn select_transition(lookup: &Lookup, ctx: &CycleContext) -> Transition {
    match lookup {
        Lookup::Absent => Transition::Init,
        Lookup::Present(r) if r.first_day == 0.0 && r.used_last_day > 0.0 => Transition::Rollover,
        Lookup::Present(r) if ctx.mode.resets_on_new_month() && r.first_month != ctx.month => {
            Transition::ForcedReset
        }
        Lookup::Present(_) => Transition::Continue,
    }
}

/// Apply transitions 1–3 and return the record the update step works on.
pub fn begin_period(lookup: Lookup, observed: f64, ctx: &CycleContext) -> (AccountingRecord, Transition) {
    let transition = select_transition(&lookup, ctx);
    let record = match lookup {
        Lookup::Absent => AccountingRecord::start(ctx.day_of_month, ctx.month, observed),
        Lookup::Present(mut r) => {
            match transition {
                Transition::Rollover => {
                    r.first_month = ctx.month;
                    r.used_first_day = r.used_last_day;
                    r.used_last_day = 0.0;
                }
                Transition::ForcedReset => {
                    r.first_month = ctx.month;
                    r.first_day = 0.0;
                    r.used_first_day = r.used_last_day;
                    r.used_last_day = 0.0;
                }
                Transition::Init | Transition::Continue => {}
            }
            r
        }
    };
    (record, transition)
}

/// Update step: record the observation and recompute the derived fields.
/// Returns the days elapsed since the period began.
pub fn project(record: &mut AccountingRecord, observed: f64, ctx: &CycleContext) -> f64 {
    record.used_current_day = observed;
    let days_elapsed = ctx.day_of_month - record.first_day;

    if days_elapsed > 0.0 {
        let delta = record.used_current_day - record.used_first_day;
        record.used_month = delta / days_elapsed * (ctx.month_days_f64() - record.first_day)
            + record.used_first_day;
        record.used_growth = delta * TERABYTE / GIGABYTE;
        record.used_average = record.used_growth / days_elapsed * GIGABYTE / MEGABYTE;
    } else {
        record.used_month = record.used_first_day;
        record.used_growth = 0.0;
        record.used_average = 0.0;
    }
    days_elapsed
}

/// Day-boundary finalize: hand today's value to tomorrow's Rollover.
pub fn finalize_day(record: &mut AccountingRecord) {
    record.first_day = 0.0;
    record.used_last_day = record.used_current_day;
}

/// Run the full transition sequence for one key and write the result back.
pub fn track(
    store: &mut AccountingStore,
    node: &str,
    key: &TrackingKey,
    observed: f64,
    ctx: &CycleContext,
) -> UsageEstimate {
    let lookup = store.get(node, key, ctx.month);
    let (mut record, transition) = begin_period(lookup, observed, ctx);
    let days_elapsed = project(&mut record, observed, ctx);

    let estimate = UsageEstimate {
        used_current: record.used_current_day,
        used_month:   record.used_month,
        used_growth:  record.used_growth,
        used_average: record.used_average,
        first_day:    record.first_day,
        days_elapsed,
        transition,
    };

    if ctx.finalize_day {
        finalize_day(&mut record);
    }

    log::debug!(
        "node={node} key={key} transition={transition:?} D={:.4} elapsed={days_elapsed:.4} \
         current={:.6} month={:.6} growth={:.3}",
        ctx.day_of_month,
        estimate.used_current,
        estimate.used_month,
        estimate.used_growth,
    );

    store.upsert(node, key, &record);
    estimate
}
