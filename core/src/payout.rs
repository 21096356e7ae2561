//! Payout calculator: current and projected month payout per satellite and node.
//!
//! Satellite payout is derived from the satellite's own summaries:
//!
//!   payout = storage_summary / month_days * storage_rate
//!          + (egress_summary - repair_summary) * customer_egress_rate
//!          + repair_summary * repair_egress_rate
//!
//! Without a repair summary (common at month start) the repair split is
//! dropped and all egress is paid at the customer rate.
//!
//! Guards: `D <= 0` yields zero per-day figures; no stored data yields a zero
//! `payout_tb` and a `payout_tb_month` chosen by `ZeroStoragePolicy`.

use crate::{
    clock::CycleContext,
    config::{PayoutRates, ZeroStoragePolicy},
    observation::{NodeObservation, SatelliteSummary},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutBasis {
    /// Storage, customer egress and repair egress all reported.
    Full,
    /// Repair summary not yet reported.
    WithoutRepair,
    /// Storage or egress summary missing; payout reported as 0.
    Missing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayoutFigures {
    pub payout:          f64,
    /// Linear projection to month end.
    pub payout_month:    f64,
    pub payout_tb:       f64,
    /// Never below the storage rate unless `ZeroStoragePolicy::ReportZero` applies.
    pub payout_tb_month: f64,
    /// Per day of month elapsed.
    pub payout_average:  f64,
}

/// Month-to-date payout of one satellite from its summaries.
pub fn satellite_payout_base(
    summary: &SatelliteSummary,
    month_days: f64,
    rates: &PayoutRates,
) -> (f64, PayoutBasis) {
    let (Some(storage), Some(egress)) = (summary.storage_summary, summary.egress_summary) else {
        return (0.0, PayoutBasis::Missing);
    };
    let storage_part = storage / month_days * rates.storage_per_tb;
    match summary.repair_summary {
        Some(repair) => (
            storage_part
                + (egress - repair) * rates.customer_egress
                + repair * rates.repair_egress,
            PayoutBasis::Full,
        ),
        None => (
            storage_part + egress * rates.customer_egress,
            PayoutBasis::WithoutRepair,
        ),
    }
}

/// Derive the projected figures from a month-to-date payout.
pub fn project_payout(
    payout: f64,
    storage_used: Option<f64>,
    ctx: &CycleContext,
    rates: &PayoutRates,
    policy: ZeroStoragePolicy,
) -> PayoutFigures {
    let d = ctx.day_of_month;
    let month_days = ctx.month_days_f64();
    let payout_average = if d > 0.0 { payout / d } else { 0.0 };

    let (payout_tb, payout_tb_month) = match storage_used.filter(|s| *s > 0.0) {
        Some(stored) => {
            let per_tb = payout / stored;
            let per_tb_month = if d > 0.0 { per_tb / d * month_days } else { 0.0 };
            (per_tb, per_tb_month.max(rates.storage_per_tb))
        }
        None => match policy {
            ZeroStoragePolicy::ApplyFloor => (0.0, rates.storage_per_tb),
            ZeroStoragePolicy::ReportZero => (0.0, 0.0),
        },
    };

    PayoutFigures {
        payout,
        payout_month: payout_average * month_days,
        payout_tb,
        payout_tb_month,
        payout_average,
    }
}

pub fn satellite_payout(
    satellite: &str,
    summary: &SatelliteSummary,
    ctx: &CycleContext,
    rates: &PayoutRates,
    policy: ZeroStoragePolicy,
) -> (PayoutFigures, PayoutBasis) {
    let (payout, basis) = satellite_payout_base(summary, ctx.month_days_f64(), rates);
    match basis {
        PayoutBasis::Missing => log::warn!(
            "satellite {satellite}: storage or egress summary missing; payout reported as 0"
        ),
        PayoutBasis::WithoutRepair => log::debug!(
            "satellite {satellite}: no repair summary yet; using reduced payout formula"
        ),
        PayoutBasis::Full => {}
    }
    (project_payout(payout, summary.storage_used, ctx, rates, policy), basis)
}

/// Node-level figures from the node's own payout counters.
/// `payout_month` is later replaced by the reconciled satellite sum.
pub fn node_payout(
    observation: &NodeObservation,
    ctx: &CycleContext,
    rates: &PayoutRates,
    policy: ZeroStoragePolicy,
) -> Option<PayoutFigures> {
    let payout = observation.payout_raw?;
    Some(project_payout(payout, observation.storage_used_total, ctx, rates, policy))
}
