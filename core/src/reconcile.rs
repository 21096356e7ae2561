//! Reconciler: node-level month-end totals from satellite estimates.
//!
//! Node-reported aggregates drift from the sum of satellite-reported
//! counters. The satellite sum is authoritative for `used_month` and
//! `payout_month`; every other node-level figure is kept as computed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciledTotals {
    pub used_month:   f64,
    pub payout_month: f64,
}

/// Sum `(used_month, payout_month)` pairs. No satellites reconcile to zero.
pub fn reconcile<I>(satellites: I) -> ReconciledTotals
where
    I: IntoIterator<Item = (f64, f64)>,
{
    satellites
        .into_iter()
        .fold(ReconciledTotals::default(), |acc, (used, payout)| ReconciledTotals {
            used_month:   acc.used_month + used,
            payout_month: acc.payout_month + payout,
        })
}
