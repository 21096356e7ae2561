//! Typed view of one raw exporter snapshot.
//!
//! RULE: a field the snapshot did not report stays `None`.
//! Zero is a real observation, absence is not.

use crate::types::SatelliteId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-satellite counters, all in decimal terabytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SatelliteSummary {
    pub storage_summary: Option<f64>,
    pub egress_summary:  Option<f64>,
    /// Usually missing for the first days of a month.
    pub repair_summary:  Option<f64>,
    pub storage_used:    Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeObservation {
    /// Total disk used, terabytes.
    pub storage_used_total: Option<f64>,
    /// Current-month payout plus held-back amount, currency units.
    pub payout_raw:         Option<f64>,
    pub per_satellite:      BTreeMap<SatelliteId, SatelliteSummary>,
}

impl NodeObservation {
    pub fn satellite_mut(&mut self, id: &str) -> &mut SatelliteSummary {
        self.per_satellite.entry(id.to_string()).or_default()
    }

    /// Payout counters accumulate; the first one seen establishes presence.
    pub fn add_payout(&mut self, amount: f64) {
        *self.payout_raw.get_or_insert(0.0) += amount;
    }

    pub fn satellite_count(&self) -> usize {
        self.per_satellite.len()
    }
}
