//! Shared primitive types and unit constants used across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Configured name of a storage node.
pub type NodeName = String;

/// Satellite identifier as it appears in the exporter's `url=` label.
pub type SatelliteId = String;

// Decimal units; the exporter reports raw bytes.
pub const PETABYTE: f64 = 1e15;
pub const TERABYTE: f64 = 1e12;
pub const GIGABYTE: f64 = 1e9;
pub const MEGABYTE: f64 = 1e6;
pub const KILOBYTE: f64 = 1e3;

/// Payout counters are reported in cents.
pub const CENTS_PER_UNIT: f64 = 100.0;

/// Persisted key of the node-aggregate record.
pub const NODE_TOTAL_KEY: &str = "node_total";

/// One accounting series: a node's aggregate or one (node, satellite) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingKey {
    NodeTotal,
    Satellite(SatelliteId),
}

impl TrackingKey {
    /// Key string used inside a node's entry of the state document.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NodeTotal => NODE_TOTAL_KEY,
            Self::Satellite(id) => id,
        }
    }

    pub fn from_stored(key: &str) -> Self {
        if key == NODE_TOTAL_KEY {
            Self::NodeTotal
        } else {
            Self::Satellite(key.to_string())
        }
    }
}

impl fmt::Display for TrackingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
