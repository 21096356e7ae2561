//! Exporter snapshot parser.
//!
//! Input is the line-oriented `metric_name{labels} value` text a storage-node
//! exporter serves. Parsing is partial-success: a bad value drops that one
//! metric with a warning and the rest of the document is still read.

use crate::{
    observation::NodeObservation,
    types::{CENTS_PER_UNIT, TERABYTE},
};
use std::fmt;

pub const METRIC_DISK_USED: &str = r#"storj_total_diskspace{type="used"}"#;
pub const METRIC_PAYOUT:    &str = r#"storj_payout_currentMonth{type="payout"}"#;
pub const METRIC_HELD:      &str = r#"storj_payout_currentMonth{type="held"}"#;

const MARK_STORAGE_SUMMARY: &str = "storageSummary";
const MARK_EGRESS_SUMMARY:  &str = "egressSummary";
const MARK_MONTH_EGRESS:    &str = "storj_sat_month_egress";
const MARK_REPAIR:          &str = "repair";
const MARK_STORAGE_USED:    &str = "currentStorageUsed";

const SATELLITE_LABEL: &str = "url=";
/// Every satellite in the exporter vocabulary is addressed on this port.
pub const SATELLITE_PORT_SUFFIX: &str = ":7777";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    DiskUsed,
    Payout,
    Held,
    StorageSummary,
    EgressSummary,
    RepairEgress,
    CurrentStorageUsed,
}

impl MetricKind {
    fn classify(name: &str) -> Option<Self> {
        match name {
            METRIC_DISK_USED => return Some(Self::DiskUsed),
            METRIC_PAYOUT    => return Some(Self::Payout),
            METRIC_HELD      => return Some(Self::Held),
            _ => {}
        }
        if name.contains(MARK_STORAGE_SUMMARY) {
            Some(Self::StorageSummary)
        } else if name.contains(MARK_EGRESS_SUMMARY) {
            Some(Self::EgressSummary)
        } else if name.contains(MARK_REPAIR) && name.contains(MARK_MONTH_EGRESS) {
            Some(Self::RepairEgress)
        } else if name.contains(MARK_STORAGE_USED) {
            Some(Self::CurrentStorageUsed)
        } else {
            None
        }
    }

    fn is_per_satellite(self) -> bool {
        !matches!(self, Self::DiskUsed | Self::Payout | Self::Held)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    /// 1-based line number in the snapshot.
    pub line:   usize,
    pub metric: String,
    pub reason: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}: {}", self.line, self.metric, self.reason)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub observation: NodeObservation,
    pub warnings:    Vec<ParseWarning>,
}

/// Extract the satellite id from a metric's label section:
/// the text after `url=` (quote stripped) up to the fixed port suffix.
pub fn satellite_id(metric: &str) -> Option<&str> {
    let start = metric.find(SATELLITE_LABEL)? + SATELLITE_LABEL.len();
    let rest = &metric[start..];
    let rest = rest.strip_prefix('"').unwrap_or(rest);
    let end = rest.find(SATELLITE_PORT_SUFFIX)?;
    let id = &rest[..end];
    (!id.is_empty()).then_some(id)
}

pub fn parse_snapshot(document: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    for (index, raw) in document.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else { continue };
        let Some(kind) = MetricKind::classify(name) else { continue };

        let warn = |reason: &str| ParseWarning {
            line:   index + 1,
            metric: name.to_string(),
            reason: reason.to_string(),
        };

        let value = match words.next().map(str::parse::<f64>) {
            Some(Ok(v)) if v.is_finite() => v,
            Some(Ok(_)) => {
                outcome.warnings.push(warn("non-finite value"));
                continue;
            }
            Some(Err(e)) => {
                outcome.warnings.push(warn(&format!("malformed value: {e}")));
                continue;
            }
            None => {
                outcome.warnings.push(warn("missing value"));
                continue;
            }
        };

        let obs = &mut outcome.observation;
        if !kind.is_per_satellite() {
            match kind {
                MetricKind::DiskUsed => obs.storage_used_total = Some(value / TERABYTE),
                _ => obs.add_payout(value / CENTS_PER_UNIT),
            }
            continue;
        }

        let Some(sat) = satellite_id(name) else {
            outcome.warnings.push(warn("no satellite id in labels"));
            continue;
        };
        let summary = obs.satellite_mut(sat);
        let tb = Some(value / TERABYTE);
        match kind {
            MetricKind::StorageSummary     => summary.storage_summary = tb,
            MetricKind::EgressSummary      => summary.egress_summary = tb,
            MetricKind::RepairEgress       => summary.repair_summary = tb,
            MetricKind::CurrentStorageUsed => summary.storage_used = tb,
            _ => {}
        }
    }

    for w in &outcome.warnings {
        log::warn!("snapshot parse: {w}");
    }
    outcome
}
