//! One accounting cycle for a stream.
//!
//! EXECUTION ORDER per node (fixed):
//!   1. MetricParser          raw snapshot → NodeObservation
//!   2. ExtrapolationEngine   node-total key
//!   3. ExtrapolationEngine   every satellite key, in satellite-id order
//!   4. PayoutCalculator      every satellite, then the node
//!   5. Reconciler            node used_month / payout_month ← satellite sums,
//!                            plus stored used_month of this month's satellites
//!                            missing from the snapshot
//!
//! Nodes whose snapshot could not be fetched are skipped without touching
//! their records. The caller holds the store lock for the whole cycle.

use crate::{
    clock::CycleContext,
    config::{FleetConfig, NodeConfig, PayoutRates, ZeroStoragePolicy},
    engine::{self, UsageEstimate},
    error::FetchError,
    observation::{NodeObservation, SatelliteSummary},
    parser,
    payout::{self, PayoutBasis, PayoutFigures},
    reconcile::{self, ReconciledTotals},
    store::AccountingStore,
    types::{NodeName, SatelliteId, TrackingKey},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A raw snapshot, or the reason there is none.
#[derive(Debug, Clone)]
pub struct FetchedSnapshot {
    pub node:   NodeConfig,
    pub result: Result<String, FetchError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteReport {
    pub satellite: SatelliteId,
    pub summary:   SatelliteSummary,
    /// `None` when the snapshot lacked the satellite's current storage;
    /// its record is left untouched this cycle.
    pub usage:     Option<UsageEstimate>,
    pub payout:    PayoutFigures,
    pub basis:     PayoutBasis,
}

impl SatelliteReport {
    pub fn used_month(&self) -> f64 {
        self.usage.as_ref().map_or(0.0, |u| u.used_month)
    }
}

/// Everything a report writer needs about one node after a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub node:         NodeName,
    pub location:     Option<String>,
    pub observation:  NodeObservation,
    /// Node-total series. `used_month` already holds the reconciled value.
    pub usage:        Option<UsageEstimate>,
    /// Node-level payout. `payout_month` already holds the reconciled value.
    pub payout:       Option<PayoutFigures>,
    pub satellites:   Vec<SatelliteReport>,
    /// Satellites with a record for this month but no current storage in this
    /// snapshot, with the stored `used_month` that still counts toward the node.
    pub carried_over: BTreeMap<SatelliteId, f64>,
    pub reconciled:   ReconciledTotals,
}

#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub reports:     Vec<NodeReport>,
    pub failed:      Vec<(NodeName, FetchError)>,
    pub warnings:    usize,
    /// Stopped early on a shutdown request.
    pub interrupted: bool,
}

pub fn process_node(
    store: &mut AccountingStore,
    ctx: &CycleContext,
    rates: &PayoutRates,
    policy: ZeroStoragePolicy,
    node: &NodeConfig,
    observation: NodeObservation,
) -> NodeReport {
    let name = node.name.as_str();

    let mut usage = match observation.storage_used_total {
        Some(used) => Some(engine::track(store, name, &TrackingKey::NodeTotal, used, ctx)),
        None => {
            log::warn!("node {name}: total disk usage not reported; node total not tracked");
            None
        }
    };

    let satellites: Vec<SatelliteReport> = observation
        .per_satellite
        .iter()
        .map(|(sat, summary)| {
            let usage = match summary.storage_used {
                Some(used) => {
                    let key = TrackingKey::Satellite(sat.clone());
                    Some(engine::track(store, name, &key, used, ctx))
                }
                None => {
                    log::warn!("node {name}: satellite {sat} reported no current storage");
                    None
                }
            };
            let (payout, basis) = payout::satellite_payout(sat, summary, ctx, rates, policy);
            SatelliteReport {
                satellite: sat.clone(),
                summary: summary.clone(),
                usage,
                payout,
                basis,
            }
        })
        .collect();

    let mut node_payout = payout::node_payout(&observation, ctx, rates, policy);

    let carried_over = carried_over_satellites(store, name, ctx, &satellites);
    let reconciled = reconcile::reconcile(
        satellites
            .iter()
            .map(|s| (s.used_month(), s.payout.payout_month))
            .chain(carried_over.values().map(|used| (*used, 0.0))),
    );
    if let Some(u) = usage.as_mut() {
        u.used_month = reconciled.used_month;
    }
    if let Some(p) = node_payout.as_mut() {
        p.payout_month = reconciled.payout_month;
    }

    log::info!(
        "node {name}: {} satellite(s), month estimate {:.3} TB, payout estimate {:.2}",
        satellites.len(),
        reconciled.used_month,
        reconciled.payout_month,
    );

    NodeReport {
        node: name.to_string(),
        location: node.location.clone(),
        observation,
        usage,
        payout: node_payout,
        satellites,
        carried_over,
        reconciled,
    }
}

/// Stored `used_month` of every satellite known to `node` this month that was
/// not tracked in the current snapshot. Records from an earlier month are stale
/// and do not count.
fn carried_over_satellites(
    store: &AccountingStore,
    node: &str,
    ctx: &CycleContext,
    tracked: &[SatelliteReport],
) -> BTreeMap<SatelliteId, f64> {
    store
        .records_for(node, ctx.month)
        .into_iter()
        .filter_map(|(key, record)| match key {
            TrackingKey::Satellite(sat)
                if record.first_month == ctx.month
                    && !tracked.iter().any(|s| s.satellite == sat && s.usage.is_some()) =>
            {
                log::info!(
                    "node {node}: satellite {sat} not reported this cycle; keeping {:.3} TB",
                    record.used_month
                );
                Some((sat, record.used_month))
            }
            _ => None,
        })
        .collect()
}

pub fn run_cycle<I, F>(
    store: &mut AccountingStore,
    ctx: &CycleContext,
    config: &FleetConfig,
    snapshots: I,
    should_stop: F,
) -> CycleOutcome
where
    I: IntoIterator<Item = FetchedSnapshot>,
    F: Fn() -> bool,
{
    let mut outcome = CycleOutcome::default();

    for snapshot in snapshots {
        if should_stop() {
            log::info!("shutdown requested; ending cycle before node {}", snapshot.node.name);
            outcome.interrupted = true;
            break;
        }
        let document = match snapshot.result {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("node {}: snapshot unavailable ({e}); skipped", snapshot.node.name);
                outcome.failed.push((snapshot.node.name, e));
                continue;
            }
        };
        let parsed = parser::parse_snapshot(&document);
        outcome.warnings += parsed.warnings.len();
        let report = process_node(
            store,
            ctx,
            &config.rates,
            config.zero_storage_policy,
            &snapshot.node,
            parsed.observation,
        );
        outcome.reports.push(report);
    }

    log::info!(
        "cycle D={:.4}: {} node(s) processed, {} failed, {} parse warning(s)",
        ctx.day_of_month,
        outcome.reports.len(),
        outcome.failed.len(),
        outcome.warnings,
    );
    outcome
}
