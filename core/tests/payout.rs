//! Payout calculator: formulas, fallback, guards and the per-TB floor.

use chrono::{TimeZone, Utc};
use fleet_accounting_core::{
    clock::{CycleContext, TrackingMode},
    config::{PayoutRates, ZeroStoragePolicy},
    observation::{NodeObservation, SatelliteSummary},
    payout::{self, PayoutBasis},
};

fn assert_close(actual: f64, expected: f64, what: &str) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "{what}: expected {expected}, got {actual}"
    );
}

/// June 2024, noon of the 11th: D = 10.5, 30 days.
fn ctx() -> CycleContext {
    CycleContext::at(
        Utc.with_ymd_and_hms(2024, 6, 11, 12, 0, 0).unwrap(),
        TrackingMode::Detail,
        false,
    )
}

fn summary(storage: f64, egress: f64, repair: Option<f64>, used: Option<f64>) -> SatelliteSummary {
    SatelliteSummary {
        storage_summary: Some(storage),
        egress_summary:  Some(egress),
        repair_summary:  repair,
        storage_used:    used,
    }
}

#[test]
fn missing_repair_summary_uses_the_reduced_formula() {
    let rates = PayoutRates::default();
    let (base, basis) = payout::satellite_payout_base(&summary(1.0, 0.05, None, None), 30.0, &rates);
    assert_eq!(basis, PayoutBasis::WithoutRepair);
    assert_close(base, 1.0 / 30.0 * 1.5 + 0.05 * 20.0, "reduced payout");
}

#[test]
fn repair_egress_is_paid_at_its_own_rate() {
    let rates = PayoutRates::default();
    let (base, basis) =
        payout::satellite_payout_base(&summary(1.0, 0.05, Some(0.01), None), 30.0, &rates);
    assert_eq!(basis, PayoutBasis::Full);
    assert_close(base, 0.05 + 0.04 * 20.0 + 0.01 * 10.0, "full payout");
}

#[test]
fn missing_storage_or_egress_pays_nothing_without_failing() {
    let rates = PayoutRates::default();
    let partial = SatelliteSummary {
        storage_summary: Some(2.0),
        ..SatelliteSummary::default()
    };
    let (figures, basis) =
        payout::satellite_payout("us1", &partial, &ctx(), &rates, ZeroStoragePolicy::ApplyFloor);
    assert_eq!(basis, PayoutBasis::Missing);
    assert_eq!(figures.payout, 0.0);
    assert_eq!(figures.payout_month, 0.0);
}

#[test]
fn projections_scale_by_elapsed_days() {
    let rates = PayoutRates::default();
    let ctx = ctx();
    let (f, _) = payout::satellite_payout(
        "us1",
        &summary(3.0, 0.1, Some(0.02), Some(2.0)),
        &ctx,
        &rates,
        ZeroStoragePolicy::ApplyFloor,
    );
    let expected = 3.0 / 30.0 * 1.5 + 0.08 * 20.0 + 0.02 * 10.0;
    assert_close(f.payout, expected, "payout");
    assert_close(f.payout_average, expected / 10.5, "average");
    assert_close(f.payout_month, expected / 10.5 * 30.0, "month");
    assert_close(f.payout_tb, expected / 2.0, "per TB");
    assert_close(f.payout_tb_month, (expected / 2.0 / 10.5 * 30.0).max(1.5), "per TB month");
}

#[test]
fn per_tb_month_never_drops_below_the_storage_rate() {
    let rates = PayoutRates::default();
    let ctx = ctx();
    for (storage, egress, used) in [(0.0, 0.0, 5.0), (0.1, 0.0, 40.0), (9.0, 2.0, 0.5), (1.0, 0.01, 0.0)] {
        let (f, _) = payout::satellite_payout(
            "sat",
            &summary(storage, egress, None, Some(used)),
            &ctx,
            &rates,
            ZeroStoragePolicy::ApplyFloor,
        );
        assert!(f.payout_tb_month >= rates.storage_per_tb, "{f:?}");
    }
}

#[test]
fn zero_storage_is_guarded_and_follows_the_policy() {
    let rates = PayoutRates::default();
    let ctx = ctx();
    let s = summary(1.0, 0.05, None, Some(0.0));

    let (floored, _) = payout::satellite_payout("s", &s, &ctx, &rates, ZeroStoragePolicy::ApplyFloor);
    assert_eq!(floored.payout_tb, 0.0);
    assert_eq!(floored.payout_tb_month, 1.5);

    let (zeroed, _) = payout::satellite_payout("s", &s, &ctx, &rates, ZeroStoragePolicy::ReportZero);
    assert_eq!(zeroed.payout_tb, 0.0);
    assert_eq!(zeroed.payout_tb_month, 0.0);
    assert!(zeroed.payout_month > 0.0);
}

#[test]
fn first_instant_of_month_does_not_divide_by_zero() {
    let rates = PayoutRates::default();
    let ctx = CycleContext::at(
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
        TrackingMode::Continuous,
        false,
    );
    let f = payout::project_payout(0.7, Some(1.0), &ctx, &rates, ZeroStoragePolicy::ApplyFloor);
    assert_eq!(f.payout_average, 0.0);
    assert_eq!(f.payout_month, 0.0);
    assert_eq!(f.payout_tb_month, 1.5);
    assert!(f.payout_tb.is_finite());
}

#[test]
fn node_payout_needs_reported_counters() {
    let rates = PayoutRates::default();
    let ctx = ctx();
    let mut obs = NodeObservation::default();
    assert!(payout::node_payout(&obs, &ctx, &rates, ZeroStoragePolicy::ApplyFloor).is_none());

    obs.add_payout(21.0);
    obs.storage_used_total = Some(4.2);
    let f = payout::node_payout(&obs, &ctx, &rates, ZeroStoragePolicy::ApplyFloor).unwrap();
    assert_close(f.payout_tb, 5.0, "node per TB");
    assert_close(f.payout_average, 2.0, "node per day");
}
