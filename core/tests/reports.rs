//! Report writers and the SQLite cycle history.

use chrono::{TimeZone, Utc};
use fleet_accounting_core::{
    clock::{CycleContext, TrackingMode},
    config::FleetConfig,
    cycle::{run_cycle, FetchedSnapshot, NodeReport},
    history::CycleLog,
    report::{format_units, output_file_name, render_csv, render_json, render_text},
    store::AccountingStore,
};
use std::path::Path;

const NODE_A: &str = r#"storj_total_diskspace{type="used"} 2.5e+12
storj_payout_currentMonth{type="payout"} 1250
storj_sat_summary{type="storageSummary",url="us1.storj.io:7777"} 3.0e+13
storj_sat_summary{type="egressSummary",url="us1.storj.io:7777"} 5.0e+10
storj_sat_summary{type="currentStorageUsed",url="us1.storj.io:7777"} 1.2e+12
storj_sat_summary{type="storageSummary",url="eu1.storj.io:7777"} 6.0e+12
storj_sat_summary{type="egressSummary",url="eu1.storj.io:7777"} 2.0e+10
storj_sat_summary{type="currentStorageUsed",url="eu1.storj.io:7777"} 8.0e+11
"#;

fn ctx() -> CycleContext {
    CycleContext::at(
        Utc.with_ymd_and_hms(2024, 6, 6, 7, 12, 0).unwrap(),
        TrackingMode::Detail,
        false,
    )
}

fn reports() -> Vec<NodeReport> {
    let config = FleetConfig::default_test();
    let mut store = AccountingStore::in_memory();
    let snapshots = vec![FetchedSnapshot {
        node:   config.nodes[0].clone(),
        result: Ok(NODE_A.to_string()),
    }];
    run_cycle(&mut store, &ctx(), &config, snapshots, || false).reports
}

// ── Formatting ───────────────────────────────────────────────────────────────

#[test]
fn units_are_decimal_with_three_places() {
    assert_eq!(format_units(2.5e12), "2.500 TB");
    assert_eq!(format_units(1.5e3), "1.500 KB");
    assert_eq!(format_units(3.2e15), "3.200 PB");
    assert_eq!(format_units(999.0), "999 B");
    assert_eq!(format_units(-2.0e9), "-2.000 GB");
}

#[test]
fn dated_output_names_keep_extension() {
    let ctx = ctx();
    assert_eq!(
        output_file_name(Path::new("reports/storj.txt"), true, &ctx),
        Path::new("reports/storj-2024-06-06.txt")
    );
    assert_eq!(
        output_file_name(Path::new("reports/storj"), true, &ctx),
        Path::new("reports/storj-2024-06-06")
    );
    assert_eq!(
        output_file_name(Path::new("reports/storj.txt"), false, &ctx),
        Path::new("reports/storj.txt")
    );
}

// ── Writers ──────────────────────────────────────────────────────────────────

#[test]
fn csv_has_node_total_and_satellite_rows() {
    let csv = render_csv(&reports(), ';');
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("node;key;used_current_tb;used_month_tb"));
    assert_eq!(lines[0].split(';').count(), 11);

    // Semicolon files carry decimal commas.
    assert!(lines[1].starts_with("node-a;node_total;2,500000;2,000000;"));
    assert!(lines[2].starts_with("node-a;eu1.storj.io;0,800000;0,800000;"));
    assert!(lines[3].starts_with("node-a;us1.storj.io;1,200000;1,200000;"));
    for line in &lines[1..] {
        assert_eq!(line.split(';').count(), 11, "{line}");
    }
}

#[test]
fn comma_separated_csv_keeps_decimal_points() {
    let csv = render_csv(&reports(), ',');
    let total = csv.lines().nth(1).unwrap();
    assert!(total.starts_with("node-a,node_total,2.500000,2.000000,"));
    assert_eq!(total.split(',').count(), 11);
}

#[test]
fn csv_quotes_fields_containing_the_delimiter() {
    let mut reports = reports();
    reports[0].node = "node,a".into();
    let csv = render_csv(&reports, ',');
    assert!(csv.lines().nth(1).unwrap().starts_with("\"node,a\",node_total,"));
}

#[test]
fn text_report_names_nodes_and_satellites() {
    let text = render_text(&reports(), &ctx());
    assert!(text.starts_with("Report 2024-06-06 07:12:00 UTC (day 5.30 of 30)"));
    assert!(text.contains("Node: node-a (rack-1)"));
    assert!(text.contains("current 2.500 TB, end of month (estimated) 2.000 TB"));
    assert!(text.contains("  Satellite: eu1.storj.io"));
    assert!(text.contains("  Satellite: us1.storj.io"));
}

#[test]
fn json_report_round_trips() {
    let reports = reports();
    let json = render_json(&reports).unwrap();
    let back: Vec<NodeReport> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, reports);
}

// ── History ──────────────────────────────────────────────────────────────────

#[test]
fn history_appends_one_row_per_tracking_key() {
    let mut log = CycleLog::in_memory().unwrap();
    log.migrate().unwrap();

    let reports = reports();
    let written = log.append_report("detail", &ctx(), &reports[0]).unwrap();
    assert_eq!(written, 3);
    log.append_report("detail", &ctx(), &reports[0]).unwrap();

    assert_eq!(log.estimate_count("detail").unwrap(), 6);
    assert_eq!(log.estimate_count("export").unwrap(), 0);

    let rows = log.estimates_for_node("detail", "node-a").unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[0].tracking_key, "node_total");
    assert!((rows[0].used_month.unwrap() - 2.0).abs() < 1e-9);
    assert_eq!(rows[1].tracking_key, "eu1.storj.io");
    assert!((rows[0].day_of_month - 5.3).abs() < 1e-9);
    assert!(rows[0].id < rows[5].id);
}

#[test]
fn migrations_are_idempotent() {
    let log = CycleLog::in_memory().unwrap();
    log.migrate().unwrap();
    log.migrate().unwrap();
    assert_eq!(log.estimate_count("detail").unwrap(), 0);
}
