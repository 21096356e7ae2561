//! Report writers: text, JSON and CSV renderings of a cycle's node reports.
//!
//! Writers only format. They never touch the store.

use crate::{
    clock::CycleContext,
    cycle::NodeReport,
    error::AcctResult,
    types::{GIGABYTE, KILOBYTE, MEGABYTE, NODE_TOTAL_KEY, PETABYTE, TERABYTE},
};
use std::{
    fmt::{self, Write as _},
    path::{Path, PathBuf},
};

/// Render a byte count with a decimal unit, three decimals.
pub fn format_units(bytes: f64) -> String {
    let magnitude = bytes.abs();
    let scaled = [
        (PETABYTE, "PB"),
        (TERABYTE, "TB"),
        (GIGABYTE, "GB"),
        (MEGABYTE, "MB"),
        (KILOBYTE, "KB"),
    ]
    .into_iter()
    .find(|(unit, _)| magnitude >= *unit);

    match scaled {
        Some((unit, label)) => format!("{:.3} {label}", bytes / unit),
        None => format!("{} B", bytes.trunc() as i64),
    }
}

/// `reports/storj.txt` → `reports/storj-2024-06-06.txt` when `add_date` is set.
pub fn output_file_name(path: &Path, add_date: bool, ctx: &CycleContext) -> PathBuf {
    if !add_date {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{}.{}", ctx.date_stamp(), ext.to_string_lossy()),
        None => format!("{stem}-{}", ctx.date_stamp()),
    };
    path.with_file_name(name)
}

pub fn render_text(reports: &[NodeReport], ctx: &CycleContext) -> String {
    let mut out = String::new();
    // fmt::Write into a String never fails.
    let _ = write_text(&mut out, reports, ctx);
    out
}

fn write_text(out: &mut impl fmt::Write, reports: &[NodeReport], ctx: &CycleContext) -> fmt::Result {
    writeln!(
        out,
        "Report {} (day {:.2} of {})",
        ctx.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        ctx.day_of_month,
        ctx.month_days
    )?;

    for report in reports {
        writeln!(out)?;
        match &report.location {
            Some(location) => writeln!(out, "Node: {} ({location})", report.node)?,
            None => writeln!(out, "Node: {}", report.node)?,
        }

        if let Some(u) = &report.usage {
            writeln!(
                out,
                "  disk used: current {}, end of month (estimated) {}",
                format_units(u.used_current * TERABYTE),
                format_units(report.reconciled.used_month * TERABYTE),
            )?;
            writeln!(
                out,
                "  growth {} since day {:.2}, {} per day",
                format_units(u.used_growth * GIGABYTE),
                u.first_day,
                format_units(u.used_average * MEGABYTE),
            )?;
        }
        if let Some(p) = &report.payout {
            writeln!(
                out,
                "  payout: current {:.2}, end of month (estimated) {:.2}, per day {:.2}",
                p.payout, report.reconciled.payout_month, p.payout_average,
            )?;
            writeln!(
                out,
                "  payout per TB: current {:.2}, estimated {:.2}",
                p.payout_tb, p.payout_tb_month,
            )?;
        }

        for sat in &report.satellites {
            writeln!(out, "  Satellite: {}", sat.satellite)?;
            if let Some(u) = &sat.usage {
                writeln!(
                    out,
                    "    disk used: current {}, estimated {}, growth {}, first data since day {:.2}",
                    format_units(u.used_current * TERABYTE),
                    format_units(u.used_month * TERABYTE),
                    format_units(u.used_growth * GIGABYTE),
                    u.first_day,
                )?;
            }
            writeln!(
                out,
                "    payout: current {:.2}, estimated {:.2}, per TB estimated {:.2}",
                sat.payout.payout, sat.payout.payout_month, sat.payout.payout_tb_month,
            )?;
        }
        for (sat, used_month) in &report.carried_over {
            writeln!(
                out,
                "  Satellite: {sat} (not reported, estimated {} kept)",
                format_units(used_month * TERABYTE),
            )?;
        }
    }
    Ok(())
}

pub fn render_json(reports: &[NodeReport]) -> AcctResult<String> {
    Ok(serde_json::to_string_pretty(reports)?)
}

const CSV_COLUMNS: [&str; 11] = [
    "node",
    "key",
    "used_current_tb",
    "used_month_tb",
    "used_growth_gb",
    "used_average_mb",
    "payout",
    "payout_month",
    "payout_tb",
    "payout_tb_month",
    "payout_average",
];

fn csv_field(value: &str, delimiter: char) -> String {
    if value.contains(delimiter) || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// `;`-separated files are read by spreadsheets in decimal-comma locales.
fn csv_number(value: Option<f64>, delimiter: char) -> String {
    let Some(v) = value else {
        return String::new();
    };
    let text = format!("{v:.6}");
    if delimiter == ';' {
        text.replace('.', ",")
    } else {
        text
    }
}

/// One header row, then one row for each node total and each satellite.
/// Absent figures are empty cells.
pub fn render_csv(reports: &[NodeReport], delimiter: char) -> String {
    let sep = delimiter.to_string();
    let mut out = CSV_COLUMNS.join(&sep);
    out.push('\n');

    for report in reports {
        let node = csv_field(&report.node, delimiter);
        let u = report.usage.as_ref();
        let p = report.payout.as_ref();
        let row = [
            node.clone(),
            NODE_TOTAL_KEY.to_string(),
            csv_number(u.map(|u| u.used_current), delimiter),
            csv_number(Some(report.reconciled.used_month), delimiter),
            csv_number(u.map(|u| u.used_growth), delimiter),
            csv_number(u.map(|u| u.used_average), delimiter),
            csv_number(p.map(|p| p.payout), delimiter),
            csv_number(Some(report.reconciled.payout_month), delimiter),
            csv_number(p.map(|p| p.payout_tb), delimiter),
            csv_number(p.map(|p| p.payout_tb_month), delimiter),
            csv_number(p.map(|p| p.payout_average), delimiter),
        ];
        out.push_str(&row.join(&sep));
        out.push('\n');

        for sat in &report.satellites {
            let u = sat.usage.as_ref();
            let row = [
                node.clone(),
                csv_field(&sat.satellite, delimiter),
                csv_number(u.map(|u| u.used_current), delimiter),
                csv_number(u.map(|u| u.used_month), delimiter),
                csv_number(u.map(|u| u.used_growth), delimiter),
                csv_number(u.map(|u| u.used_average), delimiter),
                csv_number(Some(sat.payout.payout), delimiter),
                csv_number(Some(sat.payout.payout_month), delimiter),
                csv_number(Some(sat.payout.payout_tb), delimiter),
                csv_number(Some(sat.payout.payout_tb_month), delimiter),
                csv_number(Some(sat.payout.payout_average), delimiter),
            ];
            out.push_str(&row.join(&sep));
            out.push('\n');
        }
    }
    out
}
