//! Report task: writes each completed cycle's outputs and history rows.

use crate::worker::CycleReport;
use anyhow::Result;
use fleet_accounting_core::{
    config::{FleetConfig, StreamConfig},
    history::CycleLog,
    report,
};
use std::{path::Path, sync::Arc};
use tokio::sync::mpsc;

pub async fn write_reports(mut rx: mpsc::Receiver<CycleReport>, fleet: Arc<FleetConfig>) -> Result<()> {
    let mut history = fleet.history_db.as_deref().and_then(|path| {
        let opened = CycleLog::open(&path.to_string_lossy()).and_then(|db| {
            db.migrate()?;
            Ok(db)
        });
        match opened {
            Ok(db) => Some(db),
            Err(e) => {
                log::warn!("history log {} unavailable: {e}", path.display());
                None
            }
        }
    });

    while let Some(cycle) = rx.recv().await {
        let Some(stream) = fleet.stream(&cycle.stream) else {
            log::warn!("report for unknown stream {}", cycle.stream);
            continue;
        };

        if let Err(e) = write_outputs(stream, &cycle).await {
            log::error!("stream {}: writing reports failed: {e:#}", stream.name);
        }

        if let Some(db) = history.as_mut() {
            for node in &cycle.outcome.reports {
                if let Err(e) = db.append_report(&stream.name, &cycle.ctx, node) {
                    log::warn!("stream {}: history append for {} failed: {e}", stream.name, node.node);
                }
            }
        }

        for (node, error) in &cycle.outcome.failed {
            log::warn!("stream {}: node {node} missing from this cycle ({error})", stream.name);
        }
    }
    Ok(())
}

async fn write_outputs(stream: &StreamConfig, cycle: &CycleReport) -> Result<()> {
    let cfg = &stream.reports;
    let reports = &cycle.outcome.reports;

    if cfg.text.is_none() && cfg.json.is_none() && cfg.csv.is_none() {
        print!("{}", report::render_text(reports, &cycle.ctx));
        return Ok(());
    }
    if let Some(path) = &cfg.text {
        write_file(path, cfg.add_date, cycle, report::render_text(reports, &cycle.ctx)).await?;
    }
    if let Some(path) = &cfg.json {
        write_file(path, cfg.add_date, cycle, report::render_json(reports)?).await?;
    }
    if let Some(path) = &cfg.csv {
        write_file(path, cfg.add_date, cycle, report::render_csv(reports, cfg.delimiter)).await?;
    }
    Ok(())
}

async fn write_file(path: &Path, add_date: bool, cycle: &CycleReport, content: String) -> Result<()> {
    let target = report::output_file_name(path, add_date, &cycle.ctx);
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target, content).await?;
    log::debug!("wrote {}", target.display());
    Ok(())
}
