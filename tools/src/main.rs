//! fleet-runner: samples storage-node exporters and estimates month-end usage and payout.
//!
//! Usage:
//!   fleet-runner --data-dir ./data
//!   fleet-runner --data-dir ./data --stream detail --midnight 5
//!   fleet-runner --data-dir ./data --stream export --once

mod output;
mod schedule;
mod source;
mod worker;

use anyhow::Result;
use clap::Parser;
use fleet_accounting_core::config::{FleetConfig, StreamConfig};
use source::HttpSource;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use worker::RunOptions;

#[derive(Parser, Debug)]
#[command(name = "fleet-runner", version, about)]
struct Cli {
    /// Directory holding fleet.json; relative paths in it resolve against this.
    #[arg(long, env = "FLEET_DATA_DIR", default_value = "./data")]
    data_dir: String,

    /// Run only these streams (repeatable). Default: all configured streams.
    #[arg(long = "stream")]
    streams: Vec<String>,

    /// Wait until N minutes before 24:00 UTC, then run a day-finalizing cycle.
    #[arg(long, num_args = 0..=1, default_missing_value = "5", value_name = "MINUTES")]
    midnight: Option<u32>,

    /// Run one cycle per stream and exit.
    #[arg(long)]
    once: bool,

    /// Append -YYYY-MM-DD to every output file name.
    #[arg(long)]
    add_date: bool,

    /// Per-request timeout when fetching exporter snapshots.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut fleet = FleetConfig::load(&cli.data_dir)?;
    if cli.add_date {
        for stream in &mut fleet.streams {
            stream.reports.add_date = true;
        }
    }
    let selected = select_streams(&fleet, &cli.streams)?;
    log::info!(
        "{} node(s), {} stream(s) selected from {}",
        fleet.nodes.len(),
        selected.len(),
        cli.data_dir
    );

    let fleet = Arc::new(fleet);
    let source = Arc::new(HttpSource::new(Duration::from_secs(cli.timeout_secs))?);
    let options = RunOptions {
        midnight: cli.midnight,
        once:     cli.once,
    };
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(16);

    let writer = tokio::spawn(output::write_reports(rx, Arc::clone(&fleet)));
    let workers: Vec<_> = selected
        .into_iter()
        .map(|stream| {
            let name = stream.name.clone();
            let handle = tokio::spawn(worker::run_stream(
                stream,
                Arc::clone(&fleet),
                Arc::clone(&source),
                options,
                cancel.clone(),
                tx.clone(),
            ));
            (name, handle)
        })
        .collect();
    drop(tx);

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let mut failed = Vec::new();
    for (name, handle) in workers {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!("stream {name} failed: {e:#}");
                failed.push(name);
            }
            Err(e) => {
                log::error!("stream {name} aborted: {e}");
                failed.push(name);
            }
        }
    }
    writer.await??;

    if !failed.is_empty() {
        anyhow::bail!("stream(s) failed: {}", failed.join(", "));
    }
    log::info!("all streams finished");
    Ok(())
}

fn select_streams(fleet: &FleetConfig, wanted: &[String]) -> Result<Vec<StreamConfig>> {
    if wanted.is_empty() {
        return Ok(fleet.streams.clone());
    }
    wanted
        .iter()
        .map(|name| {
            fleet
                .stream(name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown stream '{name}'"))
        })
        .collect()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("cannot listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received SIGINT, finishing the current node..."),
        _ = terminate => log::info!("Received SIGTERM, finishing the current node..."),
    }
}
