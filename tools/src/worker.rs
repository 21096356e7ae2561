//! Stream worker: one tokio task per tracking stream.
//!
//! Each worker owns its stream's store. Completed cycles are handed to the
//! report task over a channel; nothing else is shared between streams.

use crate::{schedule, source::HttpSource};
use anyhow::Result;
use chrono::{Duration, Utc};
use fleet_accounting_core::{
    clock::CycleContext,
    config::{FleetConfig, StreamConfig},
    cycle::{self, CycleOutcome},
    store::{AccountingStore, SharedStore},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A completed cycle on its way to the report writers.
#[derive(Debug)]
pub struct CycleReport {
    pub stream:  String,
    pub ctx:     CycleContext,
    pub outcome: CycleOutcome,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Wait until this many minutes before UTC midnight, then run a finalizing cycle.
    pub midnight: Option<u32>,
    /// Run a single cycle even for repeating streams.
    pub once:     bool,
}

/// Saves the store when dropped unless `finish()` ran,
/// so an early return or a panic still persists the current baseline.
struct PersistGuard {
    stream: String,
    store:  SharedStore,
    armed:  bool,
}

impl PersistGuard {
    fn new(stream: &str, store: &SharedStore) -> Self {
        Self {
            stream: stream.to_string(),
            store:  store.clone(),
            armed:  true,
        }
    }

    fn finish(mut self) -> Result<()> {
        self.armed = false;
        self.store.save()?;
        log::info!("stream {}: state saved", self.stream);
        Ok(())
    }
}

impl Drop for PersistGuard {
    fn drop(&mut self) {
        if self.armed {
            match self.store.save() {
                Ok(()) => log::warn!("stream {}: state saved on abnormal exit", self.stream),
                Err(e) => log::error!("stream {}: state lost on abnormal exit: {e}", self.stream),
            }
        }
    }
}

pub async fn run_stream(
    stream: StreamConfig,
    fleet: Arc<FleetConfig>,
    source: Arc<HttpSource>,
    options: RunOptions,
    cancel: CancellationToken,
    tx: mpsc::Sender<CycleReport>,
) -> Result<()> {
    let store = SharedStore::new(AccountingStore::load(&stream.state_file));
    let guard = PersistGuard::new(&stream.name, &store);

    let result = stream_loop(&stream, &fleet, &source, options, &cancel, &store, &tx).await;
    if let Err(e) = &result {
        log::error!("stream {}: {e:#}", stream.name);
    }
    // Persisting at shutdown is the one failure that must surface.
    guard.finish()?;
    result
}

async fn stream_loop(
    stream: &StreamConfig,
    fleet: &FleetConfig,
    source: &HttpSource,
    options: RunOptions,
    cancel: &CancellationToken,
    store: &SharedStore,
    tx: &mpsc::Sender<CycleReport>,
) -> Result<()> {
    let interval = stream
        .interval_minutes
        .filter(|_| !options.once)
        .and_then(|m| i64::try_from(m).ok())
        .and_then(Duration::try_minutes);

    let mut day_end_cycle = false;
    if let Some(minutes) = options.midnight {
        let target = schedule::minutes_before_midnight(Utc::now(), minutes);
        log::info!("stream {}: waiting until {target}", stream.name);
        tokio::select! {
            _ = tokio::time::sleep(schedule::wait_until(Utc::now(), target)) => {}
            _ = cancel.cancelled() => return Ok(()),
        }
        day_end_cycle = true;
    }

    loop {
        let snapshots = source.fetch_all(&fleet.nodes).await;
        let now = Utc::now();
        let finalize = day_end_cycle
            || interval.is_some_and(|i| schedule::is_day_end_cycle(now, i));
        let ctx = CycleContext::at(now, stream.mode, finalize);

        let outcome = {
            let mut locked = store.lock()?;
            let outcome = cycle::run_cycle(&mut locked, &ctx, fleet, snapshots, || {
                cancel.is_cancelled()
            });
            if let Err(e) = locked.save() {
                log::error!("stream {}: saving state after cycle failed: {e}", stream.name);
            }
            outcome
        };
        if finalize {
            log::info!("stream {}: day finalized at D={:.4}", stream.name, ctx.day_of_month);
        }

        let report = CycleReport {
            stream: stream.name.clone(),
            ctx,
            outcome,
        };
        if tx.send(report).await.is_err() {
            log::warn!("stream {}: report task gone; stopping", stream.name);
            break;
        }

        let Some(interval) = interval else { break };
        if cancel.is_cancelled() {
            break;
        }
        day_end_cycle = false;
        let pause = interval.to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = cancel.cancelled() => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_accounting_core::types::TrackingKey;
    use fleet_accounting_core::store::{AccountingRecord, Lookup};

    fn record() -> AccountingRecord {
        AccountingRecord::start(3.0, 6, 1.25)
    }

    #[test]
    fn guard_saves_when_dropped_armed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let store = SharedStore::new(AccountingStore::load(&path));
        {
            let _guard = PersistGuard::new("detail", &store);
            store.lock().unwrap().upsert("node-a", &TrackingKey::NodeTotal, &record());
        }
        let reloaded = AccountingStore::load(&path);
        assert_eq!(reloaded.get("node-a", &TrackingKey::NodeTotal, 6), Lookup::Present(record()));
    }

    #[test]
    fn guard_saves_after_a_panic_poisoned_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let store = SharedStore::new(AccountingStore::load(&path));

        let task_store = store.clone();
        let joined = std::thread::spawn(move || {
            let _guard = PersistGuard::new("export", &task_store);
            let mut locked = task_store.lock().unwrap();
            locked.upsert("node-a", &TrackingKey::NodeTotal, &record());
            panic!("cycle aborted");
        })
        .join();
        assert!(joined.is_err());

        let reloaded = AccountingStore::load(&path);
        assert_eq!(reloaded.get("node-a", &TrackingKey::NodeTotal, 6), Lookup::Present(record()));
    }

    #[test]
    fn finish_disarms_the_guard() {
        let store = SharedStore::new(AccountingStore::in_memory());
        PersistGuard::new("detail", &store).finish().unwrap();
    }
}
