//! Accounting store: the persisted state document.
//!
//! RULE: Only store.rs reads or writes the state document.
//! The engine asks for a record, transforms it, and hands it back with upsert().
//!
//! Layout: `{ "<node>": { "node_total": {..}, "<satellite-id>": {..} } }`.
//! Records are kept in their stored (all-optional) form and resolved on
//! lookup, so documents written by older or newer versions stay readable.

use crate::{
    error::{AcctError, AcctResult},
    types::{NodeName, TrackingKey},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// One accounting series, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountingRecord {
    /// Fractional day-of-month the current period began at. 0 after a day-boundary finalize.
    pub first_day:        f64,
    pub first_month:      u32,
    pub used_first_day:   f64,
    /// Baseline handed over by the last day-boundary finalize.
    pub used_last_day:    f64,
    pub used_current_day: f64,
    pub used_month:       f64,
    pub used_growth:      f64,
    pub used_average:     f64,
}

impl AccountingRecord {
    /// A fresh series starting at `first_day` with `used` as its baseline.
    pub fn start(first_day: f64, month: u32, used: f64) -> Self {
        Self {
            first_day,
            first_month: month,
            used_first_day: used,
            used_last_day: 0.0,
            used_current_day: used,
            used_month: used,
            used_growth: 0.0,
            used_average: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    first_day:        Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    first_month:      Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    used_first_day:   Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    used_last_day:    Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    used_current_day: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    used_month:       Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    used_growth:      Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    used_average:     Option<f64>,
}

impl StoredRecord {
    /// A record without its period start or baseline cannot be resumed;
    /// it is reported absent so the engine re-initializes it.
    fn resolve(&self, current_month: u32) -> Option<AccountingRecord> {
        let first_day = self.first_day?;
        let used_first_day = self.used_first_day?;
        Some(AccountingRecord {
            first_day,
            first_month: self.first_month.unwrap_or(current_month),
            used_first_day,
            used_last_day: self.used_last_day.unwrap_or(0.0),
            used_current_day: self.used_current_day.unwrap_or(used_first_day),
            used_month: self.used_month.unwrap_or(used_first_day),
            used_growth: self.used_growth.unwrap_or(0.0),
            used_average: self.used_average.unwrap_or(0.0),
        })
    }
}

impl From<&AccountingRecord> for StoredRecord {
    fn from(r: &AccountingRecord) -> Self {
        Self {
            first_day:        Some(r.first_day),
            first_month:      Some(r.first_month),
            used_first_day:   Some(r.used_first_day),
            used_last_day:    Some(r.used_last_day),
            used_current_day: Some(r.used_current_day),
            used_month:       Some(r.used_month),
            used_growth:      Some(r.used_growth),
            used_average:     Some(r.used_average),
        }
    }
}

/// Result of a single get-or-absent lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Absent,
    Present(AccountingRecord),
}

type Document = BTreeMap<NodeName, BTreeMap<String, StoredRecord>>;

#[derive(Debug, Default)]
pub struct AccountingStore {
    path:     Option<PathBuf>, // None for stores that are never persisted
    document: Document,
}

impl AccountingStore {
    /// Load the state document at `path`.
    /// A missing file starts empty; an unreadable or corrupt one also starts
    /// empty, so every key goes through a fresh Init transition.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let document = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Document>(&content) {
                Ok(doc) => doc,
                Err(e) => {
                    log::warn!(
                        "state document {} is corrupt ({e}); starting with an empty store",
                        path.display()
                    );
                    Document::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no state document at {}; starting fresh", path.display());
                Document::new()
            }
            Err(e) => {
                log::warn!(
                    "cannot read state document {} ({e}); starting with an empty store",
                    path.display()
                );
                Document::new()
            }
        };
        log::debug!("loaded {} node(s) from {}", document.len(), path.display());
        Self { path: Some(path), document }
    }

    /// A store that lives only in memory (used in tests).
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, node: &str, key: &TrackingKey, current_month: u32) -> Lookup {
        self.document
            .get(node)
            .and_then(|records| records.get(key.as_str()))
            .and_then(|stored| stored.resolve(current_month))
            .map_or(Lookup::Absent, Lookup::Present)
    }

    pub fn upsert(&mut self, node: &str, key: &TrackingKey, record: &AccountingRecord) {
        self.document
            .entry(node.to_string())
            .or_default()
            .insert(key.as_str().to_string(), StoredRecord::from(record));
    }

    /// Every resumable record of `node`, node total first.
    pub fn records_for(&self, node: &str, current_month: u32) -> Vec<(TrackingKey, AccountingRecord)> {
        let mut out: Vec<_> = self
            .document
            .get(node)
            .into_iter()
            .flat_map(|records| records.iter())
            .filter_map(|(key, stored)| {
                stored
                    .resolve(current_month)
                    .map(|r| (TrackingKey::from_stored(key), r))
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Number of tracking keys across all nodes.
    pub fn len(&self) -> usize {
        self.document.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist the whole document: write a sibling temp file, then rename it over the target.
    pub fn save(&self) -> AcctResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let save_failed = |reason: String| AcctError::SaveFailed {
            path: path.display().to_string(),
            reason,
        };
        let json = serde_json::to_string_pretty(&self.document)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(|e| save_failed(e.to_string()))?;
        fs::rename(&tmp, path).map_err(|e| save_failed(e.to_string()))?;
        log::debug!("saved {} tracking key(s) to {}", self.len(), path.display());
        Ok(())
    }
}

/// The mutual-exclusion boundary around a store's read-modify-write sequence.
/// Each stream owns one; streams never share a store.
#[derive(Debug, Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<AccountingStore>>,
}

impl SharedStore {
    pub fn new(store: AccountingStore) -> Self {
        Self { inner: Arc::new(Mutex::new(store)) }
    }

    pub fn lock(&self) -> AcctResult<MutexGuard<'_, AccountingStore>> {
        self.inner.lock().map_err(|_| AcctError::StoreLockPoisoned)
    }

    /// Persist the current document. A poisoned lock is recovered here:
    /// a panic mid-cycle must not cost the stream its last baseline.
    pub fn save(&self) -> AcctResult<()> {
        let store = self.inner.lock().unwrap_or_else(|poisoned| {
            log::warn!("store lock poisoned by a panicked cycle; saving the last written state");
            PoisonError::into_inner(poisoned)
        });
        store.save()
    }
}
