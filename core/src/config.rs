use crate::{
    clock::TrackingMode,
    error::{AcctError, AcctResult},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

pub const FLEET_FILE: &str = "fleet.json";

/// Longest accepted stream cadence: one 31-day month.
pub const MAX_INTERVAL_MINUTES: u64 = 1440 * 31;

// ── Payout rates ─────────────────────────────────────────────────────

/// Fixed payout rates, currency units per terabyte.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PayoutRates {
    /// Per terabyte-month stored. Also the floor of `payout_tb_month`.
    #[serde(default = "default_storage_rate")]
    pub storage_per_tb:  f64,
    #[serde(default = "default_customer_egress_rate")]
    pub customer_egress: f64,
    #[serde(default = "default_repair_egress_rate")]
    pub repair_egress:   f64,
}

fn default_storage_rate() -> f64 { 1.50 }
fn default_customer_egress_rate() -> f64 { 20.00 }
fn default_repair_egress_rate() -> f64 { 10.00 }

impl Default for PayoutRates {
    fn default() -> Self {
        Self {
            storage_per_tb:  default_storage_rate(),
            customer_egress: default_customer_egress_rate(),
            repair_egress:   default_repair_egress_rate(),
        }
    }
}

/// What `payout_tb_month` reports when a satellite (or node) stores nothing.
/// `payout_tb` is 0 under both policies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZeroStoragePolicy {
    /// Floor at the storage rate, same as every other result.
    #[default]
    ApplyFloor,
    /// Report 0; per-TB figures are meaningless without stored data.
    ReportZero,
}

// ── Fleet and streams ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub name:     String,
    /// Exporter endpoint serving the node's metrics document.
    pub url:      String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportConfig {
    #[serde(default)]
    pub text:      Option<PathBuf>,
    #[serde(default)]
    pub json:      Option<PathBuf>,
    #[serde(default)]
    pub csv:       Option<PathBuf>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Append `-YYYY-MM-DD` to output file names.
    #[serde(default)]
    pub add_date:  bool,
}

fn default_delimiter() -> char { ',' }

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            text: None,
            json: None,
            csv: None,
            delimiter: default_delimiter(),
            add_date: false,
        }
    }
}

/// One tracking stream: its own state document, cadence and outputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    pub name:             String,
    #[serde(default)]
    pub mode:             TrackingMode,
    pub state_file:       PathBuf,
    /// Repeat cadence. Streams without one run a single cycle.
    #[serde(default)]
    pub interval_minutes: Option<u64>,
    #[serde(default)]
    pub reports:          ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct FleetFile {
    nodes:               Vec<NodeConfig>,
    #[serde(default)]
    rates:               PayoutRates,
    #[serde(default)]
    zero_storage_policy: ZeroStoragePolicy,
    streams:             Vec<StreamConfig>,
    #[serde(default)]
    history_db:          Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub nodes:               Vec<NodeConfig>,
    pub rates:               PayoutRates,
    pub zero_storage_policy: ZeroStoragePolicy,
    pub streams:             Vec<StreamConfig>,
    pub history_db:          Option<PathBuf>,
}

impl FleetConfig {
    /// Load `fleet.json` from the data directory.
    /// Relative state, report and history paths are resolved against `data_dir`.
    /// In tests, use FleetConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/{FLEET_FILE}");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let mut config = Self::from_json(&content)
            .map_err(|e| anyhow::anyhow!("Invalid {path}: {e}"))?;
        config.resolve_paths(Path::new(data_dir));
        Ok(config)
    }

    pub fn from_json(content: &str) -> AcctResult<Self> {
        let file: FleetFile = serde_json::from_str(content)?;
        let config = Self {
            nodes:               file.nodes,
            rates:               file.rates,
            zero_storage_policy: file.zero_storage_policy,
            streams:             file.streams,
            history_db:          file.history_db,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AcctResult<()> {
        let invalid = |reason: String| Err(AcctError::Config { reason });

        if self.nodes.is_empty() {
            return invalid("no nodes configured".into());
        }
        let mut names = HashSet::new();
        for node in &self.nodes {
            if node.name.trim().is_empty() {
                return invalid("node with an empty name".into());
            }
            if !names.insert(node.name.as_str()) {
                return invalid(format!("duplicate node '{}'", node.name));
            }
        }

        let mut streams = HashSet::new();
        for stream in &self.streams {
            if !streams.insert(stream.name.as_str()) {
                return invalid(format!("duplicate stream '{}'", stream.name));
            }
            if stream.mode == TrackingMode::Continuous
                && !matches!(stream.interval_minutes, Some(m) if m > 0)
            {
                return invalid(format!(
                    "continuous stream '{}' needs interval_minutes > 0",
                    stream.name
                ));
            }
            if stream.interval_minutes.is_some_and(|m| m > MAX_INTERVAL_MINUTES) {
                return invalid(format!(
                    "stream '{}': interval_minutes exceeds {MAX_INTERVAL_MINUTES}",
                    stream.name
                ));
            }
        }
        let state_files: HashSet<_> = self.streams.iter().map(|s| &s.state_file).collect();
        if state_files.len() != self.streams.len() {
            return invalid("two streams share one state_file".into());
        }

        let r = &self.rates;
        if [r.storage_per_tb, r.customer_egress, r.repair_egress]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return invalid("payout rates must be finite and non-negative".into());
        }
        Ok(())
    }

    pub fn stream(&self, name: &str) -> Option<&StreamConfig> {
        self.streams.iter().find(|s| s.name == name)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for stream in &mut self.streams {
            resolve(&mut stream.state_file);
            let reports = &mut stream.reports;
            for out in [&mut reports.text, &mut reports.json, &mut reports.csv]
                .into_iter()
                .flatten()
            {
                resolve(out);
            }
        }
        if let Some(db) = &mut self.history_db {
            resolve(db);
        }
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            nodes: vec![
                NodeConfig {
                    name:     "node-a".into(),
                    url:      "http://127.0.0.1:9651/metrics".into(),
                    location: Some("rack-1".into()),
                },
                NodeConfig {
                    name:     "node-b".into(),
                    url:      "http://127.0.0.1:9652/metrics".into(),
                    location: None,
                },
            ],
            rates: PayoutRates::default(),
            zero_storage_policy: ZeroStoragePolicy::ApplyFloor,
            streams: vec![
                StreamConfig {
                    name:             "detail".into(),
                    mode:             TrackingMode::Detail,
                    state_file:       "storage.json".into(),
                    interval_minutes: None,
                    reports:          ReportConfig::default(),
                },
                StreamConfig {
                    name:             "export".into(),
                    mode:             TrackingMode::Continuous,
                    state_file:       "storage-export.json".into(),
                    interval_minutes: Some(60),
                    reports:          ReportConfig::default(),
                },
            ],
            history_db: None,
        }
    }
}
