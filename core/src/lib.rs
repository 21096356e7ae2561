//! Incremental accounting and month-end extrapolation for a fleet of storage nodes.
//!
//! Per cycle and node: parser → engine (store) → payout → reconcile → reports.

pub mod clock;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod history;
pub mod observation;
pub mod parser;
pub mod payout;
pub mod reconcile;
pub mod report;
pub mod store;
pub mod types;
