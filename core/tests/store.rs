//! Accounting store: persistence, forward-readability, corruption handling.

use fleet_accounting_core::{
    store::{AccountingRecord, AccountingStore, Lookup, SharedStore},
    types::TrackingKey,
};
use std::fs;

fn sat(id: &str) -> TrackingKey {
    TrackingKey::Satellite(id.into())
}

#[test]
fn saved_state_loads_back_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state/storage.json");

    let mut store = AccountingStore::load(&path);
    assert!(store.is_empty());

    let mut total = AccountingRecord::start(4.25, 6, 2.0);
    total.used_month = 6.5;
    store.upsert("node-a", &TrackingKey::NodeTotal, &total);
    store.upsert("node-a", &sat("us1.storj.io"), &AccountingRecord::start(4.25, 6, 0.5));
    store.upsert("node-b", &TrackingKey::NodeTotal, &AccountingRecord::start(0.0, 6, 1.0));
    store.save().unwrap();

    let reloaded = AccountingStore::load(&path);
    assert_eq!(reloaded.len(), 3);
    assert_eq!(reloaded.get("node-a", &TrackingKey::NodeTotal, 6), Lookup::Present(total));
    assert_eq!(reloaded.records_for("node-b", 6).len(), 1);

    let records = reloaded.records_for("node-a", 6);
    assert_eq!(records[0].0, TrackingKey::NodeTotal);
    assert_eq!(records[1].0, sat("us1.storj.io"));
}

#[test]
fn document_uses_node_then_key_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");
    let mut store = AccountingStore::load(&path);
    store.upsert("node-a", &sat("eu1.storj.io"), &AccountingRecord::start(1.0, 3, 0.25));
    store.save().unwrap();

    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc["node-a"]["eu1.storj.io"]["first_month"], 3);
    assert_eq!(doc["node-a"]["eu1.storj.io"]["used_first_day"], 0.25);
    assert!(!dir.path().join("storage.json.tmp").exists());
}

#[test]
fn corrupt_document_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");
    fs::write(&path, "{ \"node-a\": { \"node_total\": ").unwrap();

    let store = AccountingStore::load(&path);
    assert!(store.is_empty());
    assert_eq!(store.get("node-a", &TrackingKey::NodeTotal, 6), Lookup::Absent);
}

#[test]
fn missing_fields_default_to_the_init_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");
    fs::write(
        &path,
        r#"{
          "node-a": {
            "node_total": { "first_day": 3.0, "used_first_day": 1.5, "legacy_note": "x" },
            "us1.storj.io": { "used_first_day": 0.5, "used_last_day": 0.7 }
          }
        }"#,
    )
    .unwrap();

    let store = AccountingStore::load(&path);
    match store.get("node-a", &TrackingKey::NodeTotal, 8) {
        Lookup::Present(r) => {
            assert_eq!(r.first_month, 8);
            assert_eq!(r.used_last_day, 0.0);
            assert_eq!(r.used_month, 1.5);
        }
        Lookup::Absent => panic!("node total should resolve"),
    }
    // Without a period start the series cannot be resumed.
    assert_eq!(store.get("node-a", &sat("us1.storj.io"), 8), Lookup::Absent);
}

#[test]
fn in_memory_store_saves_nowhere() {
    let mut store = AccountingStore::in_memory();
    store.upsert("n", &TrackingKey::NodeTotal, &AccountingRecord::start(1.0, 1, 1.0));
    assert!(store.path().is_none());
    store.save().unwrap();
}

#[test]
fn shared_store_serializes_read_modify_write() {
    let shared = SharedStore::new(AccountingStore::in_memory());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let shared = shared.clone();
            std::thread::spawn(move || {
                let mut store = shared.lock().unwrap();
                let key = TrackingKey::Satellite(format!("sat-{i}"));
                store.upsert("node-a", &key, &AccountingRecord::start(0.5, 6, f64::from(i)));
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(shared.lock().unwrap().len(), 8);
}

#[test]
fn save_survives_a_panic_while_locked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");
    let shared = SharedStore::new(AccountingStore::load(&path));

    let worker = shared.clone();
    let joined = std::thread::spawn(move || {
        let mut store = worker.lock().unwrap();
        store.upsert("node-a", &TrackingKey::NodeTotal, &AccountingRecord::start(2.0, 6, 1.5));
        panic!("cycle failed mid-node");
    })
    .join();
    assert!(joined.is_err());
    assert!(shared.lock().is_err(), "lock is poisoned for normal use");

    shared.save().unwrap();
    let reloaded = AccountingStore::load(&path);
    assert!(matches!(
        reloaded.get("node-a", &TrackingKey::NodeTotal, 6),
        Lookup::Present(r) if r.used_first_day == 1.5
    ));
}
