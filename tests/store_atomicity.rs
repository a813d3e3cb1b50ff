//! Store atomicity and round-trip tests
//!
//! Properties exercised:
//! - Round-trip: persist(load(store)) equals the input modulo field order
//! - No partial writes: a failed persist leaves the live file untouched
//! - Pre-mutation snapshots are captured unconditionally
//! - Unknown record fields survive load/persist cycles

use std::fs;

use markbook::model::MarkKey;
use markbook::snapshot::SnapshotArchive;
use markbook::store::{MarkCollection, MarkStore, StoreErrorCode};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

const SEED: &str = r#"[
    {"id": "mark_1", "studentId": "s106", "examId": "jp_groups123_g1",
     "score": 14, "maxScore": 16, "percentage": "87.5",
     "createdAt": "2025-09-05T18:00:00.000000", "date": "2025-09-05"},
    {"studentId": "s139", "examId": "jp_groups123_g2", "score": 9}
]"#;

fn seeded_store(dir: &TempDir) -> MarkStore {
    fs::write(dir.path().join("marks.json"), SEED).unwrap();
    MarkStore::open(dir.path(), SnapshotArchive::DEFAULT_RETENTION).unwrap()
}

// =============================================================================
// Round-trip
// =============================================================================

/// persist(load(store)) yields a record set equal to the input.
#[test]
fn test_load_persist_roundtrip_is_lossless() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);

    let loaded = store.load().unwrap();
    let guard = store.turnstile().enter();
    store.persist(&loaded, "rewrite", &guard).unwrap();
    drop(guard);

    let reloaded = store.load().unwrap();
    assert_eq!(loaded, reloaded);

    // The legacy "date" field and the string percentage survive verbatim
    let first = reloaded.get(&MarkKey::new("s106", "jp_groups123_g1")).unwrap();
    assert_eq!(first.extra["date"], "2025-09-05");
    assert_eq!(first.percentage, Some(serde_json::json!("87.5")));
}

// =============================================================================
// Atomicity
// =============================================================================

/// A persist that fails structural validation leaves the live bytes
/// exactly as they were and removes its staging file.
#[test]
fn test_failed_persist_is_invisible_to_readers() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let live_before = fs::read(store.marks_path()).unwrap();

    let mut bad = store.load().unwrap();
    let mut over = markbook::model::Mark::new("s106", "jp_groups123_g1", 99.0);
    over.max_score = Some(16.0);
    bad.upsert(over);

    let guard = store.turnstile().enter();
    let err = store.persist(&bad, "bad_write", &guard).unwrap_err();
    drop(guard);

    assert_eq!(err.code(), StoreErrorCode::Schema);
    assert_eq!(fs::read(store.marks_path()).unwrap(), live_before);
    assert!(!dir.path().join("marks.json.staging").exists());
}

/// The pre-mutation snapshot is captured before validation runs, so even
/// a rejected write leaves a recovery point.
#[test]
fn test_pre_mutation_snapshot_is_unconditional() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    assert!(store.archive().list().unwrap().is_empty());

    let mut bad = store.load().unwrap();
    bad.upsert(markbook::model::Mark::new("", "e1", 1.0));

    let guard = store.turnstile().enter();
    store.persist(&bad, "bad_write", &guard).unwrap_err();
    drop(guard);

    let snapshots = store.archive().list().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].contains("pre_bad_write"));

    // And the snapshot holds the pre-mutation state
    let snapshot = store.archive().load(&snapshots[0]).unwrap();
    assert_eq!(snapshot.marks.len(), 2);
}

/// Successive persists keep exactly one live file plus bounded snapshots.
#[test]
fn test_snapshot_retention_bounds_history() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("marks.json"), "[]").unwrap();
    let store = MarkStore::open(dir.path(), 3).unwrap();

    let guard = store.turnstile().enter();
    for i in 0..6 {
        let mut collection = MarkCollection::new();
        collection.upsert(markbook::model::Mark::new("s1", "e1", i as f64));
        store.persist(&collection, "loop", &guard).unwrap();
    }
    drop(guard);

    assert!(store.archive().list().unwrap().len() <= 3);
    assert_eq!(store.load().unwrap().get(&MarkKey::new("s1", "e1")).unwrap().score, 5.0);
}

/// Loading a malformed live file is a schema error, not a panic.
#[test]
fn test_malformed_live_file_is_schema_error() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("marks.json"), "{not json").unwrap();
    let store = MarkStore::open(dir.path(), SnapshotArchive::DEFAULT_RETENTION).unwrap();

    let err = store.load().unwrap_err();
    assert_eq!(err.code(), StoreErrorCode::Schema);
}
