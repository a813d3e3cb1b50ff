//! Identity resolution and integrity audit tests
//!
//! Properties exercised:
//! - Transliteration variants surface as ranked candidates, never
//!   auto-selected
//! - The validator reports orphans as data; reconcile excludes them from
//!   merge

use std::fs;
use std::path::Path;

use markbook::discard::{DiscardSet, DEFAULT_RETENTION};
use markbook::model::{Mark, MarkKey};
use markbook::observability::AuditLog;
use markbook::reconcile::{ReconciliationEngine, RejectReason};
use markbook::resolve::Resolution;
use markbook::roster::Roster;
use markbook::snapshot::SnapshotArchive;
use markbook::store::{MarkCollection, MarkStore};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

struct Fixture {
    _tmp: TempDir,
    store: MarkStore,
    roster: Roster,
    discards: DiscardSet,
    audit: AuditLog,
}

fn write_roster(dir: &Path) {
    fs::write(
        dir.join("students.json"),
        r#"[
            {"id": "s106", "name": "Mohammed Nasser Ali", "group": "g1"},
            {"id": "s139", "name": "Ahmed Naser", "group": "g2"}
        ]"#,
    )
    .unwrap();
    fs::write(
        dir.join("exams.json"),
        r#"[{"id": "C1", "name": "Unit Exam 1", "maxScore": 16}]"#,
    )
    .unwrap();
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    write_roster(dir);
    fs::write(dir.join("marks.json"), "[]").unwrap();

    let store = MarkStore::open(dir, SnapshotArchive::DEFAULT_RETENTION).unwrap();
    let roster = Roster::load(dir).unwrap();
    let discards = DiscardSet::open(dir, DEFAULT_RETENTION);
    let audit = AuditLog::open(dir).unwrap();

    Fixture {
        _tmp: tmp,
        store,
        roster,
        discards,
        audit,
    }
}

// =============================================================================
// Identity resolution
// =============================================================================

/// "Mohamed Naser" returns both "Mohammed Nasser Ali" and "Ahmed Naser"
/// as candidates, ranked, with no silent auto-selection.
#[test]
fn test_transliteration_variants_are_surfaced_ranked() {
    let fx = fixture();
    let engine = ReconciliationEngine::new(&fx.store, &fx.roster, &fx.discards, &fx.audit);

    match engine.resolve_identity("Mohamed Naser") {
        Resolution::Ambiguous(candidates) => {
            let ids: Vec<&str> = candidates.iter().map(|c| c.student.id.as_str()).collect();
            assert!(ids.contains(&"s106"));
            assert!(ids.contains(&"s139"));
            // Ranked descending by whole-string similarity
            for pair in candidates.windows(2) {
                assert!(pair[0].similarity >= pair[1].similarity);
            }
        }
        other => panic!("expected Ambiguous, got {:?}", other),
    }
}

/// An unknown name is NotFound, not an error and not a forced pick.
#[test]
fn test_unknown_name_is_not_found() {
    let fx = fixture();
    let engine = ReconciliationEngine::new(&fx.store, &fx.roster, &fx.discards, &fx.audit);
    assert!(matches!(
        engine.resolve_identity("Zainab Khalil"),
        Resolution::NotFound
    ));
}

/// Resolution reads the roster only; the store is never touched.
#[test]
fn test_resolution_is_read_only() {
    let fx = fixture();
    let before = fs::read(fx.store.marks_path()).unwrap();
    let engine = ReconciliationEngine::new(&fx.store, &fx.roster, &fx.discards, &fx.audit);

    let _ = engine.resolve_identity("Mohamed Naser");

    assert_eq!(fs::read(fx.store.marks_path()).unwrap(), before);
    assert!(fx.store.archive().list().unwrap().is_empty());
}

// =============================================================================
// Integrity audit
// =============================================================================

/// A mark whose student "Z" has no roster entry is reported by validate()
/// as an orphan and excluded from merge during reconcile().
#[test]
fn test_orphan_reported_by_validate_and_excluded_from_merge() {
    let fx = fixture();

    // Seed the live store with the orphan
    let guard = fx.store.turnstile().enter();
    fx.store
        .persist(
            &MarkCollection::from_marks(vec![Mark::new("Z", "C1", 9.0)]),
            "seed",
            &guard,
        )
        .unwrap();
    drop(guard);

    let engine = ReconciliationEngine::new(&fx.store, &fx.roster, &fx.discards, &fx.audit);

    // validate(): reported as data, nothing thrown
    let report = engine.validate().unwrap();
    assert_eq!(report.orphans.len(), 1);
    assert_eq!(report.orphans[0].key, MarkKey::new("Z", "C1"));

    // reconcile(): an archived mark for "Z" is excluded with a reason.
    // The live orphan above keeps its key out of the diff, so archive a
    // different orphaned key.
    fx.store
        .archive()
        .capture("incident", &[Mark::new("Z", "C1_other", 7.0)])
        .unwrap();
    // Unknown exam id C1_other: unknown exams never demote or bound, so
    // rejection is purely the missing student.
    let reconcile_report = engine.reconcile().unwrap();
    assert_eq!(reconcile_report.recovered, 0);
    assert_eq!(
        reconcile_report.rejections[0].reason,
        RejectReason::OrphanReference
    );
}

/// The validator reports duplicates, range violations and unknown exams
/// in one pass, read-only.
#[test]
fn test_full_audit_report_shape() {
    let fx = fixture();

    let mut over = Mark::new("s106", "C1", 18.0);
    over.max_score = Some(16.0);
    let marks = vec![
        Mark::new("s106", "C1", 10.0),
        Mark::new("s106", "C1", 12.0),
        over,
        Mark::new("s139", "mystery_exam", 5.0),
    ];
    // Seed through raw bytes: this shape (duplicates) is exactly what raw
    // input can contain and persist would accept structurally.
    fs::write(
        fx.store.marks_path(),
        serde_json::to_string_pretty(&marks).unwrap(),
    )
    .unwrap();

    let engine = ReconciliationEngine::new(&fx.store, &fx.roster, &fx.discards, &fx.audit);
    let before = fs::read(fx.store.marks_path()).unwrap();
    let report = engine.validate().unwrap();

    assert_eq!(report.duplicate_keys.len(), 1);
    assert_eq!(report.duplicate_keys[0].count, 3);
    assert_eq!(report.range_violations.len(), 1);
    assert_eq!(report.unknown_exams.len(), 1);
    assert!(report.orphans.is_empty());

    // Strictly read-only
    assert_eq!(fs::read(fx.store.marks_path()).unwrap(), before);
}
