//! Atomic mark store
//!
//! The store owns the live `marks.json`. Mutation is a strict sequence:
//!
//! 1. Capture a pre-mutation snapshot of the live collection,
//!    unconditionally. Even when the forthcoming write later fails
//!    validation, recovery must be possible from human or script error,
//!    not only from crashes.
//! 2. Write the new collection to `marks.json.staging`, fsync.
//! 3. Re-read the staging file and validate it structurally.
//! 4. Atomically rename staging over the live file, fsync the directory.
//!
//! On any failure the live file is left untouched; no partial write is
//! ever observable to readers.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::model::Mark;
use crate::snapshot::{SnapshotArchive, SnapshotError, SnapshotId};

use super::collection::MarkCollection;
use super::errors::{StoreError, StoreResult};

/// Single-writer turnstile for a store.
///
/// Mutating operations require a [`MutationGuard`], obtained by blocking
/// on the turnstile. Read-only operations take no guard and may run
/// concurrently with each other; they are excluded from observing partial
/// writes by the staging-then-rename discipline, not by the lock.
pub struct WriteTurnstile {
    lock: Mutex<()>,
}

impl WriteTurnstile {
    fn new() -> Self {
        Self {
            lock: Mutex::new(()),
        }
    }

    /// Block until this caller is the sole writer.
    pub fn enter(&self) -> MutationGuard<'_> {
        // A poisoned lock means a previous writer panicked mid-flight;
        // the staging discipline keeps the live file consistent, so the
        // turnstile stays usable.
        let held = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        MutationGuard { _held: held }
    }
}

/// Proof that the holder is the sole writer of a store.
pub struct MutationGuard<'a> {
    _held: MutexGuard<'a, ()>,
}

/// The live mark collection on disk, with its snapshot archive.
pub struct MarkStore {
    data_dir: PathBuf,
    marks_path: PathBuf,
    archive: SnapshotArchive,
    turnstile: WriteTurnstile,
}

impl MarkStore {
    /// Open a store rooted at `data_dir`.
    ///
    /// Creates the data and snapshot directories if missing. Does not
    /// create `marks.json`; see [`Self::initialize`].
    pub fn open(data_dir: &Path, snapshot_retention: usize) -> StoreResult<Self> {
        if !data_dir.exists() {
            fs::create_dir_all(data_dir).map_err(|e| {
                StoreError::io_error(
                    format!("Failed to create data directory: {}", data_dir.display()),
                    e,
                )
            })?;
        }

        let archive = SnapshotArchive::open(data_dir, snapshot_retention)
            .map_err(|e| snapshot_to_store("Failed to open snapshot archive", e))?;

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            marks_path: data_dir.join("marks.json"),
            archive,
            turnstile: WriteTurnstile::new(),
        })
    }

    /// Path of the live collection file.
    pub fn marks_path(&self) -> &Path {
        &self.marks_path
    }

    /// The store's snapshot archive.
    pub fn archive(&self) -> &SnapshotArchive {
        &self.archive
    }

    /// The store's single-writer turnstile.
    pub fn turnstile(&self) -> &WriteTurnstile {
        &self.turnstile
    }

    /// Whether the live collection file exists.
    pub fn exists(&self) -> bool {
        self.marks_path.exists()
    }

    /// Create an empty live collection if none exists.
    pub fn initialize(&self, _guard: &MutationGuard<'_>) -> StoreResult<()> {
        if self.exists() {
            return Ok(());
        }
        write_file_with_fsync(&self.marks_path, b"[]")?;
        fsync_dir(&self.data_dir)
    }

    /// Load the current collection.
    pub fn load(&self) -> StoreResult<MarkCollection> {
        let raw = fs::read_to_string(&self.marks_path).map_err(|e| {
            StoreError::read_failed(
                format!("Failed to read mark collection: {}", self.marks_path.display()),
                e,
            )
        })?;

        let marks: Vec<Mark> = serde_json::from_str(&raw)
            .map_err(|e| StoreError::schema(format!("malformed mark collection: {}", e)))?;

        Ok(MarkCollection::from_marks(marks))
    }

    /// Atomically persist `collection` under operation `tag`.
    ///
    /// Returns the id of the pre-mutation snapshot, or `None` for the very
    /// first persist (a store that has never held marks has nothing to
    /// protect).
    pub fn persist(
        &self,
        collection: &MarkCollection,
        tag: &str,
        guard: &MutationGuard<'_>,
    ) -> StoreResult<Option<SnapshotId>> {
        self.persist_protecting(collection, tag, None, guard)
    }

    /// [`Self::persist`], additionally shielding `protected` (an in-flight
    /// reconciliation checkpoint) from retention pruning.
    pub fn persist_protecting(
        &self,
        collection: &MarkCollection,
        tag: &str,
        protected: Option<&str>,
        _guard: &MutationGuard<'_>,
    ) -> StoreResult<Option<SnapshotId>> {
        // Step 1: unconditional pre-mutation snapshot of the live state
        let pre_snapshot = if self.exists() {
            let live = self.load()?;
            let id = self
                .archive
                .capture(&format!("pre_{}", tag), live.marks())
                .map_err(|e| snapshot_to_store("pre-mutation snapshot failed", e))?;
            Some(id)
        } else {
            None
        };

        // Step 2: write staging, fsync
        let staging_path = self.data_dir.join("marks.json.staging");
        let payload = serde_json::to_vec_pretty(collection.marks()).map_err(|e| {
            StoreError::schema(format!("mark collection failed to serialize: {}", e))
        })?;
        write_file_with_fsync(&staging_path, &payload)?;

        // Step 3: validate the staging bytes, not the in-memory copy
        let validation = validate_staging(&staging_path);
        if let Err(e) = validation {
            let _ = fs::remove_file(&staging_path);
            return Err(e);
        }

        // Step 4: atomic replace
        fs::rename(&staging_path, &self.marks_path).map_err(|e| {
            StoreError::write_failed(
                format!(
                    "Failed to replace live collection: {}",
                    self.marks_path.display()
                ),
                e,
            )
        })?;
        fsync_dir(&self.data_dir)?;

        // Bounded retention, never pruning a protected checkpoint. The
        // snapshot just captured is the newest and survives regardless.
        self.archive
            .prune(protected)
            .map_err(|e| snapshot_to_store("snapshot pruning failed", e))?;

        Ok(pre_snapshot)
    }
}

/// Parse and structurally validate the staged collection.
fn validate_staging(staging_path: &Path) -> StoreResult<()> {
    let raw = fs::read_to_string(staging_path).map_err(|e| {
        StoreError::read_failed(
            format!("Failed to re-read staging file: {}", staging_path.display()),
            e,
        )
    })?;

    let marks: Vec<Mark> = serde_json::from_str(&raw)
        .map_err(|e| StoreError::schema(format!("staged collection malformed: {}", e)))?;

    let staged = MarkCollection::from_marks(marks);
    let violations = staged.structural_violations();
    if !violations.is_empty() {
        return Err(StoreError::schema(format!(
            "staged collection rejected: {}",
            violations.join("; ")
        )));
    }
    Ok(())
}

fn write_file_with_fsync(path: &Path, data: &[u8]) -> StoreResult<()> {
    let mut file = File::create(path).map_err(|e| {
        StoreError::write_failed(format!("Failed to create file: {}", path.display()), e)
    })?;
    file.write_all(data).map_err(|e| {
        StoreError::write_failed(format!("Failed to write file: {}", path.display()), e)
    })?;
    file.sync_all().map_err(|e| {
        StoreError::write_failed(format!("fsync failed for: {}", path.display()), e)
    })
}

fn fsync_dir(path: &Path) -> StoreResult<()> {
    let dir = OpenOptions::new().read(true).open(path).map_err(|e| {
        StoreError::io_error(format!("Failed to open directory: {}", path.display()), e)
    })?;
    dir.sync_all().map_err(|e| {
        StoreError::io_error(format!("fsync directory failed: {}", path.display()), e)
    })
}

fn snapshot_to_store(context: &str, e: SnapshotError) -> StoreError {
    StoreError::io_error(
        context.to_string(),
        io::Error::new(io::ErrorKind::Other, e.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MarkKey;
    use crate::snapshot::SnapshotArchive;
    use tempfile::TempDir;

    fn mark(student: &str, exam: &str, score: f64) -> Mark {
        Mark::new(student, exam, score)
    }

    fn open_store(dir: &TempDir) -> MarkStore {
        MarkStore::open(dir.path(), SnapshotArchive::DEFAULT_RETENTION).unwrap()
    }

    #[test]
    fn test_initialize_then_load_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(!store.exists());

        let guard = store.turnstile().enter();
        store.initialize(&guard).unwrap();
        drop(guard);

        assert!(store.exists());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_missing_is_read_failed() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let err = store.load().unwrap_err();
        assert_eq!(err.code(), super::super::errors::StoreErrorCode::ReadFailed);
    }

    #[test]
    fn test_persist_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut collection = MarkCollection::new();
        collection.upsert(mark("s1", "e1", 10.0));
        collection.upsert(mark("s2", "e1", 12.0));

        let guard = store.turnstile().enter();
        let pre = store.persist(&collection, "manual", &guard).unwrap();
        drop(guard);

        // First persist: nothing existed yet, so no pre-mutation snapshot
        assert!(pre.is_none());
        assert_eq!(store.load().unwrap(), collection);
    }

    #[test]
    fn test_persist_captures_pre_mutation_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut first = MarkCollection::new();
        first.upsert(mark("s1", "e1", 10.0));
        let guard = store.turnstile().enter();
        store.persist(&first, "manual", &guard).unwrap();

        let mut second = first.clone();
        second.upsert(mark("s1", "e1", 14.0));
        let pre = store.persist(&second, "manual", &guard).unwrap().unwrap();
        drop(guard);

        // The snapshot holds the collection as it was before the write
        let snapshot = store.archive().load(&pre).unwrap();
        assert_eq!(snapshot.marks.len(), 1);
        assert_eq!(snapshot.marks[0].score, 10.0);
        assert!(pre.contains("pre_manual"));
    }

    #[test]
    fn test_failed_validation_leaves_live_untouched_but_snapshot_taken() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut good = MarkCollection::new();
        good.upsert(mark("s1", "e1", 10.0));
        let guard = store.turnstile().enter();
        store.persist(&good, "manual", &guard).unwrap();
        let snapshots_before = store.archive().list().unwrap().len();

        let mut bad = good.clone();
        let mut over = mark("s2", "e1", 20.0);
        over.max_score = Some(16.0);
        bad.upsert(over);

        let err = store.persist(&bad, "manual", &guard).unwrap_err();
        drop(guard);
        assert_eq!(err.code(), super::super::errors::StoreErrorCode::Schema);

        // Live collection unchanged, staging removed
        assert_eq!(store.load().unwrap(), good);
        assert!(!dir.path().join("marks.json.staging").exists());

        // The pre-mutation snapshot was still captured before the failure
        assert_eq!(store.archive().list().unwrap().len(), snapshots_before + 1);
    }

    #[test]
    fn test_persist_preserves_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let raw = r#"[{"id": "mark_1", "studentId": "s1", "examId": "e1",
                       "score": 10, "maxScore": 16, "date": "2025-09-04"}]"#;
        let marks: Vec<Mark> = serde_json::from_str(raw).unwrap();
        let collection = MarkCollection::from_marks(marks);

        let guard = store.turnstile().enter();
        store.persist(&collection, "import", &guard).unwrap();
        drop(guard);

        let loaded = store.load().unwrap();
        let m = loaded.get(&MarkKey::new("s1", "e1")).unwrap();
        assert_eq!(m.extra["date"], "2025-09-04");
    }
}
