//! Snapshot capture, listing, loading, diffing and pruning
//!
//! Each snapshot is an immutable directory under `<data_dir>/snapshots/`:
//!
//! ```text
//! snapshots/
//!   20250905T181042Z_pre_reconcile/
//!     marks.json
//!     manifest.json
//! ```
//!
//! The directory name is `<UTC timestamp>_<operation tag>`, so a plain
//! name sort is chronological order and prefix queries work on the name
//! alone. Capture follows this exact sequence:
//!
//! 1. Create the snapshot directory
//! 2. Write marks.json, fsync
//! 3. Compute checksum, write manifest.json, fsync
//! 4. fsync the snapshot directory
//!
//! Any failure cleans up the partial directory; a snapshot either exists
//! completely or not at all.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::model::{Mark, MarkKey};

use super::checksum::{compute_checksum, compute_file_checksum, format_checksum};
use super::errors::{SnapshotError, SnapshotResult};
use super::manifest::SnapshotManifest;
use super::SnapshotId;

/// A loaded snapshot: descriptor plus the captured marks.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Snapshot id (directory name)
    pub id: SnapshotId,
    /// Parsed manifest
    pub manifest: SnapshotManifest,
    /// Captured marks, in captured order
    pub marks: Vec<Mark>,
}

/// Ordered, bounded archive of immutable snapshots.
pub struct SnapshotArchive {
    snapshots_dir: PathBuf,
    retention: usize,
}

impl SnapshotArchive {
    /// Default bounded retention.
    pub const DEFAULT_RETENTION: usize = 50;

    /// Open (and create if missing) the archive under `<data_dir>/snapshots`.
    pub fn open(data_dir: &Path, retention: usize) -> SnapshotResult<Self> {
        let snapshots_dir = data_dir.join("snapshots");
        if !snapshots_dir.exists() {
            fs::create_dir_all(&snapshots_dir).map_err(|e| {
                SnapshotError::io_error(
                    format!(
                        "Failed to create snapshots directory: {}",
                        snapshots_dir.display()
                    ),
                    e,
                )
            })?;
        }
        Ok(Self {
            snapshots_dir,
            retention: retention.max(1),
        })
    }

    /// The archive directory.
    pub fn snapshots_dir(&self) -> &Path {
        &self.snapshots_dir
    }

    /// The retention bound.
    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Capture a snapshot of `marks` under `tag`.
    ///
    /// Returns the snapshot id. The caller is responsible for pruning; a
    /// capture never deletes history by itself.
    pub fn capture(&self, tag: &str, marks: &[Mark]) -> SnapshotResult<SnapshotId> {
        let snapshot_id = self.allocate_id(tag);
        let snapshot_dir = self.snapshots_dir.join(&snapshot_id);

        fs::create_dir_all(&snapshot_dir).map_err(|e| {
            SnapshotError::io_error(
                format!(
                    "Failed to create snapshot directory: {}",
                    snapshot_dir.display()
                ),
                e,
            )
        })?;

        // From here on, any error must clean up the snapshot directory
        let result = self.write_contents(&snapshot_dir, &snapshot_id, tag, marks);
        if result.is_err() {
            cleanup_snapshot(&snapshot_dir);
        }
        result?;

        Ok(snapshot_id)
    }

    fn write_contents(
        &self,
        snapshot_dir: &Path,
        snapshot_id: &str,
        tag: &str,
        marks: &[Mark],
    ) -> SnapshotResult<()> {
        let payload = serde_json::to_vec_pretty(marks)
            .map_err(|e| SnapshotError::failed(format!("Failed to serialize marks: {}", e)))?;

        let marks_path = snapshot_dir.join("marks.json");
        write_file_with_fsync(&marks_path, &payload)?;

        let manifest = SnapshotManifest::new(
            snapshot_id,
            tag,
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            format_checksum(compute_checksum(&payload)),
            marks.len(),
        );
        manifest.write_to_file(&snapshot_dir.join("manifest.json"))?;

        fsync_dir(snapshot_dir)
    }

    /// List snapshot ids, oldest to newest.
    ///
    /// Only directories carrying a manifest.json count; a half-written
    /// directory left by a crash is invisible to readers.
    pub fn list(&self) -> SnapshotResult<Vec<SnapshotId>> {
        let entries = fs::read_dir(&self.snapshots_dir).map_err(|e| {
            SnapshotError::io_error(
                format!(
                    "Failed to read snapshots directory: {}",
                    self.snapshots_dir.display()
                ),
                e,
            )
        })?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| SnapshotError::io_error("Failed to read snapshot entry", e))?;
            let path = entry.path();
            if path.is_dir() && path.join("manifest.json").exists() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    ids.push(name.to_string());
                }
            }
        }

        // Name sort is chronological order
        ids.sort();
        Ok(ids)
    }

    /// Load a snapshot, verifying its checksum against the manifest.
    pub fn load(&self, id: &str) -> SnapshotResult<Snapshot> {
        let snapshot_dir = self.snapshots_dir.join(id);
        let manifest = SnapshotManifest::read_from_file(&snapshot_dir.join("manifest.json"))?;

        let marks_path = snapshot_dir.join("marks.json");
        let actual = format_checksum(compute_file_checksum(&marks_path)?);
        if actual != manifest.marks_checksum {
            return Err(SnapshotError::corruption(format!(
                "checksum mismatch for snapshot {}: manifest {}, actual {}",
                id, manifest.marks_checksum, actual
            )));
        }

        let raw = fs::read_to_string(&marks_path)
            .map_err(|e| SnapshotError::io_error_at_path(&marks_path, e))?;
        let marks: Vec<Mark> = serde_json::from_str(&raw).map_err(|e| {
            SnapshotError::failed(format!("Failed to parse snapshot {}: {}", id, e))
        })?;

        Ok(Snapshot {
            id: id.to_string(),
            manifest,
            marks,
        })
    }

    /// Marks present in `snapshot` whose key is absent from `live_keys`.
    ///
    /// Absence is tested by composite key only. Opaque ids, scores and
    /// optional metadata never make a snapshot record "different": a
    /// record whose synthetic id changed across regenerations still counts
    /// as present.
    pub fn diff<'a>(live_keys: &HashSet<MarkKey>, snapshot: &'a Snapshot) -> Vec<&'a Mark> {
        snapshot
            .marks
            .iter()
            .filter(|m| !live_keys.contains(&m.key()))
            .collect()
    }

    /// Prune oldest-first down to the retention bound.
    ///
    /// Pruning walks from the oldest snapshot and stops as soon as it
    /// reaches `protected` (an in-flight reconciliation checkpoint), so
    /// nothing at or newer than the protected id is ever removed, even if
    /// the archive stays over its bound. Returns the removed ids.
    pub fn prune(&self, protected: Option<&str>) -> SnapshotResult<Vec<SnapshotId>> {
        let ids = self.list()?;
        let mut count = ids.len();
        let mut removed = Vec::new();

        for id in ids {
            if count <= self.retention {
                break;
            }
            if protected == Some(id.as_str()) {
                break;
            }
            let dir = self.snapshots_dir.join(&id);
            fs::remove_dir_all(&dir).map_err(|e| {
                SnapshotError::io_error(format!("Failed to prune snapshot {}", id), e)
            })?;
            count -= 1;
            removed.push(id);
        }

        Ok(removed)
    }

    /// Allocate a unique snapshot id for `tag`.
    fn allocate_id(&self, tag: &str) -> SnapshotId {
        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let base = format!("{}_{}", stamp, sanitize_tag(tag));

        if !self.snapshots_dir.join(&base).exists() {
            return base;
        }
        // Same tag within the same second: add an ordinal
        let mut n = 2;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !self.snapshots_dir.join(&candidate).exists() {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Restrict tags to filesystem-safe characters.
fn sanitize_tag(tag: &str) -> String {
    let cleaned: String = tag
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "snapshot".to_string()
    } else {
        cleaned
    }
}

fn write_file_with_fsync(path: &Path, data: &[u8]) -> SnapshotResult<()> {
    let mut file =
        File::create(path).map_err(|e| SnapshotError::io_error_at_path(path, e))?;
    file.write_all(data)
        .map_err(|e| SnapshotError::io_error_at_path(path, e))?;
    file.sync_all()
        .map_err(|e| SnapshotError::io_error(format!("fsync failed for: {}", path.display()), e))
}

/// fsync a directory to make its entries durable.
fn fsync_dir(path: &Path) -> SnapshotResult<()> {
    let dir = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| SnapshotError::io_error_at_path(path, e))?;
    dir.sync_all().map_err(|e| {
        SnapshotError::io_error(format!("fsync directory failed: {}", path.display()), e)
    })
}

/// Remove a snapshot directory (cleanup on failure).
fn cleanup_snapshot(path: &Path) {
    if path.exists() {
        let _ = fs::remove_dir_all(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mark(student: &str, exam: &str, score: f64) -> Mark {
        Mark::new(student, exam, score)
    }

    fn open_archive(dir: &TempDir) -> SnapshotArchive {
        SnapshotArchive::open(dir.path(), SnapshotArchive::DEFAULT_RETENTION).unwrap()
    }

    #[test]
    fn test_capture_creates_complete_directory() {
        let dir = TempDir::new().unwrap();
        let archive = open_archive(&dir);

        let id = archive.capture("manual", &[mark("s1", "e1", 10.0)]).unwrap();

        let snapshot_dir = dir.path().join("snapshots").join(&id);
        assert!(snapshot_dir.join("marks.json").exists());
        assert!(snapshot_dir.join("manifest.json").exists());
        assert!(id.ends_with("_manual"));
    }

    #[test]
    fn test_load_roundtrip_and_checksum() {
        let dir = TempDir::new().unwrap();
        let archive = open_archive(&dir);

        let marks = vec![mark("s1", "e1", 10.0), mark("s2", "e1", 12.5)];
        let id = archive.capture("manual", &marks).unwrap();

        let snapshot = archive.load(&id).unwrap();
        assert_eq!(snapshot.marks, marks);
        assert_eq!(snapshot.manifest.record_count, 2);
        assert_eq!(snapshot.manifest.tag, "manual");
    }

    #[test]
    fn test_load_detects_tampering() {
        let dir = TempDir::new().unwrap();
        let archive = open_archive(&dir);

        let id = archive.capture("manual", &[mark("s1", "e1", 10.0)]).unwrap();

        // Snapshots are immutable; editing one must be detected on load
        let marks_path = dir.path().join("snapshots").join(&id).join("marks.json");
        fs::write(&marks_path, "[]").unwrap();

        let err = archive.load(&id).unwrap_err();
        assert_eq!(
            err.code(),
            super::super::errors::SnapshotErrorCode::SnapshotCorruption
        );
    }

    #[test]
    fn test_list_is_sorted_and_same_second_ids_are_unique() {
        let dir = TempDir::new().unwrap();
        let archive = open_archive(&dir);

        let a = archive.capture("first", &[]).unwrap();
        let b = archive.capture("first", &[]).unwrap();
        let c = archive.capture("second", &[]).unwrap();
        assert_ne!(a, b);

        let listed = archive.list().unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.contains(&c));
        let mut resorted = listed.clone();
        resorted.sort();
        assert_eq!(listed, resorted);
    }

    #[test]
    fn test_diff_matches_by_key_only() {
        let dir = TempDir::new().unwrap();
        let archive = open_archive(&dir);

        let mut archived = mark("s1", "e1", 10.0);
        archived.id = Some("mark_1".to_string());
        let id = archive
            .capture("manual", &[archived, mark("s2", "e1", 8.0)])
            .unwrap();
        let snapshot = archive.load(&id).unwrap();

        // Live has the same key with a different opaque id and score:
        // still "present", not a diff candidate.
        let live: HashSet<MarkKey> = [MarkKey::new("s1", "e1")].into_iter().collect();

        let missing = SnapshotArchive::diff(&live, &snapshot);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].key(), MarkKey::new("s2", "e1"));
    }

    #[test]
    fn test_prune_oldest_first() {
        let dir = TempDir::new().unwrap();
        let archive = SnapshotArchive::open(dir.path(), 2).unwrap();

        let a = archive.capture("one", &[]).unwrap();
        let _b = archive.capture("two", &[]).unwrap();
        let _c = archive.capture("three", &[]).unwrap();

        let removed = archive.prune(None).unwrap();
        assert_eq!(removed, vec![a]);
        assert_eq!(archive.list().unwrap().len(), 2);
    }

    #[test]
    fn test_prune_never_passes_protected_checkpoint() {
        let dir = TempDir::new().unwrap();
        let archive = SnapshotArchive::open(dir.path(), 1).unwrap();

        let a = archive.capture("one", &[]).unwrap();
        let b = archive.capture("checkpoint", &[]).unwrap();
        let _c = archive.capture("three", &[]).unwrap();

        // a is prunable; b is the protected checkpoint, so pruning stops
        // there even though the archive stays over its bound.
        let removed = archive.prune(Some(&b)).unwrap();
        assert_eq!(removed, vec![a]);

        let left = archive.list().unwrap();
        assert_eq!(left.len(), 2);
        assert!(left.contains(&b));
    }

    #[test]
    fn test_partial_capture_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let archive = open_archive(&dir);

        // Unserializable marks cannot happen through the public type, so
        // simulate failure by making the snapshots dir read-only is
        // platform-dependent; instead verify that list() ignores a
        // manifest-less directory (the post-crash shape).
        let half = dir.path().join("snapshots").join("20200101T000000Z_crash");
        fs::create_dir_all(&half).unwrap();
        fs::write(half.join("marks.json"), "[]").unwrap();

        assert!(archive.list().unwrap().is_empty());
    }

    #[test]
    fn test_tag_sanitization() {
        assert_eq!(sanitize_tag("Pre Reconcile!"), "pre_reconcile_");
        assert_eq!(sanitize_tag(""), "snapshot");
    }
}
