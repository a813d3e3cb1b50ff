//! Auditable discard set for displaced marks
//!
//! Marks removed from the live collection by a dedup pass are never
//! silently destroyed: they move here, to `discards.json`, each entry
//! stamped with when, by which operation, and why. Retention is bounded;
//! when the set overflows, the oldest entries are exported to a tar
//! archive under `exports/` before being pruned, so the full history
//! stays recoverable without the file growing forever.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Mark;

/// Default bounded retention for the live discard file.
pub const DEFAULT_RETENTION: usize = 500;

/// One discarded mark with its audit context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscardedMark {
    /// The displaced mark, verbatim
    pub mark: Mark,
    /// When the discard happened (RFC3339)
    pub discarded_at: String,
    /// The operation that displaced it (e.g. `dedupe`, `reconcile`)
    pub operation: String,
    /// Human-readable cause (e.g. the decisive precedence rule)
    pub reason: String,
}

impl DiscardedMark {
    /// Stamp a mark as discarded now.
    pub fn new(mark: Mark, operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            mark,
            discarded_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Discard set failures.
#[derive(Debug, Error)]
pub enum DiscardError {
    /// File could not be read or written
    #[error("discard set I/O failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// discards.json is not a valid entry array
    #[error("malformed discard set {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Export archive could not be written
    #[error("discard export failed at {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The on-disk discard set.
pub struct DiscardSet {
    path: PathBuf,
    exports_dir: PathBuf,
    retention: usize,
}

impl DiscardSet {
    /// Open the discard set under `data_dir`.
    pub fn open(data_dir: &Path, retention: usize) -> Self {
        Self {
            path: data_dir.join("discards.json"),
            exports_dir: data_dir.join("exports"),
            retention: retention.max(1),
        }
    }

    /// Current entries, oldest first. A missing file is an empty set.
    pub fn list(&self) -> Result<Vec<DiscardedMark>, DiscardError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DiscardError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|e| DiscardError::Malformed {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Append entries, enforcing bounded retention.
    ///
    /// Overflowing oldest entries are exported to a tar archive before
    /// being pruned from the live file.
    pub fn append(&self, entries: Vec<DiscardedMark>) -> Result<(), DiscardError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut all = self.list()?;
        all.extend(entries);

        if all.len() > self.retention {
            let overflow = all.len() - self.retention;
            let pruned: Vec<DiscardedMark> = all.drain(..overflow).collect();
            self.export_entries(&pruned)?;
        }

        self.write_atomic(&all)
    }

    /// Export the full current set to a tar archive under `exports/`.
    ///
    /// Returns the archive path. The live file is left as is.
    pub fn export_all(&self) -> Result<PathBuf, DiscardError> {
        let entries = self.list()?;
        self.export_entries(&entries)
    }

    fn export_entries(&self, entries: &[DiscardedMark]) -> Result<PathBuf, DiscardError> {
        fs::create_dir_all(&self.exports_dir).map_err(|e| DiscardError::Export {
            path: self.exports_dir.clone(),
            source: e,
        })?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let archive_path = unique_export_path(&self.exports_dir, &stamp);

        let payload = serde_json::to_vec_pretty(entries).map_err(|e| DiscardError::Malformed {
            path: archive_path.clone(),
            source: e,
        })?;

        let file = File::create(&archive_path).map_err(|e| DiscardError::Export {
            path: archive_path.clone(),
            source: e,
        })?;
        let mut builder = tar::Builder::new(file);

        let mut header = tar::Header::new_gnu();
        header.set_size(payload.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "discards.json", payload.as_slice())
            .map_err(|e| DiscardError::Export {
                path: archive_path.clone(),
                source: e,
            })?;

        let file = builder.into_inner().map_err(|e| DiscardError::Export {
            path: archive_path.clone(),
            source: e,
        })?;
        file.sync_all().map_err(|e| DiscardError::Export {
            path: archive_path.clone(),
            source: e,
        })?;

        Ok(archive_path)
    }

    fn write_atomic(&self, entries: &[DiscardedMark]) -> Result<(), DiscardError> {
        let staging = self.path.with_extension("json.staging");
        let payload = serde_json::to_vec_pretty(entries).map_err(|e| DiscardError::Malformed {
            path: self.path.clone(),
            source: e,
        })?;

        let io_err = |path: &Path, e: std::io::Error| DiscardError::Io {
            path: path.to_path_buf(),
            source: e,
        };

        let mut file = File::create(&staging).map_err(|e| io_err(&staging, e))?;
        file.write_all(&payload).map_err(|e| io_err(&staging, e))?;
        file.sync_all().map_err(|e| io_err(&staging, e))?;

        fs::rename(&staging, &self.path).map_err(|e| io_err(&self.path, e))?;

        if let Some(parent) = self.path.parent() {
            let dir = OpenOptions::new()
                .read(true)
                .open(parent)
                .map_err(|e| io_err(parent, e))?;
            dir.sync_all().map_err(|e| io_err(parent, e))?;
        }
        Ok(())
    }
}

fn unique_export_path(exports_dir: &Path, stamp: &str) -> PathBuf {
    let base = exports_dir.join(format!("discards_{}.tar", stamp));
    if !base.exists() {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = exports_dir.join(format!("discards_{}-{}.tar", stamp, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(student: &str, score: f64) -> DiscardedMark {
        DiscardedMark::new(
            Mark::new(student, "e1", score),
            "dedupe",
            "displaced by placement-class dedup",
        )
    }

    #[test]
    fn test_missing_file_is_empty_set() {
        let dir = TempDir::new().unwrap();
        let set = DiscardSet::open(dir.path(), DEFAULT_RETENTION);
        assert!(set.list().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_list_roundtrip() {
        let dir = TempDir::new().unwrap();
        let set = DiscardSet::open(dir.path(), DEFAULT_RETENTION);

        set.append(vec![entry("s1", 5.0)]).unwrap();
        set.append(vec![entry("s2", 7.0)]).unwrap();

        let entries = set.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].mark.student_id, "s1");
        assert_eq!(entries[1].operation, "dedupe");
    }

    #[test]
    fn test_overflow_exports_then_prunes_oldest() {
        let dir = TempDir::new().unwrap();
        let set = DiscardSet::open(dir.path(), 2);

        set.append(vec![entry("s1", 1.0), entry("s2", 2.0)]).unwrap();
        set.append(vec![entry("s3", 3.0)]).unwrap();

        let entries = set.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].mark.student_id, "s2");
        assert_eq!(entries[1].mark.student_id, "s3");

        // The pruned entry landed in an export archive, not the void
        let exports: Vec<_> = fs::read_dir(dir.path().join("exports"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(exports.len(), 1);
        assert!(exports[0].extension().unwrap() == "tar");
    }

    #[test]
    fn test_export_all_keeps_live_file() {
        let dir = TempDir::new().unwrap();
        let set = DiscardSet::open(dir.path(), DEFAULT_RETENTION);
        set.append(vec![entry("s1", 1.0)]).unwrap();

        let archive = set.export_all().unwrap();
        assert!(archive.exists());
        assert_eq!(set.list().unwrap().len(), 1);
    }
}
