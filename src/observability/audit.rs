//! Append-only audit log of mutating engine outcomes
//!
//! Every reconcile and dedup outcome is recorded to `audit.log`, one JSON
//! object per line. The log is append-only and synced before the
//! operation is acknowledged; retention and rotation are external
//! concerns.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

/// Audited action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditAction {
    /// A reconciliation pass started
    ReconcileStarted,
    /// A reconciliation pass committed its merge
    ReconcileCommitted,
    /// A reconciliation pass aborted, live store untouched
    ReconcileAborted,
    /// A dedup pass rewrote the live collection
    DedupeApplied,
    /// A dedup pass found an unresolvable conflict and changed nothing
    DedupeConflict,
    /// A mark moved from the live collection to the discard set
    MarkDiscarded,
}

impl AuditAction {
    /// Returns the action name string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ReconcileStarted => "RECONCILE_STARTED",
            AuditAction::ReconcileCommitted => "RECONCILE_COMMITTED",
            AuditAction::ReconcileAborted => "RECONCILE_ABORTED",
            AuditAction::DedupeApplied => "DEDUPE_APPLIED",
            AuditAction::DedupeConflict => "DEDUPE_CONFLICT",
            AuditAction::MarkDiscarded => "MARK_DISCARDED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Unique record id
    pub id: String,
    /// When the action happened (RFC3339)
    pub at: String,
    /// What happened
    pub action: String,
    /// Action-specific detail fields
    pub detail: serde_json::Map<String, serde_json::Value>,
}

impl AuditRecord {
    fn new(action: AuditAction, detail: &[(&str, &str)]) -> Self {
        let mut map = serde_json::Map::new();
        for (key, value) in detail {
            map.insert((*key).to_string(), serde_json::Value::String((*value).to_string()));
        }
        Self {
            id: Uuid::new_v4().to_string(),
            at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            action: action.as_str().to_string(),
            detail: map,
        }
    }
}

/// File-backed, append-only audit log.
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    /// Open (or create) `audit.log` under `data_dir`.
    pub fn open(data_dir: &Path) -> std::io::Result<Self> {
        let path = data_dir.join("audit.log");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and sync it before returning.
    pub fn record(&self, action: AuditAction, detail: &[(&str, &str)]) -> std::io::Result<()> {
        let record = AuditRecord::new(action, detail);
        let line = serde_json::to_string(&record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_records_are_appended_as_jsonl() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();

        log.record(AuditAction::ReconcileStarted, &[("snapshots", "3")])
            .unwrap();
        log.record(
            AuditAction::ReconcileCommitted,
            &[("recovered", "2"), ("rejected", "1")],
        )
        .unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["action"], "RECONCILE_STARTED");
        assert_eq!(first["detail"]["snapshots"], "3");
        assert!(first["id"].as_str().is_some());
    }

    #[test]
    fn test_reopen_appends_not_truncates() {
        let dir = TempDir::new().unwrap();
        {
            let log = AuditLog::open(dir.path()).unwrap();
            log.record(AuditAction::DedupeApplied, &[]).unwrap();
        }
        {
            let log = AuditLog::open(dir.path()).unwrap();
            log.record(AuditAction::MarkDiscarded, &[("key", "s1/e1")])
                .unwrap();
        }

        let contents = fs::read_to_string(dir.path().join("audit.log")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
