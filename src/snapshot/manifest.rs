//! Snapshot manifest structure and serialization
//!
//! The manifest.json is the authoritative snapshot descriptor:
//!
//! ```json
//! {
//!   "snapshot_id": "20250905T181042Z_pre_reconcile",
//!   "tag": "pre_reconcile",
//!   "created_at": "2025-09-05T18:10:42Z",
//!   "marks_checksum": "crc32:deadbeef",
//!   "record_count": 143,
//!   "format_version": 1
//! }
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{SnapshotError, SnapshotResult};

/// The authoritative snapshot descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotManifest {
    /// Full snapshot id (timestamp prefix + operation tag)
    pub snapshot_id: String,

    /// Operation tag that caused this snapshot
    pub tag: String,

    /// Creation timestamp in RFC3339 format
    pub created_at: String,

    /// CRC32 checksum of marks.json (format: "crc32:XXXXXXXX")
    pub marks_checksum: String,

    /// Number of marks captured
    pub record_count: usize,

    /// Manifest format version
    pub format_version: u8,
}

impl SnapshotManifest {
    /// Creates a new manifest.
    pub fn new(
        snapshot_id: impl Into<String>,
        tag: impl Into<String>,
        created_at: impl Into<String>,
        marks_checksum: impl Into<String>,
        record_count: usize,
    ) -> Self {
        Self {
            snapshot_id: snapshot_id.into(),
            tag: tag.into(),
            created_at: created_at.into(),
            marks_checksum: marks_checksum.into(),
            record_count,
            format_version: 1,
        }
    }

    /// Serializes the manifest to pretty-printed JSON.
    pub fn to_json(&self) -> SnapshotResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            SnapshotError::manifest_error(format!("Failed to serialize manifest: {}", e))
        })
    }

    /// Deserializes a manifest from JSON.
    pub fn from_json(json: &str) -> SnapshotResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SnapshotError::manifest_error(format!("Failed to parse manifest: {}", e)))
    }

    /// Writes the manifest to a file with fsync.
    pub fn write_to_file(&self, path: &Path) -> SnapshotResult<()> {
        let json = self.to_json()?;

        let mut file = File::create(path).map_err(|e| {
            SnapshotError::manifest_io_error(
                format!("Failed to create manifest file: {}", path.display()),
                e,
            )
        })?;

        file.write_all(json.as_bytes()).map_err(|e| {
            SnapshotError::manifest_io_error(
                format!("Failed to write manifest: {}", path.display()),
                e,
            )
        })?;

        file.sync_all().map_err(|e| {
            SnapshotError::manifest_io_error(
                format!("fsync failed for manifest: {}", path.display()),
                e,
            )
        })
    }

    /// Reads a manifest from a file.
    pub fn read_from_file(path: &Path) -> SnapshotResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            SnapshotError::manifest_io_error(
                format!("Failed to read manifest: {}", path.display()),
                e,
            )
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> SnapshotManifest {
        SnapshotManifest::new(
            "20250905T181042Z_pre_reconcile",
            "pre_reconcile",
            "2025-09-05T18:10:42Z",
            "crc32:deadbeef",
            143,
        )
    }

    #[test]
    fn test_json_roundtrip() {
        let manifest = sample();
        let json = manifest.to_json().unwrap();
        let parsed = SnapshotManifest::from_json(&json).unwrap();
        assert_eq!(manifest, parsed);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");

        let manifest = sample();
        manifest.write_to_file(&path).unwrap();

        let read = SnapshotManifest::read_from_file(&path).unwrap();
        assert_eq!(manifest, read);
        assert_eq!(read.format_version, 1);
    }

    #[test]
    fn test_malformed_manifest_is_manifest_error() {
        let err = SnapshotManifest::from_json("{oops").unwrap_err();
        assert_eq!(
            err.code(),
            super::super::errors::SnapshotErrorCode::SnapshotManifest
        );
    }
}
