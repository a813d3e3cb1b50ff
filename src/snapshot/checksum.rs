//! CRC32 checksums for snapshot integrity
//!
//! Checksums are stored in the manifest as `crc32:XXXXXXXX` (lowercase
//! hex, zero-padded) and verified on every snapshot load.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crc32fast::Hasher;

use super::errors::{SnapshotError, SnapshotResult};

/// Compute the CRC32 checksum of a byte slice.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Compute the CRC32 checksum of a file, reading in chunks.
pub fn compute_file_checksum(path: &Path) -> SnapshotResult<u32> {
    let mut file = File::open(path).map_err(|e| SnapshotError::io_error_at_path(path, e))?;

    let mut hasher = Hasher::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| SnapshotError::io_error_at_path(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

/// Format a checksum for the manifest.
pub fn format_checksum(checksum: u32) -> String {
    format!("crc32:{:08x}", checksum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_checksum_deterministic() {
        let data = b"[{\"studentId\": \"s1\"}]";
        assert_eq!(compute_checksum(data), compute_checksum(data));
    }

    #[test]
    fn test_checksum_detects_change() {
        assert_ne!(compute_checksum(b"abc"), compute_checksum(b"abd"));
    }

    #[test]
    fn test_file_checksum_matches_slice_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("marks.json");
        let data = b"[1, 2, 3]";

        let mut file = File::create(&path).unwrap();
        file.write_all(data).unwrap();
        file.sync_all().unwrap();

        assert_eq!(compute_file_checksum(&path).unwrap(), compute_checksum(data));
    }

    #[test]
    fn test_format() {
        assert_eq!(format_checksum(0xdeadbeef), "crc32:deadbeef");
        assert_eq!(format_checksum(0x1), "crc32:00000001");
    }
}
