//! Snapshot archive for the mark collection
//!
//! Snapshots are point-in-time, immutable copies of the full mark
//! collection, captured unconditionally before every mutating persist and
//! on explicit checkpoints. They exist so that observations lost to human
//! or script error, not only to crashes, can always be recovered.
//!
//! # Design principles
//!
//! - Atomic visibility: a snapshot exists completely or not at all
//! - Immutability: captured snapshots are never edited or reordered
//! - Explicit integrity: checksums verified on every load
//! - Bounded history: oldest pruned first, never past a protected
//!   reconciliation checkpoint

mod archive;
mod checksum;
mod errors;
mod manifest;

pub use archive::{Snapshot, SnapshotArchive};
pub use checksum::{compute_checksum, compute_file_checksum, format_checksum};
pub use errors::{Severity, SnapshotError, SnapshotErrorCode, SnapshotResult};
pub use manifest::SnapshotManifest;

/// Snapshot id type: `<UTC timestamp>_<operation tag>`, name-sortable.
pub type SnapshotId = String;
