//! Engine-level error taxonomy
//!
//! The engine composes the store, archive, roster, policy and discard
//! set; its error type is the sum of theirs. Identity outcomes
//! (`NotFound`, `Ambiguous`) are NOT errors: they are returned as data
//! by [`crate::resolve::classify`] and never auto-resolved.

use thiserror::Error;

use crate::dedupe::ConflictUnresolved;
use crate::discard::DiscardError;
use crate::roster::RosterError;
use crate::snapshot::SnapshotError;
use crate::store::StoreError;

/// Failures that abort an engine operation, live store untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Store read/write/schema failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Snapshot capture, load or prune failure
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Roster could not be loaded
    #[error(transparent)]
    Roster(#[from] RosterError),

    /// Discard set could not be updated
    #[error(transparent)]
    Discard(#[from] DiscardError),

    /// Dedup policy exhausted every tie-break rule
    #[error(transparent)]
    Conflict(#[from] ConflictUnresolved),

    /// Audit log write failure
    #[error("audit log failure: {0}")]
    Audit(#[from] std::io::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
