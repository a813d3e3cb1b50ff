//! Structured reports returned by engine operations
//!
//! Reports are data for the caller to render; the engine never prints.

use serde::Serialize;

use crate::dedupe::TieBreak;
use crate::model::MarkKey;
use crate::snapshot::SnapshotId;

/// Why a recovery candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// `studentId` has no living roster entry
    OrphanReference,
    /// Score outside `[0, maxScore]`
    SchemaError,
    /// Candidates for this key tied through every dedup rule with
    /// differing scores; nothing was merged for the key
    ConflictUnresolved,
}

/// One rejected recovery candidate.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedCandidate {
    /// The candidate's key
    pub key: MarkKey,
    /// The candidate's score
    pub score: f64,
    /// The snapshot the candidate was found in
    pub source_snapshot: SnapshotId,
    /// Why it was rejected
    pub reason: RejectReason,
    /// Human-readable detail
    pub detail: String,
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    /// Snapshots scanned, newest first
    pub snapshots_scanned: usize,
    /// Marks recovered into the live collection
    pub recovered: usize,
    /// Candidates rejected (each also listed in `rejections`)
    pub rejected: usize,
    /// Rejected candidates with reasons
    pub rejections: Vec<RejectedCandidate>,
    /// The pre-merge checkpoint, when a merge was committed
    pub checkpoint: Option<SnapshotId>,
}

impl ReconcileReport {
    /// Whether the pass changed the live collection.
    pub fn changed_store(&self) -> bool {
        self.recovered > 0
    }
}

/// Outcome of a single-key dedup pass.
#[derive(Debug, Clone, Serialize)]
pub struct DedupeReport {
    /// The deduplicated key
    pub key: MarkKey,
    /// Score of the retained canonical mark
    pub retained_score: f64,
    /// Number of marks moved to the discard set
    pub discarded: usize,
    /// The precedence rule that decided, when marks were discarded
    pub tie_break: Option<TieBreak>,
    /// Whether the live collection was rewritten
    pub applied: bool,
}

/// Outcome of a per-student legacy cleanup pass.
#[derive(Debug, Clone, Serialize)]
pub struct StudentCleanupReport {
    /// The cleaned student id
    pub student_id: String,
    /// Keys of legacy/placement marks moved to the discard set
    pub removed: Vec<MarkKey>,
    /// Number of current-assessment marks kept
    pub kept: usize,
    /// Whether the live collection was rewritten
    pub applied: bool,
}
