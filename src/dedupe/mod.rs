//! Canonical-record selection for duplicate marks
//!
//! Several marks can share one `(studentId, examId)` key: legacy placement
//! scores left behind after a student moved groups, partial restores, or
//! double entry. The policy selects exactly one canonical mark per key.
//!
//! Precedence, highest wins:
//!
//! 1. Current-assessment exam class over legacy/placement class
//! 2. Complete metadata (`percentage` and `createdAt` both present)
//! 3. Most recent `createdAt`
//! 4. Stable first-seen order
//!
//! Selection is deterministic: any permutation of a record set that rules
//! 1–3 can distinguish yields the same canonical record. When rules 1–3
//! all tie and the tied marks disagree on `score`, the policy refuses to
//! pick (`MB_DEDUPE_CONFLICT`); an arbitrary winner would silently
//! destroy an observation. Equal-score ties are the same real event and
//! resolve by first-seen order.
//!
//! Discarded marks are never destroyed here; callers move them to the
//! discard set.

use std::fmt;

use serde::Serialize;

use crate::model::{Mark, MarkKey};
use crate::roster::ExamClass;

/// The rule that decided a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Exam classification decided
    ContextClass,
    /// Metadata completeness decided
    Metadata,
    /// `createdAt` recency decided
    Recency,
    /// All rules tied; first-seen order decided (equal scores only)
    FirstSeen,
}

/// Result of selecting one canonical mark among duplicates.
#[derive(Debug, Clone)]
pub struct Selection {
    /// The retained mark
    pub canonical: Mark,
    /// Displaced marks, in first-seen order
    pub discarded: Vec<Mark>,
    /// The rule that decided
    pub tie_break: TieBreak,
}

/// All precedence rules tied but the candidates disagree on score.
///
/// Code `MB_DEDUPE_CONFLICT`. Should not occur in practice; when it does,
/// the key is reported and left untouched rather than resolved by
/// accident of file order.
#[derive(Debug, Clone)]
pub struct ConflictUnresolved {
    /// The contested key
    pub key: MarkKey,
    /// The tied, disagreeing scores
    pub scores: Vec<f64>,
}

impl fmt::Display for ConflictUnresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[ERROR] MB_DEDUPE_CONFLICT: {}: candidates tie through every rule with differing scores {:?}",
            self.key, self.scores
        )
    }
}

impl std::error::Error for ConflictUnresolved {}

/// The deduplication policy, parameterized by an exam classifier.
pub struct DedupePolicy<'a> {
    classify: &'a dyn Fn(&str) -> ExamClass,
}

impl<'a> DedupePolicy<'a> {
    /// Build a policy over an exam classifier (normally
    /// `|id| roster.exam_class(id)`).
    pub fn new(classify: &'a dyn Fn(&str) -> ExamClass) -> Self {
        Self { classify }
    }

    /// Select the canonical mark among `candidates` sharing one key.
    ///
    /// `candidates` must be non-empty and in first-seen order.
    pub fn select(&self, candidates: &[Mark]) -> Result<Selection, ConflictUnresolved> {
        assert!(!candidates.is_empty(), "select requires at least one candidate");

        let ranks: Vec<Rank> = candidates.iter().map(|m| self.rank(m)).collect();
        let best = ranks.iter().min().copied().unwrap();

        let winners: Vec<usize> = (0..candidates.len())
            .filter(|&i| ranks[i] == best)
            .collect();

        if winners.len() > 1 {
            let scores: Vec<f64> = winners.iter().map(|&i| candidates[i].score).collect();
            let disagree = scores.iter().any(|&s| s != scores[0]);
            if disagree {
                return Err(ConflictUnresolved {
                    key: candidates[0].key(),
                    scores,
                });
            }
        }

        let canonical_index = winners[0];
        let canonical = candidates[canonical_index].clone();
        let discarded = candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != canonical_index)
            .map(|(_, m)| m.clone())
            .collect();

        Ok(Selection {
            canonical,
            discarded,
            tie_break: decisive_rule(&ranks),
        })
    }

    fn rank(&self, mark: &Mark) -> Rank {
        let class_rank = match (self.classify)(&mark.exam_id) {
            ExamClass::Assessment => 0,
            ExamClass::Placement => 1,
        };
        let metadata_rank = if mark.has_complete_metadata() { 0 } else { 1 };
        // Most recent first; unparseable or absent timestamps rank last
        let recency_rank = mark
            .created_at_time()
            .map(|t| -t.and_utc().timestamp_millis())
            .unwrap_or(i64::MAX);
        Rank {
            class_rank,
            metadata_rank,
            recency_rank,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    class_rank: u8,
    metadata_rank: u8,
    recency_rank: i64,
}

/// The first rule that distinguished any two candidates.
fn decisive_rule(ranks: &[Rank]) -> TieBreak {
    if ranks.iter().any(|r| r.class_rank != ranks[0].class_rank) {
        TieBreak::ContextClass
    } else if ranks.iter().any(|r| r.metadata_rank != ranks[0].metadata_rank) {
        TieBreak::Metadata
    } else if ranks.iter().any(|r| r.recency_rank != ranks[0].recency_rank) {
        TieBreak::Recency
    } else {
        TieBreak::FirstSeen
    }
}
