//! Read-only integrity audit of the live collection
//!
//! The validator never mutates and never fails on findings: referential
//! and value problems are data in the report, not errors. Callers decide
//! what to do with them (the reconciliation engine, for one, excludes
//! orphans from merge).

use serde::Serialize;

use crate::model::MarkKey;
use crate::roster::Roster;
use crate::store::MarkCollection;

/// A mark whose student id has no living roster entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanIssue {
    /// The orphaned mark's key
    pub key: MarkKey,
    /// Its score, for the operator deciding what to restore
    pub score: f64,
}

/// A key carried by more than one live mark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateIssue {
    /// The duplicated key
    pub key: MarkKey,
    /// How many marks carry it
    pub count: usize,
}

/// A score outside `[0, maxScore]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeIssue {
    /// The offending mark's key
    pub key: MarkKey,
    /// The out-of-range score
    pub score: f64,
    /// The bound that was violated
    pub max_score: f64,
}

/// A structurally broken record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedIssue {
    /// Position in the collection
    pub index: usize,
    /// What is wrong
    pub problem: String,
}

/// A mark referencing an exam id absent from the exam list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnknownExamIssue {
    /// The referencing mark's key
    pub key: MarkKey,
}

/// The full audit report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub orphans: Vec<OrphanIssue>,
    pub duplicate_keys: Vec<DuplicateIssue>,
    pub range_violations: Vec<RangeIssue>,
    pub malformed: Vec<MalformedIssue>,
    pub unknown_exams: Vec<UnknownExamIssue>,
}

impl IntegrityReport {
    /// Whether the audit found nothing.
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty()
            && self.duplicate_keys.is_empty()
            && self.range_violations.is_empty()
            && self.malformed.is_empty()
            && self.unknown_exams.is_empty()
    }
}

/// Audit the collection against the roster.
pub fn validate(collection: &MarkCollection, roster: &Roster) -> IntegrityReport {
    let mut report = IntegrityReport::default();

    for (index, mark) in collection.iter().enumerate() {
        let key = mark.key();

        if mark.student_id.trim().is_empty() || mark.exam_id.trim().is_empty() {
            report.malformed.push(MalformedIssue {
                index,
                problem: "empty studentId or examId".to_string(),
            });
            continue;
        }
        if !mark.score.is_finite() {
            report.malformed.push(MalformedIssue {
                index,
                problem: format!("non-finite score for {}", key),
            });
            continue;
        }

        if !roster.contains_student(&mark.student_id) {
            report.orphans.push(OrphanIssue {
                key: key.clone(),
                score: mark.score,
            });
        }

        if roster.exam(&mark.exam_id).is_none() {
            report.unknown_exams.push(UnknownExamIssue { key: key.clone() });
        }

        // The record's own capacity bounds it; the exam's capacity is the
        // fallback. A mark with neither can only violate the lower bound.
        let capacity = mark.max_score.or(roster.exam_max_score(&mark.exam_id));
        if mark.score < 0.0 {
            report.range_violations.push(RangeIssue {
                key: key.clone(),
                score: mark.score,
                max_score: capacity.unwrap_or(0.0),
            });
        } else if let Some(max) = capacity {
            if mark.score > max {
                report.range_violations.push(RangeIssue {
                    key: key.clone(),
                    score: mark.score,
                    max_score: max,
                });
            }
        }
    }

    report.duplicate_keys = collection
        .duplicate_keys()
        .into_iter()
        .map(|key| DuplicateIssue {
            count: collection.all_with_key(&key).len(),
            key,
        })
        .collect();

    report
}
