//! The reconciliation engine
//!
//! Generalizes what used to be one hand-written recovery script per
//! incident into a single reusable pass:
//!
//! 1. Diff every archived snapshot (newest first) against the live
//!    collection to collect candidate-missing marks.
//! 2. Collapse candidates observed in multiple snapshots: identical
//!    `(key, score)` is the same real event.
//! 3. Reject orphans and out-of-range scores, with reasons; a bad
//!    candidate never sinks the pass.
//! 4. Capture a pre-merge checkpoint snapshot.
//! 5. Merge accepted candidates through the dedup policy.
//! 6. Persist atomically. Any failure in 4–6 leaves the live collection
//!    in its pre-merge state.
//!
//! A pass that accepts nothing commits nothing: no checkpoint, no
//! persist, so repeated runs converge instead of piling up snapshots.

use std::collections::HashMap;

use uuid::Uuid;

use crate::dedupe::DedupePolicy;
use crate::discard::{DiscardSet, DiscardedMark};
use crate::model::{Mark, MarkKey};
use crate::observability::{AuditAction, AuditLog};
use crate::resolve::{self, Resolution};
use crate::roster::Roster;
use crate::snapshot::{SnapshotArchive, SnapshotId};
use crate::store::{MarkCollection, MarkStore};
use crate::validate::{self, IntegrityReport};

use super::errors::{EngineError, EngineResult};
use super::report::{
    DedupeReport, ReconcileReport, RejectReason, RejectedCandidate, StudentCleanupReport,
};

/// A recovery candidate with its provenance (not persisted).
struct Candidate {
    mark: Mark,
    source_snapshot: SnapshotId,
}

/// Orchestrates recovery, dedup, validation and identity resolution over
/// one store.
///
/// All operations are synchronous. Mutating operations serialize through
/// the store's write turnstile; read-only operations (`validate`,
/// `resolve_identity`) take no lock.
pub struct ReconciliationEngine<'a> {
    store: &'a MarkStore,
    roster: &'a Roster,
    discards: &'a DiscardSet,
    audit: &'a AuditLog,
}

impl<'a> ReconciliationEngine<'a> {
    /// Wire an engine over its collaborators.
    pub fn new(
        store: &'a MarkStore,
        roster: &'a Roster,
        discards: &'a DiscardSet,
        audit: &'a AuditLog,
    ) -> Self {
        Self {
            store,
            roster,
            discards,
            audit,
        }
    }

    /// Recover marks lost between snapshots. All-or-nothing.
    pub fn reconcile(&self) -> EngineResult<ReconcileReport> {
        let live = self.store.load()?;
        let live_keys = live.key_set();

        let snapshot_ids = self.store.archive().list()?;
        self.audit.record(
            AuditAction::ReconcileStarted,
            &[("snapshots", &snapshot_ids.len().to_string())],
        )?;

        // Steps 1-2: collect candidates newest-first, collapsing repeat
        // observations of the same (key, score).
        let mut candidates: Vec<Candidate> = Vec::new();
        for id in snapshot_ids.iter().rev() {
            let snapshot = self.store.archive().load(id)?;
            for mark in SnapshotArchive::diff(&live_keys, &snapshot) {
                let repeat = candidates.iter().any(|c| c.mark.same_observation(mark));
                if !repeat {
                    candidates.push(Candidate {
                        mark: mark.clone(),
                        source_snapshot: id.clone(),
                    });
                }
            }
        }

        // Step 3: validate candidates individually.
        let mut rejections: Vec<RejectedCandidate> = Vec::new();
        let mut accepted: Vec<Candidate> = Vec::new();
        for candidate in candidates {
            match self.screen(&candidate) {
                Some(rejection) => rejections.push(rejection),
                None => accepted.push(candidate),
            }
        }

        // Distinct scores can survive for one key when snapshots disagree;
        // the dedup policy picks which observation comes back.
        let accepted = self.select_per_key(accepted, &mut rejections)?;

        if accepted.is_empty() {
            let report = ReconcileReport {
                snapshots_scanned: snapshot_ids.len(),
                recovered: 0,
                rejected: rejections.len(),
                rejections,
                checkpoint: None,
            };
            self.audit.record(
                AuditAction::ReconcileCommitted,
                &[("recovered", "0"), ("rejected", &report.rejected.to_string())],
            )?;
            return Ok(report);
        }

        // Steps 4-6: checkpoint, merge, persist. Abort leaves the live
        // collection in its pre-merge state.
        let result = self.commit(&live, &accepted);
        match result {
            Ok(checkpoint) => {
                let report = ReconcileReport {
                    snapshots_scanned: snapshot_ids.len(),
                    recovered: accepted.len(),
                    rejected: rejections.len(),
                    rejections,
                    checkpoint: Some(checkpoint),
                };
                self.audit.record(
                    AuditAction::ReconcileCommitted,
                    &[
                        ("recovered", &report.recovered.to_string()),
                        ("rejected", &report.rejected.to_string()),
                    ],
                )?;
                Ok(report)
            }
            Err(e) => {
                self.audit
                    .record(AuditAction::ReconcileAborted, &[("error", &e.to_string())])?;
                Err(e)
            }
        }
    }

    /// Checkpoint then merge then persist.
    fn commit(&self, live: &MarkCollection, accepted: &[Candidate]) -> EngineResult<SnapshotId> {
        let checkpoint = self
            .store
            .archive()
            .capture("pre_reconcile", live.marks())?;

        let mut merged = live.clone();
        for candidate in accepted {
            merged.push(self.enrich(candidate.mark.clone()));
        }

        let guard = self.store.turnstile().enter();
        self.store
            .persist_protecting(&merged, "reconcile", Some(&checkpoint), &guard)?;
        Ok(checkpoint)
    }

    /// Reject a candidate that must not be merged, with its reason.
    fn screen(&self, candidate: &Candidate) -> Option<RejectedCandidate> {
        let mark = &candidate.mark;
        if !self.roster.contains_student(&mark.student_id) {
            return Some(RejectedCandidate {
                key: mark.key(),
                score: mark.score,
                source_snapshot: candidate.source_snapshot.clone(),
                reason: RejectReason::OrphanReference,
                detail: format!("no roster entry for student {}", mark.student_id),
            });
        }

        let capacity = mark
            .max_score
            .or(self.roster.exam_max_score(&mark.exam_id));
        if mark.score < 0.0 || !mark.score.is_finite() {
            return Some(RejectedCandidate {
                key: mark.key(),
                score: mark.score,
                source_snapshot: candidate.source_snapshot.clone(),
                reason: RejectReason::SchemaError,
                detail: format!("score {} below 0", mark.score),
            });
        }
        if let Some(max) = capacity {
            if mark.score > max {
                return Some(RejectedCandidate {
                    key: mark.key(),
                    score: mark.score,
                    source_snapshot: candidate.source_snapshot.clone(),
                    reason: RejectReason::SchemaError,
                    detail: format!("score {} exceeds maxScore {}", mark.score, max),
                });
            }
        }
        None
    }

    /// Keep one candidate per key, deciding disagreements with the dedup
    /// policy. An unresolvable disagreement rejects the whole key.
    fn select_per_key(
        &self,
        accepted: Vec<Candidate>,
        rejections: &mut Vec<RejectedCandidate>,
    ) -> EngineResult<Vec<Candidate>> {
        let mut order: Vec<MarkKey> = Vec::new();
        let mut groups: HashMap<MarkKey, Vec<Candidate>> = HashMap::new();
        for candidate in accepted {
            let key = candidate.mark.key();
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(candidate);
        }

        let classify = |exam_id: &str| self.roster.exam_class(exam_id);
        let policy = DedupePolicy::new(&classify);

        let mut selected = Vec::new();
        for key in order {
            let Some(mut group) = groups.remove(&key) else {
                continue;
            };
            if group.len() == 1 {
                selected.append(&mut group);
                continue;
            }

            let marks: Vec<Mark> = group.iter().map(|c| c.mark.clone()).collect();
            match policy.select(&marks) {
                Ok(selection) => {
                    let winner_index = group
                        .iter()
                        .position(|c| c.mark == selection.canonical)
                        .unwrap_or(0);
                    selected.push(group.swap_remove(winner_index));
                }
                Err(conflict) => {
                    let source = group[0].source_snapshot.clone();
                    rejections.push(RejectedCandidate {
                        key: key.clone(),
                        score: group[0].mark.score,
                        source_snapshot: source,
                        reason: RejectReason::ConflictUnresolved,
                        detail: conflict.to_string(),
                    });
                }
            }
        }
        Ok(selected)
    }

    /// Complete a recovered mark's metadata before it rejoins the live
    /// collection: a fresh opaque id when none survived, and the derived
    /// percentage when the capacity is known.
    fn enrich(&self, mut mark: Mark) -> Mark {
        if mark.id.is_none() {
            mark.id = Some(format!("mark_{}", Uuid::new_v4()));
        }
        if mark.percentage.is_none() {
            let capacity = mark
                .max_score
                .or(self.roster.exam_max_score(&mark.exam_id));
            if let Some(max) = capacity {
                if max > 0.0 {
                    let pct = (mark.score / max * 1000.0).round() / 10.0;
                    mark.percentage = Some(serde_json::json!(pct));
                }
            }
        }
        mark
    }

    /// Audited dedup pass for one key in the live collection.
    ///
    /// Selects the canonical mark among live duplicates, persists the
    /// rewritten collection, and moves the displaced marks to the discard
    /// set. A key carried by at most one mark is a no-op.
    pub fn dedupe(&self, key: &MarkKey) -> EngineResult<DedupeReport> {
        let live = self.store.load()?;
        let group: Vec<Mark> = live.all_with_key(key).into_iter().cloned().collect();

        if group.len() <= 1 {
            let retained_score = group.first().map(|m| m.score).unwrap_or(0.0);
            return Ok(DedupeReport {
                key: key.clone(),
                retained_score,
                discarded: 0,
                tie_break: None,
                applied: false,
            });
        }

        let classify = |exam_id: &str| self.roster.exam_class(exam_id);
        let policy = DedupePolicy::new(&classify);
        let selection = match policy.select(&group) {
            Ok(selection) => selection,
            Err(conflict) => {
                self.audit.record(
                    AuditAction::DedupeConflict,
                    &[("key", &key.to_string()), ("detail", &conflict.to_string())],
                )?;
                return Err(EngineError::Conflict(conflict));
            }
        };

        // Rewrite: canonical replaces the first occurrence, the rest drop
        let mut rewritten = MarkCollection::new();
        let mut placed = false;
        for mark in live.iter() {
            if &mark.key() == key {
                if !placed {
                    rewritten.push(selection.canonical.clone());
                    placed = true;
                }
                continue;
            }
            rewritten.push(mark.clone());
        }

        let guard = self.store.turnstile().enter();
        self.store.persist(&rewritten, "dedupe", &guard)?;
        drop(guard);

        let reason = format!(
            "displaced by dedup ({:?} rule); canonical score {}",
            selection.tie_break, selection.canonical.score
        );
        for mark in &selection.discarded {
            self.audit.record(
                AuditAction::MarkDiscarded,
                &[("key", &key.to_string()), ("score", &mark.score.to_string())],
            )?;
        }
        let entries: Vec<DiscardedMark> = selection
            .discarded
            .iter()
            .map(|m| DiscardedMark::new(m.clone(), "dedupe", reason.clone()))
            .collect();
        let discarded = entries.len();
        self.discards.append(entries)?;

        self.audit.record(
            AuditAction::DedupeApplied,
            &[
                ("key", &key.to_string()),
                ("discarded", &discarded.to_string()),
            ],
        )?;

        Ok(DedupeReport {
            key: key.clone(),
            retained_score: selection.canonical.score,
            discarded,
            tie_break: Some(selection.tie_break),
            applied: true,
        })
    }

    /// Audited legacy cleanup for one student.
    ///
    /// A student evaluated on both a placement test and a current
    /// assessment keeps only the current marks; the placement marks move
    /// to the discard set. A student with at most one mark, or with
    /// marks in a single class, is left alone.
    pub fn dedupe_student(&self, student_id: &str) -> EngineResult<StudentCleanupReport> {
        let live = self.store.load()?;
        let owned: Vec<&Mark> = live
            .iter()
            .filter(|m| m.student_id == student_id)
            .collect();

        let (placement, current): (Vec<&Mark>, Vec<&Mark>) = owned.iter().copied().partition(|m| {
            self.roster.exam_class(&m.exam_id) == crate::roster::ExamClass::Placement
        });

        if owned.len() <= 1 || placement.is_empty() || current.is_empty() {
            return Ok(StudentCleanupReport {
                student_id: student_id.to_string(),
                removed: Vec::new(),
                kept: owned.len(),
                applied: false,
            });
        }

        let removed_keys: Vec<MarkKey> = placement.iter().map(|m| m.key()).collect();
        let removed_marks: Vec<Mark> = placement.iter().map(|m| (*m).clone()).collect();
        let kept = current.len();

        let mut rewritten = MarkCollection::new();
        for mark in live.iter() {
            let is_removed = mark.student_id == student_id
                && self.roster.exam_class(&mark.exam_id) == crate::roster::ExamClass::Placement;
            if !is_removed {
                rewritten.push(mark.clone());
            }
        }

        let guard = self.store.turnstile().enter();
        self.store.persist(&rewritten, "dedupe", &guard)?;
        drop(guard);

        for mark in &removed_marks {
            self.audit.record(
                AuditAction::MarkDiscarded,
                &[
                    ("key", &mark.key().to_string()),
                    ("score", &mark.score.to_string()),
                ],
            )?;
        }
        let entries: Vec<DiscardedMark> = removed_marks
            .into_iter()
            .map(|m| {
                DiscardedMark::new(
                    m,
                    "dedupe",
                    "placement-class mark displaced by current assessment",
                )
            })
            .collect();
        self.discards.append(entries)?;

        self.audit.record(
            AuditAction::DedupeApplied,
            &[
                ("student", student_id),
                ("discarded", &removed_keys.len().to_string()),
            ],
        )?;

        Ok(StudentCleanupReport {
            student_id: student_id.to_string(),
            removed: removed_keys,
            kept,
            applied: true,
        })
    }

    /// Read-only integrity audit of the live collection.
    pub fn validate(&self) -> EngineResult<IntegrityReport> {
        let live = self.store.load()?;
        Ok(validate::validate(&live, self.roster))
    }

    /// Resolve a free-text name against the roster. Pure; never selects.
    pub fn resolve_identity(&self, query: &str) -> Resolution {
        resolve::classify(resolve::resolve(query, self.roster.students()))
    }
}
