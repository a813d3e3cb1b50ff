//! Core record types for the mark collection
//!
//! A mark is one scored observation linking a student to an exam. The
//! on-disk collection is a JSON array of flat objects:
//!
//! ```json
//! {
//!   "id": "mark_42",
//!   "studentId": "s106",
//!   "examId": "jp_groups123_g1",
//!   "score": 14.0,
//!   "maxScore": 16.0,
//!   "percentage": 87.5,
//!   "createdAt": "2025-09-05T18:00:00.000000"
//! }
//! ```
//!
//! Two rules dominate everything downstream:
//!
//! - `id` is opaque and may be absent or regenerated across snapshots. It is
//!   never used for identity.
//! - Identity is the composite key `(studentId, examId)`.
//!
//! Unknown fields (e.g. the legacy `date` field) round-trip losslessly.

mod mark;

pub use mark::{Mark, MarkKey};
