//! Recovery orchestration
//!
//! See [`engine::ReconciliationEngine`] for the pass structure. The
//! engine returns structured reports and never prints; rendering is the
//! caller's concern.

mod engine;
mod errors;
mod report;

pub use engine::ReconciliationEngine;
pub use errors::{EngineError, EngineResult};
pub use report::{
    DedupeReport, ReconcileReport, RejectReason, RejectedCandidate, StudentCleanupReport,
};
