//! markbook - a strict, recoverable score-tracking engine
//!
//! Tracks scored observations ("marks") for a roster of students,
//! persisted as flat JSON collections with snapshot-protected atomic
//! mutation. The core is the reconciliation and integrity engine:
//!
//! - [`store`]: atomic load/persist of the live mark collection
//! - [`snapshot`]: ordered, bounded archive of immutable snapshots
//! - [`resolve`]: fuzzy identity resolution against the roster
//! - [`dedupe`]: canonical-record selection under a precedence policy
//! - [`reconcile`]: recovery of marks lost between snapshots
//! - [`validate`]: read-only referential and value audit

pub mod cli;
pub mod dedupe;
pub mod discard;
pub mod model;
pub mod observability;
pub mod reconcile;
pub mod resolve;
pub mod roster;
pub mod snapshot;
pub mod store;
pub mod validate;
