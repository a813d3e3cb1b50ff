//! Fuzzy identity resolution against the roster
//!
//! Free-text names arrive in many spellings: spacing differences,
//! diacritics, and Arabic/Latin transliteration variants of the same
//! student. This module generalizes the interactive per-incident lookup
//! into one pure function: no hidden state, no side effects, and no
//! implicit selection. Ambiguity is surfaced to the caller, never
//! guessed.
//!
//! Two independent signals are computed per candidate:
//!
//! - whole-string similarity: normalized Levenshtein ratio over the
//!   lowercased names
//! - token overlap: how many query tokens contain, or are contained by,
//!   some candidate token
//!
//! A candidate is accepted when similarity ≥ 0.6 OR at least two tokens
//! overlap. Results are ranked by similarity, capped at 5.

mod similarity;

pub use similarity::{levenshtein, similarity_ratio};

use serde::Serialize;

use crate::roster::Student;

/// Acceptance threshold on whole-string similarity.
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

/// Acceptance threshold on overlapping token count.
pub const TOKEN_OVERLAP_THRESHOLD: usize = 2;

/// Maximum number of ranked candidates returned.
pub const MAX_CANDIDATES: usize = 5;

/// One ranked candidate for a free-text query.
#[derive(Debug, Clone, Serialize)]
pub struct NameMatch {
    /// The matched roster entry
    pub student: Student,
    /// Whole-string similarity in `[0, 1]`
    pub similarity: f64,
    /// Number of query tokens overlapping a candidate token
    pub token_hits: usize,
    /// `token_hits` normalized by the query token count
    pub token_overlap: f64,
}

/// Outcome of a resolution, for callers that need a decision.
///
/// Automated paths act only on `Unique`; `Ambiguous` and `NotFound` are
/// returned to the caller to decide.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// No candidate met either acceptance rule
    NotFound,
    /// Exactly one candidate was accepted
    Unique(NameMatch),
    /// Two or more candidates were accepted; the caller must choose
    Ambiguous(Vec<NameMatch>),
}

/// Rank roster candidates for a free-text name query.
///
/// Pure: reads the roster, mutates nothing, selects nothing. Ranking is
/// by similarity descending; ties keep roster order, so the result is
/// deterministic for a given roster file.
pub fn resolve(query: &str, students: &[Student]) -> Vec<NameMatch> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    let query_lower = query.to_lowercase();
    let query_tokens: Vec<&str> = query_lower.split_whitespace().collect();

    let mut matches: Vec<NameMatch> = students
        .iter()
        .filter_map(|student| {
            let name_lower = student.name.trim().to_lowercase();
            if name_lower.is_empty() {
                return None;
            }

            let similarity = similarity_ratio(&query_lower, &name_lower);
            let token_hits = overlapping_tokens(&query_tokens, &name_lower);

            let accepted =
                similarity >= SIMILARITY_THRESHOLD || token_hits >= TOKEN_OVERLAP_THRESHOLD;
            if !accepted {
                return None;
            }

            Some(NameMatch {
                student: student.clone(),
                similarity,
                token_hits,
                token_overlap: token_hits as f64 / query_tokens.len() as f64,
            })
        })
        .collect();

    // Stable sort: equal similarity keeps roster order
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(MAX_CANDIDATES);
    matches
}

/// Classify ranked matches into a decision for automated callers.
pub fn classify(matches: Vec<NameMatch>) -> Resolution {
    match matches.len() {
        0 => Resolution::NotFound,
        1 => Resolution::Unique(matches.into_iter().next().unwrap()),
        _ => Resolution::Ambiguous(matches),
    }
}

/// Count query tokens that contain, or are contained by, a candidate token.
fn overlapping_tokens(query_tokens: &[&str], candidate: &str) -> usize {
    let candidate_tokens: Vec<&str> = candidate.split_whitespace().collect();
    query_tokens
        .iter()
        .filter(|q| {
            candidate_tokens
                .iter()
                .any(|c| c.contains(**q) || q.contains(c))
        })
        .count()
}
