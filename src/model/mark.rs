//! Mark record and composite key types

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Composite identity of a mark: `(studentId, examId)`.
///
/// This is the real uniqueness constraint on the collection. The opaque
/// `id` field is ignored for identity because historical tooling
/// regenerated it freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkKey {
    /// Student identifier (foreign key into the roster)
    #[serde(rename = "studentId")]
    pub student_id: String,
    /// Exam identifier (foreign key into the exam list)
    #[serde(rename = "examId")]
    pub exam_id: String,
}

impl MarkKey {
    /// Create a key from its two components.
    pub fn new(student_id: impl Into<String>, exam_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            exam_id: exam_id.into(),
        }
    }
}

impl fmt::Display for MarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.student_id, self.exam_id)
    }
}

/// One scored observation.
///
/// `percentage` is kept as a raw JSON value: historical data holds both
/// numbers (`87.5`) and formatted strings (`"87.5"`), and both must
/// round-trip verbatim. Use [`Mark::derived_percentage`] for the numeric
/// reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    /// Opaque record id. Absent or regenerated ids are normal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Student identifier
    #[serde(rename = "studentId")]
    pub student_id: String,

    /// Exam identifier
    #[serde(rename = "examId")]
    pub exam_id: String,

    /// Achieved score
    pub score: f64,

    /// Maximum achievable score for this observation
    #[serde(rename = "maxScore", default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,

    /// Derived percentage, number or formatted string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Value>,

    /// Creation timestamp, free-form (several historical formats exist)
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Unknown fields, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Mark {
    /// Create a minimal mark with only identity and score.
    pub fn new(student_id: impl Into<String>, exam_id: impl Into<String>, score: f64) -> Self {
        Self {
            id: None,
            student_id: student_id.into(),
            exam_id: exam_id.into(),
            score,
            max_score: None,
            percentage: None,
            created_at: None,
            extra: Map::new(),
        }
    }

    /// The composite identity of this mark.
    pub fn key(&self) -> MarkKey {
        MarkKey::new(self.student_id.clone(), self.exam_id.clone())
    }

    /// Whether both optional metadata fields are present.
    ///
    /// Completeness is a dedup tie-breaker: a mark carrying `percentage`
    /// and `createdAt` beats one that lost them during an incident.
    pub fn has_complete_metadata(&self) -> bool {
        self.percentage.is_some() && self.created_at.is_some()
    }

    /// Numeric reading of `percentage`, tolerating the string form.
    pub fn derived_percentage(&self) -> Option<f64> {
        match self.percentage.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Parsed `createdAt`, if it matches any historical format.
    ///
    /// Accepted: RFC3339, `YYYY-MM-DDTHH:MM:SS[.ffffff]`, bare `YYYY-MM-DD`.
    pub fn created_at_time(&self) -> Option<NaiveDateTime> {
        let raw = self.created_at.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
            return Some(dt.naive_utc());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(dt);
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
            return Some(dt);
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return d.and_hms_opt(0, 0, 0);
        }
        None
    }

    /// Whether two marks describe the same real event: same key, same score.
    ///
    /// Used when merging recovery candidates found in more than one
    /// snapshot. Incidental differences (ids, metadata) do not matter.
    pub fn same_observation(&self, other: &Mark) -> bool {
        self.student_id == other.student_id
            && self.exam_id == other.exam_id
            && self.score == other.score
    }
}
