//! Student and exam entity types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A roster member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    /// Stable canonical id
    pub id: String,
    /// Display name, free text (spacing, diacritics and transliteration vary)
    pub name: String,
    /// Group membership
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Unknown fields, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Classification of an exam for dedup precedence.
///
/// The boundary is explicit in data via the exam's `class` field; the
/// substring fallback below exists only for legacy exam lists that predate
/// the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamClass {
    /// A current assessment; its marks win dedup against placement marks
    Assessment,
    /// A legacy or placement test; its marks lose dedup
    Placement,
}

/// An assessment instance. Read-only reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    /// Stable exam id
    pub id: String,
    /// Human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Maximum achievable score
    #[serde(rename = "maxScore")]
    pub max_score: f64,
    /// Explicit classification; wins over the substring fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<ExamClass>,
    /// Unknown fields, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Exam {
    /// Effective classification of this exam.
    ///
    /// The explicit `class` field decides when present. Otherwise an exam
    /// whose id or name contains `placement` (case-insensitive) is legacy;
    /// everything else is a current assessment.
    pub fn class(&self) -> ExamClass {
        if let Some(class) = self.class {
            return class;
        }
        let id_hit = self.id.to_lowercase().contains("placement");
        let name_hit = self
            .name
            .as_deref()
            .map(|n| n.to_lowercase().contains("placement"))
            .unwrap_or(false);
        if id_hit || name_hit {
            ExamClass::Placement
        } else {
            ExamClass::Assessment
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_class_wins_over_fallback() {
        // Name says placement, field says assessment: field wins
        let exam: Exam = serde_json::from_str(
            r#"{"id": "e1", "name": "Placement Retake", "maxScore": 20, "class": "assessment"}"#,
        )
        .unwrap();
        assert_eq!(exam.class(), ExamClass::Assessment);
    }

    #[test]
    fn test_fallback_matches_id_and_name() {
        let by_id: Exam =
            serde_json::from_str(r#"{"id": "placement_2025", "maxScore": 20}"#).unwrap();
        assert_eq!(by_id.class(), ExamClass::Placement);

        let by_name: Exam = serde_json::from_str(
            r#"{"id": "e2", "name": "English Placement", "maxScore": 20}"#,
        )
        .unwrap();
        assert_eq!(by_name.class(), ExamClass::Placement);

        let neither: Exam =
            serde_json::from_str(r#"{"id": "jp_groups123_g1", "maxScore": 16}"#).unwrap();
        assert_eq!(neither.class(), ExamClass::Assessment);
    }

    #[test]
    fn test_student_extra_roundtrip() {
        let student: Student = serde_json::from_str(
            r#"{"id": "s1", "name": "Ahmed", "group": "g1", "phone": "555"}"#,
        )
        .unwrap();
        let out = serde_json::to_value(&student).unwrap();
        assert_eq!(out["phone"], "555");
    }
}
