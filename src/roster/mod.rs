//! Roster reference data: students and exams
//!
//! The engine treats the roster as read-only. Students and exams are
//! created and edited by external tooling; this module only loads them and
//! answers lookups.
//!
//! Files (JSON arrays of flat objects, under `<data_dir>/`):
//!
//! - `students.json`: `{id, name, group?, ...}`
//! - `exams.json`: `{id, name?, maxScore, class?, ...}`

mod entities;

pub use entities::{Exam, ExamClass, Student};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Roster loading failures.
#[derive(Debug, Error)]
pub enum RosterError {
    /// File could not be read
    #[error("failed to read roster file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not a valid JSON array of the expected shape
    #[error("malformed roster file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Loaded roster with id lookup tables.
#[derive(Debug, Clone)]
pub struct Roster {
    students: Vec<Student>,
    exams: Vec<Exam>,
    student_index: HashMap<String, usize>,
    exam_index: HashMap<String, usize>,
}

impl Roster {
    /// Load `students.json` and `exams.json` from the data directory.
    pub fn load(data_dir: &Path) -> Result<Self, RosterError> {
        let students: Vec<Student> = load_array(&data_dir.join("students.json"))?;
        let exams: Vec<Exam> = load_array(&data_dir.join("exams.json"))?;
        Ok(Self::from_parts(students, exams))
    }

    /// Build a roster from already-loaded entities.
    pub fn from_parts(students: Vec<Student>, exams: Vec<Exam>) -> Self {
        let student_index = students
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        let exam_index = exams
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        Self {
            students,
            exams,
            student_index,
            exam_index,
        }
    }

    /// All students, in file order.
    pub fn students(&self) -> &[Student] {
        &self.students
    }

    /// All exams, in file order.
    pub fn exams(&self) -> &[Exam] {
        &self.exams
    }

    /// Look up a student by id.
    pub fn student(&self, id: &str) -> Option<&Student> {
        self.student_index.get(id).map(|&i| &self.students[i])
    }

    /// Look up an exam by id.
    pub fn exam(&self, id: &str) -> Option<&Exam> {
        self.exam_index.get(id).map(|&i| &self.exams[i])
    }

    /// Whether a student id resolves to a living roster entry.
    pub fn contains_student(&self, id: &str) -> bool {
        self.student_index.contains_key(id)
    }

    /// Classification of an exam id.
    ///
    /// Unknown exam ids classify as [`ExamClass::Assessment`] so that an
    /// incomplete exam list never demotes a live mark during dedup.
    pub fn exam_class(&self, exam_id: &str) -> ExamClass {
        self.exam(exam_id)
            .map(Exam::class)
            .unwrap_or(ExamClass::Assessment)
    }

    /// The score capacity for an exam, if the exam is known.
    pub fn exam_max_score(&self, exam_id: &str) -> Option<f64> {
        self.exam(exam_id).map(|e| e.max_score)
    }
}

fn load_array<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, RosterError> {
    let raw = fs::read_to_string(path).map_err(|e| RosterError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&raw).map_err(|e| RosterError::Malformed {
        path: path.to_path_buf(),
        source: e,
    })
}
