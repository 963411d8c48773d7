use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Event type marking a graded (executed) run. Edit and compile events are not graded.
pub const GRADED_RUN_EVENT: &str = "Run.Program";

/// One row of `MainTable.csv`. Only the columns the pipeline reads are mapped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventRow {
    #[serde(rename = "SubjectID")]
    pub subject_id: String,
    #[serde(rename = "ProblemID")]
    pub problem_id: String,
    #[serde(rename = "CodeStateID")]
    pub code_state_id: String,
    #[serde(rename = "EventType")]
    pub event_type: String,
    #[serde(rename = "Score", default)]
    pub score: Option<f64>,
    #[serde(rename = "Attempt", default)]
    pub attempt: Option<u32>,
    #[serde(rename = "Compile.Result", default)]
    pub compile_result: Option<String>,
    #[serde(rename = "TermID", default)]
    pub term_id: Option<String>,
    #[serde(rename = "AssignmentID", default)]
    pub assignment_id: Option<String>,
}

/// One row of `LinkTables/CodeStates.csv`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CodeStateRow {
    #[serde(rename = "CodeStateID")]
    pub code_state_id: String,
    #[serde(rename = "Code", default)]
    pub code: String,
}

/// One row of `LinkTables/Subject.csv`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubjectRow {
    #[serde(rename = "SubjectID")]
    pub subject_id: String,
    #[serde(rename = "X-Grade", default)]
    pub final_grade: Option<f64>,
}

/// The three relational tables, loaded together or not at all.
#[derive(Debug, Clone, Default)]
pub struct SubmissionTables {
    pub events: Vec<EventRow>,
    pub code_states: Vec<CodeStateRow>,
    pub subjects: Vec<SubjectRow>,
}

/// One denormalized row of the joined table. Immutable once produced by the joiner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionRecord {
    pub student_id: String,
    pub problem_id: String,
    pub code_state_id: String,
    pub code: String,
    /// Fraction in [0, 1]; absent on non-graded events.
    pub score: Option<f64>,
    pub attempt: Option<u32>,
    pub event_type: String,
    pub compile_result: Option<String>,
    pub term_id: Option<String>,
    pub assignment_id: Option<String>,
    pub final_grade: Option<f64>,
}

impl SubmissionRecord {
    pub fn is_graded_run(&self) -> bool {
        self.event_type == GRADED_RUN_EVENT
    }

    pub fn key(&self) -> BestAttemptKey {
        BestAttemptKey {
            student_id: self.student_id.clone(),
            problem_id: self.problem_id.clone(),
        }
    }
}

/// (student, problem) pair. After selection exactly one record exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BestAttemptKey {
    pub student_id: String,
    pub problem_id: String,
}

/// A unit of course content from the curriculum taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumTopic {
    #[serde(alias = "topic")]
    pub name: String,
    pub chapter: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtopics: Vec<String>,
}

/// One row of the problem reference table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProblemRow {
    #[serde(rename = "ProblemID")]
    pub problem_id: String,
    #[serde(rename = "Requirement")]
    pub requirement: String,
}

/// Problem id → requirement text. Ordered so serialized prompts are deterministic.
pub type ProblemDescriptions = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event_type: &str) -> SubmissionRecord {
        SubmissionRecord {
            student_id: "s1".to_string(),
            problem_id: "p1".to_string(),
            code_state_id: "c1".to_string(),
            code: "int x;".to_string(),
            score: Some(1.0),
            attempt: Some(1),
            event_type: event_type.to_string(),
            compile_result: None,
            term_id: None,
            assignment_id: None,
            final_grade: None,
        }
    }

    #[test]
    fn test_graded_run_detection() {
        assert!(record("Run.Program").is_graded_run());
        assert!(!record("Compile").is_graded_run());
        assert!(!record("Compile.Error").is_graded_run());
    }

    #[test]
    fn test_curriculum_topic_accepts_topic_alias() {
        let json = r#"[
            {"topic": "Loops", "chapter": 4},
            {"name": "Arrays", "chapter": 6, "subtopics": ["bounds"]}
        ]"#;
        let topics: Vec<CurriculumTopic> = serde_json::from_str(json).unwrap();
        assert_eq!(topics[0].name, "Loops");
        assert!(topics[0].subtopics.is_empty());
        assert_eq!(topics[1].subtopics, vec!["bounds".to_string()]);
    }
}
