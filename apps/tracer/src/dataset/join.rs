//! Dataset Joiner: inner joins events ⋈ code snapshots (on code-state id)
//! ⋈ subjects (on student id).
//!
//! Rows without a match on either key are dropped, so a submission whose snapshot
//! was never persisted does not appear downstream. Output follows event order,
//! then snapshot order, then subject order for duplicate keys.

use std::collections::HashMap;

use tracing::info;

use crate::dataset::models::{SubmissionRecord, SubmissionTables};

pub fn join_tables(tables: &SubmissionTables) -> Vec<SubmissionRecord> {
    let mut snapshots_by_id: HashMap<&str, Vec<&str>> = HashMap::new();
    for snapshot in &tables.code_states {
        snapshots_by_id
            .entry(snapshot.code_state_id.as_str())
            .or_default()
            .push(snapshot.code.as_str());
    }

    let mut grades_by_subject: HashMap<&str, Vec<Option<f64>>> = HashMap::new();
    for subject in &tables.subjects {
        grades_by_subject
            .entry(subject.subject_id.as_str())
            .or_default()
            .push(subject.final_grade);
    }

    let mut joined = Vec::new();
    for event in &tables.events {
        let Some(codes) = snapshots_by_id.get(event.code_state_id.as_str()) else {
            continue;
        };
        let Some(grades) = grades_by_subject.get(event.subject_id.as_str()) else {
            continue;
        };

        for code in codes {
            for grade in grades {
                joined.push(SubmissionRecord {
                    student_id: event.subject_id.clone(),
                    problem_id: event.problem_id.clone(),
                    code_state_id: event.code_state_id.clone(),
                    code: (*code).to_string(),
                    score: event.score,
                    attempt: event.attempt,
                    event_type: event.event_type.clone(),
                    compile_result: event.compile_result.clone(),
                    term_id: event.term_id.clone(),
                    assignment_id: event.assignment_id.clone(),
                    final_grade: *grade,
                });
            }
        }
    }

    info!("Joined dataset: {} rows", joined.len());
    joined
}

/// Keeps only records from one term. Records without a term never match.
pub fn filter_term(records: Vec<SubmissionRecord>, term_id: &str) -> Vec<SubmissionRecord> {
    records
        .into_iter()
        .filter(|r| r.term_id.as_deref() == Some(term_id))
        .collect()
}
