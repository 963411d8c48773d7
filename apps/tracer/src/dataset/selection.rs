//! Best-Attempt Selector: reduces the joined stream to one record per
//! (student, problem).
//!
//! Order: highest score, then highest attempt index. When both are equal the
//! first record encountered is kept. Output keeps the order in which each pair
//! first appears in the input.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::info;

use crate::dataset::models::{BestAttemptKey, SubmissionRecord};

pub fn select_best_attempts(records: &[SubmissionRecord]) -> Vec<SubmissionRecord> {
    let mut slot_by_key: HashMap<BestAttemptKey, usize> = HashMap::new();
    let mut best: Vec<&SubmissionRecord> = Vec::new();
    let mut graded = 0usize;

    for record in records.iter().filter(|r| r.is_graded_run()) {
        graded += 1;
        match slot_by_key.get(&record.key()) {
            Some(&slot) => {
                if compare_attempts(record, best[slot]) == Ordering::Greater {
                    best[slot] = record;
                }
            }
            None => {
                slot_by_key.insert(record.key(), best.len());
                best.push(record);
            }
        }
    }

    info!(
        "Best-attempt selection: {} graded runs -> {} student/problem pairs",
        graded,
        best.len()
    );
    best.into_iter().cloned().collect()
}

/// Total order on attempts of the same pair. A missing score ranks below every
/// real score; a missing attempt index ranks below attempt 1.
fn compare_attempts(a: &SubmissionRecord, b: &SubmissionRecord) -> Ordering {
    let score_a = a.score.unwrap_or(f64::NEG_INFINITY);
    let score_b = b.score.unwrap_or(f64::NEG_INFINITY);
    score_a
        .total_cmp(&score_b)
        .then_with(|| a.attempt.unwrap_or(0).cmp(&b.attempt.unwrap_or(0)))
}
