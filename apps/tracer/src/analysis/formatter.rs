//! Batch Formatter: renders best-attempt records into the user turn of an analysis request.
//!
//! The only truncation is the cap on how many submissions are included. Code text is
//! copied verbatim and records are never reordered, merged or split.

use crate::analysis::context::{estimate_tokens, AnalysisSession};
use crate::analysis::prompts::{SUBMISSIONS_HEADER, SUBMISSION_DELIMITER};
use crate::dataset::models::SubmissionRecord;
use crate::llm_client::GenerateRequest;

/// Default number of submissions per analysis.
pub const DEFAULT_BATCH_CAP: usize = 50;

/// The formatted submissions for one synchronous analysis call.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisBatchPayload {
    pub text: String,
    pub included: usize,
}

impl AnalysisBatchPayload {
    /// Approximate size of the rendered submissions.
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

/// The first `cap` records, in input order.
pub fn cap_submissions(records: &[SubmissionRecord], cap: usize) -> &[SubmissionRecord] {
    &records[..records.len().min(cap)]
}

/// One submission block. `ordinal` is 1-based.
pub fn format_submission_block(ordinal: usize, record: &SubmissionRecord) -> String {
    let score = record
        .score
        .map(|s| format!("{:.1}%", s * 100.0))
        .unwrap_or_else(|| "N/A".to_string());
    let attempt = record
        .attempt
        .map(|a| a.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let compile_status = record.compile_result.as_deref().unwrap_or("Unknown");

    format!(
        "Submission {ordinal}\n\
         Student ID: {}\n\
         Problem ID: {}\n\
         Score: {score}\n\
         Attempt: {attempt}\n\
         Compile Status: {compile_status}\n\
         Code:\n\
         {}\n\
         {SUBMISSION_DELIMITER}\n",
        record.student_id, record.problem_id, record.code
    )
}

fn render(blocks: impl Iterator<Item = String>) -> String {
    let mut text = format!("{SUBMISSIONS_HEADER}\n\n");
    for block in blocks {
        text.push_str(&block);
        text.push('\n');
    }
    text
}

/// Renders at most `cap` records into one payload.
pub fn format_batch(records: &[SubmissionRecord], cap: usize) -> AnalysisBatchPayload {
    let included = cap_submissions(records, cap);
    let text = render(
        included
            .iter()
            .enumerate()
            .map(|(i, record)| format_submission_block(i + 1, record)),
    );
    AnalysisBatchPayload {
        text,
        included: included.len(),
    }
}

/// The synchronous request: all capped submissions in one user turn.
pub fn build_sync_request(
    records: &[SubmissionRecord],
    cap: usize,
    session: &AnalysisSession,
) -> (GenerateRequest, AnalysisBatchPayload) {
    let payload = format_batch(records, cap);
    let request = GenerateRequest {
        prompt: payload.text.clone(),
        context: session.attachment(),
    };
    (request, payload)
}

/// Batch-job requests: one request per capped submission, index-aligned with the input.
pub fn build_batch_requests(
    records: &[SubmissionRecord],
    cap: usize,
    session: &AnalysisSession,
) -> Vec<GenerateRequest> {
    let context = session.attachment();
    cap_submissions(records, cap)
        .iter()
        .enumerate()
        .map(|(i, record)| GenerateRequest {
            prompt: render(std::iter::once(format_submission_block(i + 1, record))),
            context: context.clone(),
        })
        .collect()
}
