//! Knowledge tracing: orchestrates one analysis run.
//!
//! Flow: load tables → join → term filter → best attempts → cap →
//!       reference data → context session → invoke (sync or batch) → validate.
//!
//! Every step either hands a value to the next one or ends the run with a
//! `PipelineError`. Nothing is retried here; callers re-run the whole pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::analysis::context::{focus_problems, AnalysisContext, AnalysisSession};
use crate::analysis::formatter::{build_batch_requests, build_sync_request, cap_submissions};
use crate::analysis::invoker::AnalysisInvoker;
use crate::analysis::mode::{AnalysisMode, KnowledgeGapReport};
use crate::analysis::validator::parse_reply;
use crate::dataset::{
    filter_term, join_tables, load_curriculum, load_problems, load_tables, select_best_attempts,
    SubmissionRecord, TablePaths,
};
use crate::errors::PipelineError;
use crate::llm_client::batch::InlineReply;
use crate::llm_client::AnalysisBackend;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// How the capped submissions reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// One rate-limited call carrying every submission.
    Sync,
    /// One batch job with one request per submission.
    Batch,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub tables: TablePaths,
    pub curriculum_path: PathBuf,
    pub problems_path: PathBuf,
    pub mode: AnalysisMode,
    /// `None` analyzes every term.
    pub term: Option<String>,
    pub cap: usize,
    pub execution: Execution,
    /// When false the instruction is sent inline with every request.
    pub use_cache: bool,
    pub cache_ttl: Duration,
}

/// What became of one submission in a batch job.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Report(KnowledgeGapReport),
    /// Text came back but did not validate against the active mode.
    Invalid(String),
    /// A response exists without any text.
    Empty,
    /// No response was produced for this submission.
    Missing,
    /// The backend reported an error for this request.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    pub student_id: String,
    pub problem_id: String,
    pub outcome: SubmissionOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// The single report of a synchronous run.
    Summary(KnowledgeGapReport),
    /// One entry per submitted request, in submission order.
    PerSubmission(Vec<SubmissionResult>),
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Runs one analysis end to end.
///
/// `cancel` only matters in batch mode, where it abandons the local poll.
pub async fn run_analysis(
    options: &PipelineOptions,
    backend: Arc<dyn AnalysisBackend>,
    invoker: &AnalysisInvoker,
    cancel: &CancellationToken,
) -> Result<AnalysisOutcome, PipelineError> {
    let selected = select_submissions(options)?;
    let submissions = cap_submissions(&selected, options.cap);
    info!(
        "Analyzing {} submissions ({} over the cap of {})",
        submissions.len(),
        selected.len() - submissions.len(),
        options.cap
    );

    let curriculum = load_curriculum(&options.curriculum_path)?;
    let problems = focus_problems(&load_problems(&options.problems_path)?, submissions);
    let context = AnalysisContext::build(options.mode, &curriculum, &problems)
        .map_err(|e| PipelineError::Internal(format!("cannot render analysis context: {e}")))?;

    let mut session = if options.use_cache {
        AnalysisSession::new(backend, context, options.cache_ttl)
    } else {
        AnalysisSession::inline_only(backend, context)
    };
    session.ensure_registered().await;
    if options.use_cache && session.handle().is_none() {
        info!("Continuing with the analysis context sent inline");
    }

    match options.execution {
        Execution::Sync => run_sync(options.mode, submissions, &session, invoker)
            .await
            .map(AnalysisOutcome::Summary),
        Execution::Batch => run_batch(options.mode, submissions, &session, invoker, cancel)
            .await
            .map(AnalysisOutcome::PerSubmission),
    }
}

/// Load → join → term filter → best attempt per (student, problem).
pub fn select_submissions(
    options: &PipelineOptions,
) -> Result<Vec<SubmissionRecord>, PipelineError> {
    let tables = load_tables(&options.tables)?;
    let mut records = join_tables(&tables);

    if let Some(term) = &options.term {
        records = filter_term(records, term);
        info!("Term {term}: {} rows", records.len());
    }

    let selected = select_best_attempts(&records);
    if selected.is_empty() {
        let scope = match &options.term {
            Some(term) => format!("no graded submissions in term {term}"),
            None => "no graded submissions in the dataset".to_string(),
        };
        warn!("Nothing to analyze: {scope}");
        return Err(PipelineError::EmptySelection(scope));
    }
    Ok(selected)
}

async fn run_sync(
    mode: AnalysisMode,
    submissions: &[SubmissionRecord],
    session: &AnalysisSession,
    invoker: &AnalysisInvoker,
) -> Result<KnowledgeGapReport, PipelineError> {
    let (request, payload) = build_sync_request(submissions, submissions.len(), session);
    info!(
        "Formatted {} submissions (~{} tokens)",
        payload.included,
        payload.estimated_tokens()
    );

    let reply = invoker.invoke(&request).await?;
    let report = parse_reply(reply.as_deref(), mode)?;
    if !report.is_usable() {
        warn!("Reply carried none of the {mode} keys");
        return Err(PipelineError::UnusableReply {
            mode,
            expected: mode.expected_keys().join(", "),
        });
    }
    Ok(report)
}

async fn run_batch(
    mode: AnalysisMode,
    submissions: &[SubmissionRecord],
    session: &AnalysisSession,
    invoker: &AnalysisInvoker,
    cancel: &CancellationToken,
) -> Result<Vec<SubmissionResult>, PipelineError> {
    let requests = build_batch_requests(submissions, submissions.len(), session);
    let display_name = format!("knowledge-tracer-{mode}");
    let replies = invoker.run_batch(&display_name, &requests, cancel).await?;

    let results: Vec<SubmissionResult> = submissions
        .iter()
        .zip(replies)
        .map(|(record, reply)| SubmissionResult {
            student_id: record.student_id.clone(),
            problem_id: record.problem_id.clone(),
            outcome: read_inline_reply(mode, reply),
        })
        .collect();

    let reports = results
        .iter()
        .filter(|r| matches!(r.outcome, SubmissionOutcome::Report(_)))
        .count();
    info!("Batch results: {reports} of {} submissions produced a report", results.len());
    Ok(results)
}

fn read_inline_reply(mode: AnalysisMode, reply: InlineReply) -> SubmissionOutcome {
    match reply {
        InlineReply::Text(text) => match parse_reply(Some(text.as_str()), mode) {
            Ok(report) if report.is_usable() => SubmissionOutcome::Report(report),
            Ok(_) => SubmissionOutcome::Invalid(format!(
                "none of the expected keys ({})",
                mode.expected_keys().join(", ")
            )),
            Err(e) => SubmissionOutcome::Invalid(e.to_string()),
        },
        InlineReply::Empty => SubmissionOutcome::Empty,
        InlineReply::Missing => SubmissionOutcome::Missing,
        InlineReply::Error(detail) => SubmissionOutcome::Failed(detail),
    }
}
