use thiserror::Error;

use crate::analysis::mode::AnalysisMode;
use crate::analysis::validator::ReplyError;
use crate::dataset::LoadError;
use crate::llm_client::batch::JobState;
use crate::llm_client::LlmError;

/// Pipeline-level error type.
///
/// Every variant ends the current run; none is retried automatically.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(#[from] LoadError),

    #[error("Nothing to analyze: {0}")]
    EmptySelection(String),

    #[error("Analysis backend error: {0}")]
    Backend(#[from] LlmError),

    #[error("Batch job {job} failed: {detail}")]
    JobFailed { job: String, detail: String },

    #[error("Batch job {job} finished with state {state}")]
    JobNotSucceeded { job: String, state: JobState },

    #[error("Stopped waiting for batch job {job}; the remote job keeps running")]
    Cancelled { job: String },

    #[error("Batch job {job} returned {actual} responses for {expected} requests")]
    ResponseCountMismatch {
        job: String,
        expected: usize,
        actual: usize,
    },

    #[error("Malformed reply: {0}")]
    MalformedReply(#[from] ReplyError),

    #[error("Reply has none of the expected keys for {mode} analysis ({expected})")]
    UnusableReply { mode: AnalysisMode, expected: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// The four failure kinds a caller needs to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DataUnavailable,
    EmptySelection,
    Backend,
    MalformedReply,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::DataUnavailable(_) => ErrorKind::DataUnavailable,
            PipelineError::EmptySelection(_) => ErrorKind::EmptySelection,
            PipelineError::Backend(_)
            | PipelineError::JobFailed { .. }
            | PipelineError::JobNotSucceeded { .. }
            | PipelineError::Cancelled { .. }
            | PipelineError::ResponseCountMismatch { .. }
            | PipelineError::Internal(_) => ErrorKind::Backend,
            PipelineError::MalformedReply(_) | PipelineError::UnusableReply { .. } => {
                ErrorKind::MalformedReply
            }
        }
    }
}
