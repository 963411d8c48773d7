//! Batch job wire format and state model.
//!
//! A batch job is an opaque remote handle. Its state is observed by polling
//! `get_batch`; inline responses are only read once the job has SUCCEEDED.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GenerateContentBody, GenerateRequest, GenerateResponse, LlmError};

/// Remote job state. The backend reports `JOB_STATE_*` through its SDKs and
/// `BATCH_STATE_*` over REST; both spellings are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    #[serde(rename = "JOB_STATE_PENDING", alias = "BATCH_STATE_PENDING")]
    Pending,
    #[serde(rename = "JOB_STATE_RUNNING", alias = "BATCH_STATE_RUNNING")]
    Running,
    #[serde(rename = "JOB_STATE_SUCCEEDED", alias = "BATCH_STATE_SUCCEEDED")]
    Succeeded,
    #[serde(rename = "JOB_STATE_FAILED", alias = "BATCH_STATE_FAILED")]
    Failed,
    #[serde(rename = "JOB_STATE_CANCELLED", alias = "BATCH_STATE_CANCELLED")]
    Cancelled,
    #[serde(rename = "JOB_STATE_EXPIRED", alias = "BATCH_STATE_EXPIRED")]
    Expired,
    #[serde(other, rename = "JOB_STATE_UNSPECIFIED")]
    Unspecified,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled | JobState::Expired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "JOB_STATE_PENDING",
            JobState::Running => "JOB_STATE_RUNNING",
            JobState::Succeeded => "JOB_STATE_SUCCEEDED",
            JobState::Failed => "JOB_STATE_FAILED",
            JobState::Cancelled => "JOB_STATE_CANCELLED",
            JobState::Expired => "JOB_STATE_EXPIRED",
            JobState::Unspecified => "JOB_STATE_UNSPECIFIED",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `google.rpc.Status`-shaped error payload.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RpcStatus {
    pub code: Option<i32>,
    pub message: Option<String>,
}

impl std::fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.message.as_deref()) {
            (Some(code), Some(message)) => write!(f, "{message} (code {code})"),
            (None, Some(message)) => f.write_str(message),
            (Some(code), None) => write!(f, "error code {code}"),
            (None, None) => f.write_str("unknown error"),
        }
    }
}

/// The reply for one request of a batch, index-aligned with the submitted requests.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineReply {
    Text(String),
    /// A response exists but carries no text (or only whitespace).
    Empty,
    /// No response was produced for this request.
    Missing,
    Error(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InlinedResponse {
    pub response: Option<GenerateResponse>,
    pub error: Option<RpcStatus>,
}

impl From<&InlinedResponse> for InlineReply {
    fn from(inlined: &InlinedResponse) -> Self {
        if let Some(error) = &inlined.error {
            return InlineReply::Error(error.to_string());
        }
        match &inlined.response {
            None => InlineReply::Missing,
            Some(response) => match response.text() {
                Some(text) if !text.trim().is_empty() => InlineReply::Text(text),
                _ => InlineReply::Empty,
            },
        }
    }
}

/// Observed snapshot of a remote batch job.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub name: String,
    pub state: JobState,
    pub error: Option<RpcStatus>,
    /// Present only once the backend has written inline results.
    pub responses: Option<Vec<InlineReply>>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

// ────────────────────────────────────────────────────────────────────────────
// Wire format
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CreateBatchBody {
    batch: BatchSpec,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchSpec {
    display_name: String,
    input_config: InputConfig,
}

#[derive(Debug, Serialize)]
struct InputConfig {
    requests: RequestList,
}

#[derive(Debug, Serialize)]
struct RequestList {
    requests: Vec<KeyedRequest>,
}

#[derive(Debug, Serialize)]
struct KeyedRequest {
    request: GenerateContentBody,
    metadata: RequestMetadata,
}

#[derive(Debug, Serialize)]
struct RequestMetadata {
    key: String,
}

impl CreateBatchBody {
    pub fn new(display_name: &str, requests: &[GenerateRequest]) -> Self {
        let requests = requests
            .iter()
            .enumerate()
            .map(|(i, request)| KeyedRequest {
                request: GenerateContentBody::from(request),
                metadata: RequestMetadata {
                    key: format!("submission-{}", i + 1),
                },
            })
            .collect();
        Self {
            batch: BatchSpec {
                display_name: display_name.to_string(),
                input_config: InputConfig {
                    requests: RequestList { requests },
                },
            },
        }
    }
}

/// Inline responses arrive either wrapped (`{"inlinedResponses": [...]}`) or as a bare list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InlinedResponses {
    Wrapped {
        #[serde(rename = "inlinedResponses")]
        inlined_responses: Vec<InlinedResponse>,
    },
    List(Vec<InlinedResponse>),
}

impl InlinedResponses {
    fn into_vec(self) -> Vec<InlinedResponse> {
        match self {
            InlinedResponses::Wrapped { inlined_responses } => inlined_responses,
            InlinedResponses::List(list) => list,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchOutput {
    inlined_responses: Option<InlinedResponses>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchMetadata {
    state: Option<JobState>,
    create_time: Option<DateTime<Utc>>,
    update_time: Option<DateTime<Utc>>,
    output: Option<BatchOutput>,
}

/// Long-running operation envelope returned by create and get.
#[derive(Debug, Deserialize)]
pub struct BatchOperation {
    name: Option<String>,
    metadata: Option<BatchMetadata>,
    error: Option<RpcStatus>,
    response: Option<BatchOutput>,
}

impl TryFrom<BatchOperation> for BatchJob {
    type Error = LlmError;

    fn try_from(operation: BatchOperation) -> Result<Self, Self::Error> {
        let name = operation.name.ok_or(LlmError::MissingField("name"))?;
        let metadata = operation.metadata.unwrap_or_default();

        let output = operation
            .response
            .and_then(|r| r.inlined_responses)
            .or_else(|| metadata.output.and_then(|o| o.inlined_responses));
        let responses = output.map(|o| o.into_vec().iter().map(InlineReply::from).collect());

        Ok(BatchJob {
            name,
            state: metadata.state.unwrap_or(JobState::Unspecified),
            error: operation.error,
            responses,
            create_time: metadata.create_time,
            update_time: metadata.update_time,
        })
    }
}
