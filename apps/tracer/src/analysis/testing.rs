// Test doubles shared by the analysis tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::dataset::models::{SubmissionRecord, GRADED_RUN_EVENT};
use crate::llm_client::batch::{BatchJob, InlineReply, JobState};
use crate::llm_client::{
    AnalysisBackend, CacheHandle, Candidate, Content, GenerateRequest, GenerateResponse, LlmError,
    Part,
};

/// A graded run with placeholder code.
pub fn submission(student: &str, problem: &str, score: f64, attempt: u32) -> SubmissionRecord {
    SubmissionRecord {
        student_id: student.to_string(),
        problem_id: problem.to_string(),
        code_state_id: format!("{student}-{problem}-{attempt}"),
        code: format!("// {student} attempt {attempt}"),
        score: Some(score),
        attempt: Some(attempt),
        event_type: GRADED_RUN_EVENT.to_string(),
        compile_result: None,
        term_id: None,
        assignment_id: None,
        final_grade: None,
    }
}

pub fn batch_job(state: JobState, responses: Option<Vec<InlineReply>>) -> BatchJob {
    BatchJob {
        name: "batches/test".to_string(),
        state,
        error: None,
        responses,
        create_time: None,
        update_time: None,
    }
}

/// Backend that answers from a script and records what it was asked.
///
/// `get_batch` pops scripted snapshots in order and keeps repeating the last one.
#[derive(Default)]
pub struct ScriptedBackend {
    fail_registration: bool,
    expire_immediately: bool,
    fail_generate: bool,
    fail_batch: bool,
    reply: Option<String>,
    batch_polls: Mutex<VecDeque<BatchJob>>,
    registrations: AtomicUsize,
    polls: AtomicUsize,
    generate_calls: Mutex<Vec<GenerateRequest>>,
    batch_calls: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedBackend {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            ..Default::default()
        }
    }

    pub fn with_polls(polls: Vec<BatchJob>) -> Self {
        Self {
            batch_polls: Mutex::new(polls.into()),
            ..Default::default()
        }
    }

    pub fn failing_registration() -> Self {
        Self {
            fail_registration: true,
            ..Default::default()
        }
    }

    /// Registers successfully but hands back handles that are already expired.
    pub fn expiring() -> Self {
        Self {
            expire_immediately: true,
            ..Default::default()
        }
    }

    pub fn failing_generate() -> Self {
        Self {
            fail_generate: true,
            ..Default::default()
        }
    }

    pub fn failing_batch() -> Self {
        Self {
            fail_batch: true,
            ..Default::default()
        }
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> Vec<GenerateRequest> {
        self.generate_calls.lock().unwrap().clone()
    }

    pub fn batch_calls(&self) -> Vec<GenerateRequest> {
        self.batch_calls.lock().unwrap().clone()
    }

    fn unavailable() -> LlmError {
        LlmError::Api {
            status: 503,
            message: "scripted failure".to_string(),
        }
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    async fn register_context(
        &self,
        _display_name: &str,
        _system_instruction: &str,
        ttl: Duration,
    ) -> Result<CacheHandle, LlmError> {
        let n = self.registrations.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_registration {
            return Err(Self::unavailable());
        }
        let expire_time = if self.expire_immediately {
            Utc::now() - chrono::Duration::seconds(1)
        } else {
            Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64)
        };
        Ok(CacheHandle {
            name: format!("cachedContents/test-{n}"),
            expire_time: Some(expire_time),
        })
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        self.generate_calls.lock().unwrap().push(request.clone());
        if self.fail_generate {
            return Err(Self::unavailable());
        }
        let candidates = match &self.reply {
            Some(text) => vec![Candidate {
                content: Some(Content {
                    parts: vec![Part {
                        text: Some(text.clone()),
                    }],
                    role: Some("model".to_string()),
                }),
                finish_reason: Some("STOP".to_string()),
            }],
            None => Vec::new(),
        };
        Ok(GenerateResponse {
            candidates,
            usage_metadata: None,
        })
    }

    async fn create_batch(
        &self,
        _display_name: &str,
        requests: &[GenerateRequest],
    ) -> Result<BatchJob, LlmError> {
        self.batch_calls.lock().unwrap().extend_from_slice(requests);
        if self.fail_batch {
            return Err(Self::unavailable());
        }
        Ok(batch_job(JobState::Pending, None))
    }

    async fn get_batch(&self, _name: &str) -> Result<BatchJob, LlmError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.batch_polls.lock().unwrap();
        let job = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        job.ok_or_else(Self::unavailable)
    }
}
