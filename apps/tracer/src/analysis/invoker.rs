//! Analysis Invoker: sends formatted payloads to the backend.
//!
//! Synchronous mode: one rate-limited call, one text reply.
//! Batch mode: submit a job, poll it every `poll_interval` until it reaches a terminal
//! state, then read the inline responses (index-aligned with the submitted requests).
//!
//! Polling can be abandoned through a `CancellationToken` or an overall `max_wait`.
//! Either only stops the local wait; the remote job runs to its own terminal state.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::context::estimate_tokens;
use crate::errors::PipelineError;
use crate::llm_client::batch::{BatchJob, InlineReply, JobState};
use crate::llm_client::rate_limit::RateLimiter;
use crate::llm_client::{AnalysisBackend, ContextAttachment, GenerateRequest};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub struct AnalysisInvoker {
    backend: Arc<dyn AnalysisBackend>,
    limiter: RateLimiter,
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl AnalysisInvoker {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        limiter: RateLimiter,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            limiter,
            poll_interval,
            max_wait: None,
        }
    }

    /// Bounds the total time spent polling one batch job.
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    // ────────────────────────────────────────────────────────────────────────
    // Synchronous mode
    // ────────────────────────────────────────────────────────────────────────

    /// One rate-limited call. `Ok(None)` means the backend answered without text.
    pub async fn invoke(&self, request: &GenerateRequest) -> Result<Option<String>, PipelineError> {
        self.limiter.wait().await;

        let context = match &request.context {
            ContextAttachment::Cached(name) => format!("cached context {name}"),
            ContextAttachment::Inline(text) => {
                format!("inline context ~{} tokens", estimate_tokens(text))
            }
        };
        info!(
            "Sending analysis request (~{} tokens, {})",
            estimate_tokens(&request.prompt),
            context
        );

        let response = self.backend.generate(request).await?;
        let text = response.text();
        if text.is_none() {
            warn!(
                "Model returned no text (finish reason: {})",
                response.finish_reason().unwrap_or("none reported")
            );
        }
        Ok(text)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Batch mode
    // ────────────────────────────────────────────────────────────────────────

    pub async fn submit_batch(
        &self,
        display_name: &str,
        requests: &[GenerateRequest],
    ) -> Result<BatchJob, PipelineError> {
        let job = self.backend.create_batch(display_name, requests).await?;
        info!("Created batch job: {} ({} requests)", job.name, requests.len());
        if let Some(created) = job.create_time {
            debug!("Batch job {} created at {created}", job.name);
        }
        Ok(job)
    }

    /// Polls until the job is terminal. Only a SUCCEEDED job is returned as `Ok`.
    pub async fn wait_for_completion(
        &self,
        job_name: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchJob, PipelineError> {
        let polling = self.poll_until_terminal(job_name, cancel);
        let job = match self.max_wait {
            Some(limit) => match tokio::time::timeout(limit, polling).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        "Gave up on batch job {job_name} after {}s; the remote job keeps running",
                        limit.as_secs()
                    );
                    return Err(PipelineError::Cancelled {
                        job: job_name.to_string(),
                    });
                }
            },
            None => polling.await?,
        };

        match job.state {
            JobState::Succeeded => Ok(job),
            JobState::Failed => {
                let detail = job
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no error detail reported".to_string());
                Err(PipelineError::JobFailed {
                    job: job.name,
                    detail,
                })
            }
            state => Err(PipelineError::JobNotSucceeded {
                job: job.name,
                state,
            }),
        }
    }

    async fn poll_until_terminal(
        &self,
        job_name: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchJob, PipelineError> {
        info!("Polling batch job: {job_name}");
        let mut job = self.backend.get_batch(job_name).await?;

        while !job.state.is_terminal() {
            info!(
                "Current state: {} - waiting {} seconds before next check...",
                job.state,
                self.poll_interval.as_secs()
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Stopped polling batch job {job_name}; the remote job keeps running");
                    return Err(PipelineError::Cancelled {
                        job: job_name.to_string(),
                    });
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            job = self.backend.get_batch(job_name).await?;
        }

        match job.update_time {
            Some(updated) => info!("Job finished with state: {} (at {updated})", job.state),
            None => info!("Job finished with state: {}", job.state),
        }
        Ok(job)
    }

    /// Inline replies of a succeeded job. A count that differs from the number of
    /// submitted requests is an error, never silently realigned.
    pub fn collect_replies(
        job: &BatchJob,
        expected: usize,
    ) -> Result<Vec<InlineReply>, PipelineError> {
        let replies = job.responses.clone().unwrap_or_default();
        if replies.len() != expected {
            return Err(PipelineError::ResponseCountMismatch {
                job: job.name.clone(),
                expected,
                actual: replies.len(),
            });
        }
        Ok(replies)
    }

    /// Submit, wait, collect.
    pub async fn run_batch(
        &self,
        display_name: &str,
        requests: &[GenerateRequest],
        cancel: &CancellationToken,
    ) -> Result<Vec<InlineReply>, PipelineError> {
        let job = self.submit_batch(display_name, requests).await?;
        let finished = self.wait_for_completion(&job.name, cancel).await?;
        Self::collect_replies(&finished, requests.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::{batch_job, ScriptedBackend};
    use crate::llm_client::batch::RpcStatus;
    use tokio::time::Instant;

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            prompt: prompt.to_string(),
            context: ContextAttachment::Inline("instruction".to_string()),
        }
    }

    fn invoker(backend: Arc<ScriptedBackend>) -> AnalysisInvoker {
        AnalysisInvoker::new(
            backend,
            RateLimiter::new(Duration::from_secs(4)),
            DEFAULT_POLL_INTERVAL,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_waits_for_rate_limit_before_first_call() {
        let backend = Arc::new(ScriptedBackend::replying("{}"));
        let invoker = invoker(backend.clone());

        let start = Instant::now();
        let reply = invoker.invoke(&request("payload")).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(4));
        assert_eq!(reply.as_deref(), Some("{}"));
        assert_eq!(backend.generate_calls(), vec![request("payload")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_invokes_are_spaced() {
        let backend = Arc::new(ScriptedBackend::replying("{}"));
        let invoker = invoker(backend.clone());

        let start = Instant::now();
        invoker.invoke(&request("a")).await.unwrap();
        invoker.invoke(&request("b")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(8));
        assert_eq!(backend.generate_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_surfaces_backend_error() {
        let backend = Arc::new(ScriptedBackend::failing_generate());
        let err = invoker(backend).invoke(&request("a")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Backend(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_without_text_is_none() {
        let backend = Arc::new(ScriptedBackend::default());
        let reply = invoker(backend).invoke(&request("a")).await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_every_interval_until_succeeded() {
        let backend = Arc::new(ScriptedBackend::with_polls(vec![
            batch_job(JobState::Pending, None),
            batch_job(JobState::Running, None),
            batch_job(JobState::Succeeded, Some(vec![InlineReply::Text("{}".to_string())])),
        ]));
        let invoker = invoker(backend.clone());

        let start = Instant::now();
        let job = invoker
            .wait_for_completion("batches/test", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(backend.polls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert!(start.elapsed() < Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_surfaces_error_payload() {
        let mut failed = batch_job(JobState::Failed, None);
        failed.error = Some(RpcStatus {
            code: Some(8),
            message: Some("quota exhausted".to_string()),
        });
        let backend = Arc::new(ScriptedBackend::with_polls(vec![failed]));

        let err = invoker(backend)
            .wait_for_completion("batches/test", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            PipelineError::JobFailed { detail, .. } => assert!(detail.contains("quota exhausted")),
            other => panic!("expected JobFailed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_and_expired_jobs_are_not_results() {
        for state in [JobState::Cancelled, JobState::Expired] {
            let backend = Arc::new(ScriptedBackend::with_polls(vec![batch_job(state, None)]));
            let err = invoker(backend)
                .wait_for_completion("batches/test", &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, PipelineError::JobNotSucceeded { state: s, .. } if s == state));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let backend = Arc::new(ScriptedBackend::with_polls(vec![batch_job(
            JobState::Pending,
            None,
        )]));
        let invoker = invoker(backend.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(45)).await;
            trigger.cancel();
        });

        let err = invoker
            .wait_for_completion("batches/test", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { .. }));
        assert_eq!(backend.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_bounds_polling() {
        let backend = Arc::new(ScriptedBackend::with_polls(vec![batch_job(
            JobState::Running,
            None,
        )]));
        let invoker = invoker(backend).with_max_wait(Some(Duration::from_secs(100)));

        let start = Instant::now();
        let err = invoker
            .wait_for_completion("batches/test", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { .. }));
        assert!(start.elapsed() >= Duration::from_secs(100));
        assert!(start.elapsed() < Duration::from_secs(130));
    }

    #[test]
    fn test_collect_replies_keeps_alignment() {
        let job = batch_job(
            JobState::Succeeded,
            Some(vec![
                InlineReply::Text("{}".to_string()),
                InlineReply::Missing,
                InlineReply::Empty,
            ]),
        );
        let replies = AnalysisInvoker::collect_replies(&job, 3).unwrap();
        assert_eq!(replies[1], InlineReply::Missing);
        assert_eq!(replies[2], InlineReply::Empty);
    }

    #[test]
    fn test_collect_replies_detects_count_mismatch() {
        let job = batch_job(JobState::Succeeded, Some(vec![InlineReply::Empty]));
        let err = AnalysisInvoker::collect_replies(&job, 2).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ResponseCountMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));

        let no_output = batch_job(JobState::Succeeded, None);
        assert!(AnalysisInvoker::collect_replies(&no_output, 1).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_batch_submits_then_collects() {
        let backend = Arc::new(ScriptedBackend::with_polls(vec![
            batch_job(JobState::Pending, None),
            batch_job(
                JobState::Succeeded,
                Some(vec![
                    InlineReply::Text("a".to_string()),
                    InlineReply::Text("b".to_string()),
                ]),
            ),
        ]));
        let requests = vec![request("one"), request("two")];

        let replies = invoker(backend.clone())
            .run_batch("analysis", &requests, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(backend.batch_calls(), requests);
        assert_eq!(
            replies,
            vec![InlineReply::Text("a".to_string()), InlineReply::Text("b".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_batch_submission_never_polls() {
        let backend = Arc::new(ScriptedBackend::failing_batch());
        let requests = vec![request("one")];

        let err = invoker(backend.clone())
            .run_batch("analysis", &requests, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Backend(_)));
        assert_eq!(backend.batch_calls(), requests);
        assert_eq!(backend.polls(), 0);
    }
}
