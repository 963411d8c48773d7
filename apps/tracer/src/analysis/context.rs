//! Context Cache: the large, static part of every analysis request.
//!
//! `AnalysisContext` renders the system instruction (mode template + curriculum
//! taxonomy + focus problem descriptions). `AnalysisSession` owns that context for
//! the life of the process and, when possible, registers it with the backend once
//! so later calls reference it by handle instead of re-sending it.
//!
//! Registration failure never fails the run: the session degrades to sending the
//! instruction inline on every call.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::analysis::mode::AnalysisMode;
use crate::dataset::models::{CurriculumTopic, ProblemDescriptions, SubmissionRecord};
use crate::llm_client::prompts::{FREQUENCY_THRESHOLDS, JSON_ONLY_INSTRUCTION};
use crate::llm_client::{AnalysisBackend, CacheHandle, ContextAttachment};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Rough token count used for logging payload size (about 4 characters per token).
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

/// Restricts the problem map to the problems that appear in `submissions`.
pub fn focus_problems(
    problems: &ProblemDescriptions,
    submissions: &[SubmissionRecord],
) -> ProblemDescriptions {
    let wanted: BTreeSet<&str> = submissions.iter().map(|s| s.problem_id.as_str()).collect();
    problems
        .iter()
        .filter(|(id, _)| wanted.contains(id.as_str()))
        .map(|(id, text)| (id.clone(), text.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisContext {
    mode: AnalysisMode,
    instruction: String,
}

impl AnalysisContext {
    pub fn build(
        mode: AnalysisMode,
        curriculum: &[CurriculumTopic],
        problems: &ProblemDescriptions,
    ) -> Result<Self, serde_json::Error> {
        let curriculum_json = serde_json::to_string_pretty(curriculum)?;
        let problems_json = serde_json::to_string_pretty(problems)?;

        let instruction = mode
            .template()
            .replace("{curriculum_json}", &curriculum_json)
            .replace("{problems_json}", &problems_json)
            .replace("{frequency_thresholds}", FREQUENCY_THRESHOLDS)
            .replace("{json_only}", JSON_ONLY_INSTRUCTION);

        Ok(Self { mode, instruction })
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }
}

#[derive(Debug, Clone, PartialEq)]
enum CacheState {
    /// Not registered yet; registration will be attempted.
    Pending,
    Registered(CacheHandle),
    /// Registration failed or was disabled; always send inline.
    Inline,
}

/// Process-lifetime owner of the analysis context and its backend handle.
pub struct AnalysisSession {
    backend: Arc<dyn AnalysisBackend>,
    context: AnalysisContext,
    ttl: Duration,
    state: CacheState,
}

impl AnalysisSession {
    pub fn new(backend: Arc<dyn AnalysisBackend>, context: AnalysisContext, ttl: Duration) -> Self {
        Self {
            backend,
            context,
            ttl,
            state: CacheState::Pending,
        }
    }

    /// A session that never registers and always sends the instruction inline.
    pub fn inline_only(backend: Arc<dyn AnalysisBackend>, context: AnalysisContext) -> Self {
        Self {
            backend,
            context,
            ttl: DEFAULT_CACHE_TTL,
            state: CacheState::Inline,
        }
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.context
    }

    pub fn handle(&self) -> Option<&CacheHandle> {
        match &self.state {
            CacheState::Registered(handle) => Some(handle),
            _ => None,
        }
    }

    /// Registers the context unless a live handle exists or registration already
    /// failed. An expired handle is replaced.
    pub async fn ensure_registered(&mut self) {
        match &self.state {
            CacheState::Inline => return,
            CacheState::Registered(handle) if handle.is_live_at(Utc::now()) => return,
            CacheState::Registered(handle) => {
                info!("Cached context {} expired, registering again", handle.name)
            }
            CacheState::Pending => {}
        }

        let display_name = format!("knowledge-tracer-{}", self.context.mode());
        match self
            .backend
            .register_context(&display_name, self.context.instruction(), self.ttl)
            .await
        {
            Ok(handle) => {
                info!(
                    "Registered analysis context {} (~{} tokens)",
                    handle.name,
                    estimate_tokens(self.context.instruction())
                );
                self.state = CacheState::Registered(handle);
            }
            Err(e) => {
                warn!("Context registration failed, sending instruction inline instead: {e}");
                self.state = CacheState::Inline;
            }
        }
    }

    /// How the context should travel with the next request.
    pub fn attachment(&self) -> ContextAttachment {
        match &self.state {
            CacheState::Registered(handle) if handle.is_live_at(Utc::now()) => {
                ContextAttachment::Cached(handle.name.clone())
            }
            _ => ContextAttachment::Inline(self.context.instruction().to_string()),
        }
    }

    /// Drops the handle so the next `ensure_registered` registers again.
    /// Use when the curriculum or problem set changes mid-process.
    // Reserved for long-running callers that reload reference data
    #[allow(dead_code)]
    pub fn invalidate(&mut self, context: AnalysisContext) {
        self.context = context;
        self.state = CacheState::Pending;
    }
}
