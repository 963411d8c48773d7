/// LLM Client: the single point of entry for all generative-language API calls in the tracer.
///
/// ARCHITECTURAL RULE: No other module may call the backend over HTTP directly.
/// Everything goes through the `AnalysisBackend` trait, implemented here by `LlmClient`.
///
/// Model: gemini-2.5-flash (hardcoded, not configurable)
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod batch;
pub mod prompts;
pub mod rate_limit;

use batch::{BatchJob, BatchOperation};

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// The model used for all analysis calls.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Backend response is missing '{0}'")]
    MissingField(&'static str),
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types shared by generate, cache and batch endpoints
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Content {
    fn user(text: &str) -> Self {
        Self {
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
            role: Some("user".to_string()),
        }
    }

    fn system(text: &str) -> Self {
        Self {
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
            role: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_token_count: Option<u32>,
    pub candidates_token_count: Option<u32>,
    pub cached_content_token_count: Option<u32>,
}

/// A `generateContent` reply. Also embedded in every inline batch response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<UsageMetadata>,
}

impl GenerateResponse {
    /// Concatenates the text parts of the first candidate.
    /// Returns `None` when the candidate carries no text part at all.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let texts: Vec<&str> = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }

    /// Why the first candidate stopped, e.g. `STOP` or `SAFETY`.
    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates.first()?.finish_reason.as_deref()
    }
}

/// How the static analysis context travels with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextAttachment {
    /// Backend-registered context, referenced by its cache name.
    Cached(String),
    /// Full system instruction re-sent with the request.
    Inline(String),
}

/// One unit of work for the backend: the user prompt plus its context.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub context: ContextAttachment,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentBody {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached_content: Option<String>,
}

impl From<&GenerateRequest> for GenerateContentBody {
    fn from(request: &GenerateRequest) -> Self {
        let (system_instruction, cached_content) = match &request.context {
            ContextAttachment::Cached(name) => (None, Some(name.clone())),
            ContextAttachment::Inline(text) => (Some(Content::system(text)), None),
        };
        Self {
            contents: vec![Content::user(&request.prompt)],
            system_instruction,
            cached_content,
        }
    }
}

/// A registered, reusable context on the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHandle {
    pub name: String,
    pub expire_time: Option<DateTime<Utc>>,
}

impl CacheHandle {
    /// A handle without a reported expiry is treated as live for the process lifetime.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_time.map_or(true, |expiry| now < expiry)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCachedContentBody<'a> {
    model: String,
    display_name: &'a str,
    system_instruction: Content,
    ttl: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedContentResponse {
    name: Option<String>,
    expire_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Backend trait
// ────────────────────────────────────────────────────────────────────────────

/// The remote analysis backend. Implement this to swap transports without touching
/// the pipeline; tests drive the pipeline through a scripted implementation.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Registers a system instruction as a reusable cached context.
    async fn register_context(
        &self,
        display_name: &str,
        system_instruction: &str,
        ttl: Duration,
    ) -> Result<CacheHandle, LlmError>;

    /// One blocking generate call.
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError>;

    /// Submits an inline batch job; returns immediately with the job handle.
    async fn create_batch(
        &self,
        display_name: &str,
        requests: &[GenerateRequest],
    ) -> Result<BatchJob, LlmError>;

    /// Reads the current state of a batch job.
    async fn get_batch(&self, name: &str) -> Result<BatchJob, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ────────────────────────────────────────────────────────────────────────────

/// The single HTTP client used by the pipeline.
/// No per-request timeout is set; the backend enforces its own.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().build()?,
            api_key,
            base_url: API_BASE_URL.to_string(),
        })
    }

    fn model_path() -> String {
        format!("models/{MODEL}")
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<T, LlmError> {
        let mut request = self
            .client
            .request(method, url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl AnalysisBackend for LlmClient {
    async fn register_context(
        &self,
        display_name: &str,
        system_instruction: &str,
        ttl: Duration,
    ) -> Result<CacheHandle, LlmError> {
        let body = CreateCachedContentBody {
            model: Self::model_path(),
            display_name,
            system_instruction: Content::system(system_instruction),
            ttl: format!("{}s", ttl.as_secs()),
        };
        let url = format!("{}/cachedContents", self.base_url);
        let created: CachedContentResponse = self.send(Method::POST, &url, Some(&body)).await?;

        let name = created.name.ok_or(LlmError::MissingField("name"))?;
        debug!("Registered cached context {name}");
        Ok(CacheHandle {
            name,
            expire_time: created.expire_time,
        })
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let body = GenerateContentBody::from(request);
        let url = format!("{}/{}:generateContent", self.base_url, Self::model_path());
        let response: GenerateResponse = self.send(Method::POST, &url, Some(&body)).await?;

        if let Some(usage) = &response.usage_metadata {
            debug!(
                "LLM call succeeded: prompt_tokens={:?}, cached_tokens={:?}, output_tokens={:?}",
                usage.prompt_token_count,
                usage.cached_content_token_count,
                usage.candidates_token_count
            );
        }
        Ok(response)
    }

    async fn create_batch(
        &self,
        display_name: &str,
        requests: &[GenerateRequest],
    ) -> Result<BatchJob, LlmError> {
        let body = batch::CreateBatchBody::new(display_name, requests);
        let url = format!(
            "{}/{}:batchGenerateContent",
            self.base_url,
            Self::model_path()
        );
        let operation: BatchOperation = self.send(Method::POST, &url, Some(&body)).await?;
        BatchJob::try_from(operation)
    }

    async fn get_batch(&self, name: &str) -> Result<BatchJob, LlmError> {
        let url = format!("{}/{}", self.base_url, name);
        let operation: BatchOperation = self.send::<(), _>(Method::GET, &url, None).await?;
        BatchJob::try_from(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_response_text_concatenates_parts() {
        let json = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "{\"a\":"}, {"text": " 1}"}], "role": "model"},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 4}
        }"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text().as_deref(), Some("{\"a\": 1}"));
        assert_eq!(
            response.usage_metadata.unwrap().prompt_token_count,
            Some(10)
        );
    }

    #[test]
    fn test_response_text_none_without_candidates() {
        let response: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(response.text().is_none());
    }

    #[test]
    fn test_blocked_response_reports_finish_reason() {
        let json = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();
        assert!(response.text().is_none());
        assert_eq!(response.finish_reason(), Some("SAFETY"));
        assert_eq!(GenerateResponse::default().finish_reason(), None);
    }

    #[test]
    fn test_response_text_empty_string_is_kept() {
        let json = r#"{"candidates": [{"content": {"parts": [{"text": ""}]}}]}"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text().as_deref(), Some(""));
    }

    #[test]
    fn test_cached_request_body_references_cache_name() {
        let request = GenerateRequest {
            prompt: "Submissions".to_string(),
            context: ContextAttachment::Cached("cachedContents/abc".to_string()),
        };
        let body = serde_json::to_value(GenerateContentBody::from(&request)).unwrap();
        assert_eq!(body["cachedContent"], "cachedContents/abc");
        assert!(body.get("systemInstruction").is_none());
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Submissions");
    }

    #[test]
    fn test_inline_request_body_carries_system_instruction() {
        let request = GenerateRequest {
            prompt: "Submissions".to_string(),
            context: ContextAttachment::Inline("You are a reviewer".to_string()),
        };
        let body = serde_json::to_value(GenerateContentBody::from(&request)).unwrap();
        assert!(body.get("cachedContent").is_none());
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are a reviewer"
        );
    }

    #[test]
    fn test_cache_handle_liveness() {
        let expiry = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let handle = CacheHandle {
            name: "cachedContents/x".to_string(),
            expire_time: Some(expiry),
        };
        assert!(handle.is_live_at(expiry - chrono::Duration::seconds(1)));
        assert!(!handle.is_live_at(expiry));

        let forever = CacheHandle {
            name: "cachedContents/y".to_string(),
            expire_time: None,
        };
        assert!(forever.is_live_at(expiry));
    }

    #[test]
    fn test_cached_content_response_parses_expiry() {
        let json = r#"{"name": "cachedContents/abc", "expireTime": "2026-10-19T10:00:00Z"}"#;
        let parsed: CachedContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.name.as_deref(), Some("cachedContents/abc"));
        assert!(parsed.expire_time.is_some());
    }
}
