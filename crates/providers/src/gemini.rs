//! Google Gemini provider.
//!
//! Uses the `generateContent` REST endpoint:
//! - `x-goog-api-key` header authentication (never a query parameter)
//! - the instruction is sent as the sole `user` content part
//! - the reply is the concatenated text parts of the first candidate

use crate::classify::{classify_status, classify_transport, scrub};
use async_trait::async_trait;
use lexchamber_core::error::InferenceError;
use lexchamber_core::inference::InferenceGateway;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Per-request transport timeout. The wall-clock deadline seen by users is
/// enforced by [`crate::DeadlineGateway`].
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.3,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, instruction: &str) -> serde_json::Value {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": instruction }],
            }],
            "generationConfig": {
                "temperature": self.temperature,
            },
        })
    }
}

/// Reduce a `generateContent` response to its reply text.
fn reply_text(response: GenerateContentResponse) -> Result<String, InferenceError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".into());
        return Err(InferenceError::InvalidRequest(format!(
            "prompt rejected by provider: {reason}"
        )));
    };

    match candidate.content {
        Some(content) => Ok(content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<String>()),
        None => Err(InferenceError::InvalidRequest(format!(
            "candidate has no content (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ))),
    }
}

#[async_trait]
impl InferenceGateway for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn invoke(&self, instruction: &str) -> Result<String, InferenceError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let timeout_secs = self.request_timeout.as_secs();

        debug!(
            provider = "gemini",
            model = %self.model,
            chars = instruction.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.request_timeout)
            .json(&self.request_body(instruction))
            .send()
            .await
            .map_err(|e| scrub(classify_transport(&e, timeout_secs), &self.api_key))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = scrub(classify_status(status, &body, timeout_secs), &self.api_key);
            warn!(provider = "gemini", status, kind = error.kind(), "Provider returned error");
            return Err(error);
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            InferenceError::TransientProvider(format!("unreadable provider response: {e}"))
        })?;

        reply_text(parsed)
    }

    async fn health_check(&self) -> Result<bool, InferenceError> {
        let url = format!("{}/models/{}", self.base_url, self.model);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| scrub(classify_transport(&e, DEFAULT_REQUEST_TIMEOUT.as_secs()), &self.api_key))?;

        Ok(response.status().is_success())
    }
}

// --- Gemini API wire types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}
