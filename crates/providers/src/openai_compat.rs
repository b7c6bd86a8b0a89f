//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! `/chat/completions`. The instruction is sent as the sole `user` message.

use crate::classify::{classify_status, classify_transport, scrub};
use async_trait::async_trait;
use lexchamber_core::error::InferenceError;
use lexchamber_core::inference::InferenceGateway;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// An OpenAI-compatible chat completions provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.3,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key, model)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[async_trait]
impl InferenceGateway for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, instruction: &str) -> Result<String, InferenceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let timeout_secs = self.request_timeout.as_secs();

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": instruction }],
            "temperature": self.temperature,
            "stream": false,
        });

        debug!(provider = %self.name, model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| scrub(classify_transport(&e, timeout_secs), &self.api_key))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error = scrub(classify_status(status, &error_body, timeout_secs), &self.api_key);
            warn!(provider = %self.name, status, kind = error.kind(), "Provider returned error");
            return Err(error);
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            InferenceError::TransientProvider(format!("unreadable provider response: {e}"))
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::InvalidRequest("no choices in response".into()))?;

        Ok(choice.message.content.unwrap_or_default())
    }

    async fn health_check(&self) -> Result<bool, InferenceError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| scrub(classify_transport(&e, DEFAULT_REQUEST_TIMEOUT.as_secs()), &self.api_key))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API wire types ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn openai_constructor() {
        let provider = OpenAiCompatProvider::openai("sk-test", "gpt-4o-mini");
        assert_eq!(provider.name(), "openai");
        assert!(provider.base_url.contains("api.openai.com"));
    }

    #[test]
    fn parse_response() {
        let data = r#"{"choices":[{"message":{"role":"assistant","content":"Hello"}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn invoke_sends_single_user_message() {
        let app = Router::new().route(
            "/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer sk-test");
                let messages = body["messages"].as_array().cloned().unwrap_or_default();
                if !authorized || messages.len() != 1 || messages[0]["role"] != "user" {
                    return (StatusCode::BAD_REQUEST, Json(serde_json::json!({})));
                }
                (
                    StatusCode::OK,
                    Json(serde_json::json!({
                        "choices": [{ "message": { "role": "assistant", "content": "Negligence is…" } }]
                    })),
                )
            }),
        );
        let base = serve(app).await;

        let provider = OpenAiCompatProvider::new("local", &base, "sk-test", "m");
        assert_eq!(provider.invoke("Define negligence.").await.unwrap(), "Negligence is…");
    }

    #[tokio::test]
    async fn empty_choices_is_invalid_request() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { Json(serde_json::json!({ "choices": [] })) }),
        );
        let base = serve(app).await;

        let provider = OpenAiCompatProvider::new("local", &base, "k", "m");
        assert!(matches!(
            provider.invoke("q").await,
            Err(InferenceError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn unauthorized_is_auth_failure() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base = serve(app).await;

        let provider = OpenAiCompatProvider::new("local", &base, "k", "m");
        let err = provider.invoke("q").await.unwrap_err();
        assert!(err.is_operator_actionable());
        assert_eq!(err.kind(), "auth_failure");
    }
}
