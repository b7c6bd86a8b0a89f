//! InferenceGateway trait — the indirection over the external LLM provider.
//!
//! The gateway takes the fully assembled instruction text and returns the
//! model's reply verbatim. It is stateless across calls and shared behind
//! an `Arc` by every concurrent submission.
//!
//! Implementations: Gemini, OpenAI-compatible endpoints, and a deadline
//! wrapper that bounds any of them.

use async_trait::async_trait;

use crate::error::InferenceError;

/// The core inference trait.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// A human-readable name for this gateway (e.g., "gemini").
    fn name(&self) -> &str;

    /// Submit one instruction and return the response body as plain text.
    ///
    /// Called exactly once per submission; implementations must not retry.
    async fn invoke(&self, instruction: &str) -> Result<String, InferenceError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> Result<bool, InferenceError> {
        Ok(true)
    }
}
