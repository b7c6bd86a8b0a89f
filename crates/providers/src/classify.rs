//! Translation of HTTP outcomes into the bounded [`InferenceError`] set.

use lexchamber_core::error::InferenceError;
use serde::Deserialize;

/// Longest provider message carried into an error detail.
const MAX_DETAIL_CHARS: usize = 300;

/// `{"error": {"message": "..."}}`, the envelope used by both Gemini and
/// OpenAI-style endpoints.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map a non-success status and its body to an error kind. `after_secs` is
/// the request deadline, reported when the provider itself timed out.
pub(crate) fn classify_status(status: u16, body: &str, after_secs: u64) -> InferenceError {
    let detail = format!("HTTP {status}: {}", provider_message(body));
    match status {
        401 | 403 => InferenceError::AuthFailure(detail),
        408 => InferenceError::Timeout { after_secs },
        429 => InferenceError::TransientProvider(detail),
        500..=599 => InferenceError::TransientProvider(detail),
        _ => InferenceError::InvalidRequest(detail),
    }
}

/// Map a transport failure (connect, TLS, read) to an error kind.
pub(crate) fn classify_transport(err: &reqwest::Error, after_secs: u64) -> InferenceError {
    if err.is_timeout() {
        InferenceError::Timeout { after_secs }
    } else if err.is_connect() {
        InferenceError::TransientProvider(format!("could not reach provider: {}", without_url(err)))
    } else {
        InferenceError::TransientProvider(without_url(err))
    }
}

/// Remove every occurrence of `secret` from the error detail.
pub(crate) fn scrub(error: InferenceError, secret: &str) -> InferenceError {
    if secret.is_empty() {
        return error;
    }
    let clean = |s: String| s.replace(secret, "[REDACTED]");
    match error {
        InferenceError::TransientProvider(d) => InferenceError::TransientProvider(clean(d)),
        InferenceError::InvalidRequest(d) => InferenceError::InvalidRequest(clean(d)),
        InferenceError::AuthFailure(d) => InferenceError::AuthFailure(clean(d)),
        timeout @ InferenceError::Timeout { .. } => timeout,
    }
}

fn provider_message(body: &str) -> String {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    if message.is_empty() {
        return "(empty body)".into();
    }
    truncate(&message, MAX_DETAIL_CHARS)
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

// Request URLs may carry query-string keys on some proxies.
fn without_url(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    if let Some(url) = err.url() {
        message = message.replace(url.as_str(), "<provider>");
    }
    message
}
