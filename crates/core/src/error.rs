//! Error types for the LexChamber domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] unifies them.

use thiserror::Error;

/// The top-level error type for all LexChamber operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Inference errors ---
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures raised by the persistence store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The email has no user record; the caller must re-run identity hand-off.
    #[error("Not authenticated: no user record for {0}")]
    NotAuthenticated(String),

    /// The chamber does not exist or is owned by someone else.
    #[error("Unknown chamber: {chamber_id}")]
    UnknownChamber { chamber_id: i64 },

    #[error("Store write failed: {0}")]
    WriteFailed(String),

    #[error("Store read failed: {0}")]
    ReadFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// The bounded set of failures the inference gateway may report.
///
/// Provider-specific failures are translated into one of these before they
/// leave the gateway. Detail strings never carry credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    /// Network failure, 5xx, or rate limiting. The user may resubmit.
    #[error("provider temporarily unavailable: {0}")]
    TransientProvider(String),

    /// The provider rejected the request (4xx other than auth).
    #[error("request rejected by provider: {0}")]
    InvalidRequest(String),

    #[error("provider authentication failed: {0}")]
    AuthFailure(String),

    #[error("no response within {after_secs}s")]
    Timeout { after_secs: u64 },
}

impl InferenceError {
    /// Whether an operator has to act (bad key, malformed request) as
    /// opposed to a failure the user can simply retry.
    pub fn is_operator_actionable(&self) -> bool {
        matches!(self, Self::AuthFailure(_) | Self::InvalidRequest(_))
    }

    /// Short machine-readable kind, used in logs and API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientProvider(_) => "transient_provider",
            Self::InvalidRequest(_) => "invalid_request",
            Self::AuthFailure(_) => "auth_failure",
            Self::Timeout { .. } => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_displays_chamber() {
        let err = Error::Store(StoreError::UnknownChamber { chamber_id: 42 });
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn inference_error_operator_actionable() {
        assert!(InferenceError::AuthFailure("bad key".into()).is_operator_actionable());
        assert!(InferenceError::InvalidRequest("400".into()).is_operator_actionable());
        assert!(!InferenceError::TransientProvider("503".into()).is_operator_actionable());
        assert!(!InferenceError::Timeout { after_secs: 60 }.is_operator_actionable());
    }

    #[test]
    fn timeout_displays_deadline() {
        let err = InferenceError::Timeout { after_secs: 60 };
        assert_eq!(err.to_string(), "no response within 60s");
        assert_eq!(err.kind(), "timeout");
    }
}
