//! The turn controller — one consultation round trip.
//!
//! Each submission moves through:
//!
//! ```text
//! IDLE → RECORDING_USER → BUILDING_PROMPT → AWAITING_MODEL → RECORDING_ASSISTANT → DONE
//!                                             │
//!                                             └─ on inference error → REPORTED_ERROR → DONE
//! ```
//!
//! The user turn is durable before the model is called, the model is called
//! exactly once, and neither the model call nor the assistant write is ever
//! retried. A failed assistant write still hands the reply back so the
//! caller can display it.

use crate::prompt;
use crate::session::SessionState;
use chrono::Utc;
use lexchamber_config::AppConfig;
use lexchamber_core::consultation::{ChamberId, Role};
use lexchamber_core::error::{InferenceError, StoreError};
use lexchamber_core::event::{DomainEvent, EventBus};
use lexchamber_core::inference::InferenceGateway;
use lexchamber_core::store::ConsultationStore;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where a submission currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    RecordingUser,
    BuildingPrompt,
    AwaitingModel,
    RecordingAssistant,
    ReportedError,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::RecordingUser => "recording_user",
            Phase::BuildingPrompt => "building_prompt",
            Phase::AwaitingModel => "awaiting_model",
            Phase::RecordingAssistant => "recording_assistant",
            Phase::ReportedError => "reported_error",
            Phase::Done => "done",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submission that produced a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Both turns are stored.
    Answered {
        user_seq: i64,
        assistant_seq: i64,
        reply: String,
    },

    /// The reply could not be stored. It is shown for this render only and
    /// is gone on reload.
    ReplyNotRecorded {
        user_seq: i64,
        reply: String,
        error: StoreError,
    },
}

impl SubmissionOutcome {
    pub fn reply(&self) -> &str {
        match self {
            Self::Answered { reply, .. } | Self::ReplyNotRecorded { reply, .. } => reply,
        }
    }

    pub fn user_seq(&self) -> i64 {
        match self {
            Self::Answered { user_seq, .. } | Self::ReplyNotRecorded { user_seq, .. } => *user_seq,
        }
    }
}

/// A submission that produced no reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("not signed in")]
    NotSignedIn,

    #[error("no chamber selected")]
    NoChamberSelected,

    #[error("nothing to submit")]
    NoPendingInput,

    #[error("a submission is already in progress")]
    Busy,

    /// Nothing was written and the model was not called.
    #[error("user turn not recorded: {0}")]
    UserTurnNotRecorded(StoreError),

    /// The user turn (`user_seq`) is stored; no assistant turn exists.
    #[error("Inference Engine Error: {error}")]
    Inference { user_seq: i64, error: InferenceError },
}

impl SubmissionError {
    /// Text safe to show the user. Never carries store internals or secrets.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotSignedIn => "Please sign in to continue.".into(),
            Self::NoChamberSelected => "Select or create a chamber first.".into(),
            Self::NoPendingInput => "Type a question to submit.".into(),
            Self::Busy => "Please wait for the current answer.".into(),
            Self::UserTurnNotRecorded(StoreError::NotAuthenticated(_)) => {
                "Your session has expired. Please sign in again.".into()
            }
            Self::UserTurnNotRecorded(StoreError::UnknownChamber { .. }) => {
                "This chamber is missing. Select or create another chamber.".into()
            }
            Self::UserTurnNotRecorded(_) => {
                "Your question could not be saved. Please try again.".into()
            }
            Self::Inference { error, .. } => format!("Inference Engine Error: {error}"),
        }
    }
}

/// Orchestrates one submission against the store and the inference gateway.
pub struct TurnController {
    store: Arc<dyn ConsultationStore>,
    gateway: Arc<dyn InferenceGateway>,
    events: Arc<EventBus>,
    default_persona: String,
    default_language: String,
    /// Prior turns fed back into the prompt; 0 keeps prompting history-less
    history_turns: usize,
}

impl TurnController {
    pub fn new(
        store: Arc<dyn ConsultationStore>,
        gateway: Arc<dyn InferenceGateway>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            gateway,
            events,
            default_persona: prompt::DEFAULT_PERSONA.into(),
            default_language: prompt::DEFAULT_LANGUAGE.into(),
            history_turns: 0,
        }
    }

    /// Create a controller using the configured defaults.
    pub fn from_config(
        store: Arc<dyn ConsultationStore>,
        gateway: Arc<dyn InferenceGateway>,
        events: Arc<EventBus>,
        config: &AppConfig,
    ) -> Self {
        Self::new(store, gateway, events)
            .with_defaults(&config.default_persona, &config.default_language)
            .with_history_turns(config.history_turns)
    }

    pub fn with_defaults(mut self, persona: impl Into<String>, language: impl Into<String>) -> Self {
        self.default_persona = persona.into();
        self.default_language = language.into();
        self
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Run the pending input of `session` through [`Self::handle_submission`].
    ///
    /// The pending input is consumed on entry and the input control stays
    /// locked until the submission finishes.
    pub async fn handle_pending(
        &self,
        session: &mut SessionState,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let submission = session.begin_submission()?;
        let result = self
            .handle_submission(&submission.email, submission.chamber_id, &submission.utterance)
            .await;
        session.finish_submission(submission.chamber_id, &result);
        result
    }

    /// Record `utterance`, ask the model, and record the reply.
    pub async fn handle_submission(
        &self,
        email: &str,
        chamber_id: ChamberId,
        utterance: &str,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let mut phase = Phase::Idle;
        debug!(chamber_id = chamber_id.0, %phase, "Submission received");

        // Preferences are read before anything is written, so a chamber that
        // vanished aborts cleanly.
        let chamber = self
            .store
            .get_chamber(email, chamber_id)
            .await
            .map_err(|e| self.abort(chamber_id, e))?;

        phase = Phase::RecordingUser;
        debug!(chamber_id = chamber_id.0, %phase);
        let user_seq = self
            .store
            .append_turn(email, chamber_id, Role::User, utterance)
            .await
            .map_err(|e| self.abort(chamber_id, e))?;
        self.publish_turn(email, chamber_id, user_seq, Role::User);

        phase = Phase::BuildingPrompt;
        debug!(chamber_id = chamber_id.0, %phase, user_seq);
        let persona = chamber.persona.as_deref().unwrap_or(&self.default_persona);
        let language = chamber.language.as_deref().unwrap_or(&self.default_language);
        let history = self.history(email, chamber_id, user_seq).await;
        let instruction = prompt::assemble(persona, language, utterance, history.as_deref());

        phase = Phase::AwaitingModel;
        debug!(
            chamber_id = chamber_id.0,
            %phase,
            provider = %self.gateway.name(),
            chars = instruction.len()
        );
        let reply = match self.gateway.invoke(&instruction).await {
            Ok(reply) => reply,
            Err(error) => {
                phase = Phase::ReportedError;
                if error.is_operator_actionable() {
                    error!(
                        chamber_id = chamber_id.0,
                        %phase,
                        kind = error.kind(),
                        operator_actionable = true,
                        "Inference failed: {error}"
                    );
                } else {
                    warn!(
                        chamber_id = chamber_id.0,
                        %phase,
                        kind = error.kind(),
                        "Inference failed: {error}"
                    );
                }
                self.events.publish(DomainEvent::InferenceFailed {
                    email: email.to_string(),
                    chamber_id,
                    kind: error.kind().to_string(),
                    operator_actionable: error.is_operator_actionable(),
                    timestamp: Utc::now(),
                });
                self.publish_changed(email, chamber_id);
                return Err(SubmissionError::Inference { user_seq, error });
            }
        };

        phase = Phase::RecordingAssistant;
        debug!(chamber_id = chamber_id.0, %phase);
        let outcome = match self
            .store
            .append_turn(email, chamber_id, Role::Assistant, &reply)
            .await
        {
            Ok(assistant_seq) => {
                self.publish_turn(email, chamber_id, assistant_seq, Role::Assistant);
                SubmissionOutcome::Answered {
                    user_seq,
                    assistant_seq,
                    reply,
                }
            }
            Err(error) => {
                error!(
                    chamber_id = chamber_id.0,
                    %phase,
                    user_seq,
                    "Assistant reply lost, not recorded: {error}"
                );
                SubmissionOutcome::ReplyNotRecorded {
                    user_seq,
                    reply,
                    error,
                }
            }
        };

        phase = Phase::Done;
        self.publish_changed(email, chamber_id);
        info!(chamber_id = chamber_id.0, %phase, user_seq, "Submission complete");
        Ok(outcome)
    }

    async fn history(
        &self,
        email: &str,
        chamber_id: ChamberId,
        user_seq: i64,
    ) -> Option<Vec<lexchamber_core::consultation::Turn>> {
        if self.history_turns == 0 {
            return None;
        }
        match self.store.read_turns(email, chamber_id).await {
            Ok(turns) => {
                Some(prompt::history_window(&turns, user_seq, self.history_turns).to_vec())
            }
            Err(e) => {
                warn!(chamber_id = chamber_id.0, "History unavailable, prompting without it: {e}");
                None
            }
        }
    }

    fn abort(&self, chamber_id: ChamberId, error: StoreError) -> SubmissionError {
        warn!(
            chamber_id = chamber_id.0,
            phase = %Phase::RecordingUser,
            "Submission aborted before inference: {error}"
        );
        SubmissionError::UserTurnNotRecorded(error)
    }

    fn publish_turn(&self, email: &str, chamber_id: ChamberId, seq: i64, role: Role) {
        self.events.publish(DomainEvent::TurnRecorded {
            email: email.to_string(),
            chamber_id,
            seq,
            role,
            timestamp: Utc::now(),
        });
    }

    fn publish_changed(&self, email: &str, chamber_id: ChamberId) {
        self.events.publish(DomainEvent::TranscriptChanged {
            email: email.to_string(),
            chamber_id,
            timestamp: Utc::now(),
        });
    }
}
