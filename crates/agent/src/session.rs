//! Per-tab session state.
//!
//! A `SessionState` holds only keys into the store (email, chamber id) plus
//! ephemeral UI state. It never holds credentials and is discarded with the
//! tab.

use crate::controller::{SubmissionError, SubmissionOutcome};
use lexchamber_core::consultation::{ChamberId, Turn, UserRecord};
use lexchamber_core::error::StoreError;
use lexchamber_core::store::ConsultationStore;
use tracing::debug;

/// A reply that was shown but could not be stored. Displayed for one render
/// pass, then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientReply {
    pub chamber_id: ChamberId,
    pub content: String,
}

/// The submission taken from a session by [`SessionState::begin_submission`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    pub email: String,
    pub chamber_id: ChamberId,
    pub utterance: String,
}

#[derive(Debug, Clone)]
struct TranscriptCache {
    chamber_id: ChamberId,
    turns: Vec<Turn>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    user_email: Option<String>,
    current_chamber: Option<ChamberId>,
    pending_input: Option<String>,
    transcript_cache: Option<TranscriptCache>,
    /// Input control lock while a submission is in flight
    busy: bool,
    transient_reply: Option<TransientReply>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the tab to an authenticated email. Any previous state is dropped.
    pub fn sign_in(&mut self, email: impl Into<String>) {
        *self = Self {
            user_email: Some(email.into()),
            ..Self::default()
        };
    }

    pub fn sign_out(&mut self) {
        *self = Self::default();
    }

    pub fn user_email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    pub fn current_chamber(&self) -> Option<ChamberId> {
        self.current_chamber
    }

    /// Select a chamber. Ownership is checked by the chamber manager.
    pub fn select_chamber(&mut self, chamber_id: ChamberId) {
        if self.current_chamber != Some(chamber_id) {
            self.invalidate_transcript();
        }
        self.current_chamber = Some(chamber_id);
    }

    pub fn clear_chamber(&mut self) {
        self.current_chamber = None;
        self.invalidate_transcript();
    }

    /// Capture an utterance from the input control. Returns `false` when the
    /// control is locked or the text is blank.
    pub fn capture_input(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if self.busy || text.trim().is_empty() {
            return false;
        }
        self.pending_input = Some(text);
        true
    }

    pub fn pending_input(&self) -> Option<&str> {
        self.pending_input.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Consume the pending input and lock the input control.
    ///
    /// The input is taken before any other check, so re-running the caller
    /// can never submit the same utterance twice.
    pub fn begin_submission(&mut self) -> Result<PendingSubmission, SubmissionError> {
        let email = self
            .user_email
            .clone()
            .ok_or(SubmissionError::NotSignedIn)?;
        let utterance = self
            .pending_input
            .take()
            .ok_or(SubmissionError::NoPendingInput)?;
        if self.busy {
            return Err(SubmissionError::Busy);
        }
        let chamber_id = self
            .current_chamber
            .ok_or(SubmissionError::NoChamberSelected)?;

        self.busy = true;
        Ok(PendingSubmission {
            email,
            chamber_id,
            utterance,
        })
    }

    /// Release the input lock and apply the submission's effect on this tab.
    pub fn finish_submission(
        &mut self,
        chamber_id: ChamberId,
        result: &Result<SubmissionOutcome, SubmissionError>,
    ) {
        self.busy = false;
        self.invalidate_transcript();

        match result {
            Ok(SubmissionOutcome::ReplyNotRecorded { reply, .. }) => {
                self.transient_reply = Some(TransientReply {
                    chamber_id,
                    content: reply.clone(),
                });
            }
            Err(SubmissionError::UserTurnNotRecorded(StoreError::UnknownChamber { .. })) => {
                if self.current_chamber == Some(chamber_id) {
                    self.current_chamber = None;
                }
            }
            Err(SubmissionError::UserTurnNotRecorded(StoreError::NotAuthenticated(_))) => {
                self.sign_out();
            }
            _ => {}
        }
    }

    /// Take the one-shot transient reply. Cleared whether or not it matches
    /// the chamber being rendered.
    pub fn take_transient_reply(&mut self) -> Option<TransientReply> {
        self.transient_reply.take()
    }

    /// Cached turns for `chamber_id`, if fresh.
    pub fn cached_turns(&self, chamber_id: ChamberId) -> Option<&[Turn]> {
        self.transcript_cache
            .as_ref()
            .filter(|c| c.chamber_id == chamber_id)
            .map(|c| c.turns.as_slice())
    }

    pub fn cache_turns(&mut self, chamber_id: ChamberId, turns: Vec<Turn>) {
        self.transcript_cache = Some(TranscriptCache { chamber_id, turns });
    }

    pub fn invalidate_transcript(&mut self) {
        self.transcript_cache = None;
    }
}

/// Identity hand-off: record the user on first sight and bind the session.
///
/// The email is trimmed and lowercased before it becomes the store key.
pub async fn sign_in(
    store: &dyn ConsultationStore,
    session: &mut SessionState,
    email: &str,
    name: &str,
) -> Result<UserRecord, StoreError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(StoreError::NotAuthenticated(email));
    }
    let name = if name.trim().is_empty() {
        email.split('@').next().unwrap_or_default().to_string()
    } else {
        name.trim().to_string()
    };

    let user = store.upsert_user(&email, &name).await?;
    session.sign_in(user.email.clone());
    debug!(email = %user.email, "Session signed in");
    Ok(user)
}
