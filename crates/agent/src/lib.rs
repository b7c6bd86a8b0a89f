//! Consultation orchestration — the heart of LexChamber.
//!
//! A submission flows **record → prompt → infer → record**:
//!
//! 1. **Record** the user's utterance as a durable turn
//! 2. **Assemble** the instruction (persona, protocol, boundary, language, query)
//! 3. **Invoke** the inference gateway exactly once
//! 4. **Record** the reply, or hand it back unstored if the write fails
//!
//! Session state, the transcript view, and the chamber manager wrap the
//! store for one browser tab.

pub mod chambers;
pub mod controller;
pub mod prompt;
pub mod session;
pub mod transcript;

#[cfg(test)]
mod test_helpers;

pub use chambers::ChamberManager;
pub use controller::{Phase, SubmissionError, SubmissionOutcome, TurnController};
pub use prompt::{REFUSAL_SENTENCE, assemble};
pub use session::{PendingSubmission, SessionState, TransientReply};
pub use transcript::{Transcript, TranscriptEntry, TranscriptView};
