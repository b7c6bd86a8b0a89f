//! Inference gateway implementations for LexChamber.
//!
//! All providers implement the `lexchamber_core::InferenceGateway` trait.
//! [`build_from_config`] selects the configured provider and bounds it with
//! the inference deadline.

mod classify;
pub mod deadline;
pub mod gemini;
pub mod openai_compat;
pub mod router;

pub use deadline::DeadlineGateway;
pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
