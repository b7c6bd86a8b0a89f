//! # LexChamber Core
//!
//! Domain types, traits, and error definitions for the LexChamber legal
//! consultation assistant. This crate has **zero framework dependencies** —
//! it defines the consultation model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The two external seams of the system are traits here:
//! - [`ConsultationStore`] — durable users, chambers, and turns
//! - [`InferenceGateway`] — the external LLM endpoint
//!
//! Implementations live in `lexchamber-store` and `lexchamber-providers`.
//! The turn controller only ever sees the traits, so tests swap in mocks.

pub mod consultation;
pub mod error;
pub mod event;
pub mod inference;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use consultation::{Chamber, ChamberId, Role, Turn, UserRecord};
pub use error::{Error, InferenceError, Result, StoreError};
pub use event::{DomainEvent, EventBus};
pub use inference::InferenceGateway;
pub use store::ConsultationStore;
