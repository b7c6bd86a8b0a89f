//! ConsultationStore trait — durable record of users, chambers, and turns.
//!
//! Every operation that touches a chamber is scoped by the owner's email:
//! a chamber id that exists but belongs to somebody else is reported as
//! [`StoreError::UnknownChamber`], never leaked.
//!
//! Implementations must serialize mutations per chamber and assign turn
//! sequence numbers atomically, so concurrent tabs writing to the same
//! chamber both succeed with increasing `seq`.

use async_trait::async_trait;

use crate::consultation::{Chamber, ChamberId, Role, Turn, UserRecord};
use crate::error::StoreError;

/// The core persistence trait.
///
/// Implementations: SQLite (durable), in-memory (for testing).
#[async_trait]
pub trait ConsultationStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Create the user on first sight, otherwise refresh the display name.
    /// Idempotent; returns the canonical record (original `created_at`).
    async fn upsert_user(&self, email: &str, name: &str) -> Result<UserRecord, StoreError>;

    /// Create a chamber. Fails with `NotAuthenticated` if the email is unknown.
    async fn create_chamber(&self, email: &str, title: &str) -> Result<ChamberId, StoreError>;

    /// Fetch one chamber owned by `email`.
    async fn get_chamber(&self, email: &str, chamber_id: ChamberId)
        -> Result<Chamber, StoreError>;

    /// All chambers of `email`, most recently created first.
    async fn list_chambers(&self, email: &str) -> Result<Vec<Chamber>, StoreError>;

    async fn rename_chamber(
        &self,
        email: &str,
        chamber_id: ChamberId,
        title: &str,
    ) -> Result<(), StoreError>;

    /// Set or clear the persona and language overrides of a chamber.
    async fn set_chamber_preferences(
        &self,
        email: &str,
        chamber_id: ChamberId,
        persona: Option<&str>,
        language: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Delete a chamber and its turns. Unknown ids are a no-op.
    async fn delete_chamber(&self, email: &str, chamber_id: ChamberId) -> Result<(), StoreError>;

    /// Append a turn and return its assigned `seq`.
    async fn append_turn(
        &self,
        email: &str,
        chamber_id: ChamberId,
        role: Role,
        content: &str,
    ) -> Result<i64, StoreError>;

    /// All turns of a chamber in ascending `seq` order.
    async fn read_turns(&self, email: &str, chamber_id: ChamberId) -> Result<Vec<Turn>, StoreError>;
}
