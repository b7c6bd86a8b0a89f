//! Chamber manager — chamber operations scoped to the signed-in user.
//!
//! The selected chamber always belongs to the session's user: selecting a
//! foreign or missing chamber clears the selection, and deleting the
//! selected chamber clears it too.

use crate::session::SessionState;
use chrono::Utc;
use lexchamber_core::consultation::{Chamber, ChamberId};
use lexchamber_core::error::StoreError;
use lexchamber_core::event::{DomainEvent, EventBus};
use lexchamber_core::store::ConsultationStore;
use std::sync::Arc;
use tracing::info;

/// Title used when a chamber is created without one.
pub const DEFAULT_TITLE: &str = "New Consultation";

pub struct ChamberManager {
    store: Arc<dyn ConsultationStore>,
    events: Arc<EventBus>,
}

impl ChamberManager {
    pub fn new(store: Arc<dyn ConsultationStore>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }

    /// Create a chamber and select it.
    pub async fn create(&self, session: &mut SessionState, title: &str) -> Result<Chamber, StoreError> {
        let email = signed_in(session)?;
        let title = match title.trim() {
            "" => DEFAULT_TITLE,
            t => t,
        };

        let id = self.store.create_chamber(&email, title).await?;
        let chamber = self.store.get_chamber(&email, id).await?;
        session.select_chamber(id);
        info!(chamber_id = id.0, "Chamber created");
        Ok(chamber)
    }

    pub async fn list(&self, session: &SessionState) -> Result<Vec<Chamber>, StoreError> {
        let email = signed_in(session)?;
        self.store.list_chambers(&email).await
    }

    pub async fn select(
        &self,
        session: &mut SessionState,
        chamber_id: ChamberId,
    ) -> Result<Chamber, StoreError> {
        let chamber = self.get(session, chamber_id).await?;
        session.select_chamber(chamber_id);
        Ok(chamber)
    }

    /// Look up one of the user's chambers without selecting it. A missing
    /// chamber still clears the selection.
    pub async fn get(
        &self,
        session: &mut SessionState,
        chamber_id: ChamberId,
    ) -> Result<Chamber, StoreError> {
        let email = signed_in(session)?;
        match self.store.get_chamber(&email, chamber_id).await {
            Ok(chamber) => Ok(chamber),
            Err(e @ StoreError::UnknownChamber { .. }) => {
                session.clear_chamber();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn rename(
        &self,
        session: &SessionState,
        chamber_id: ChamberId,
        title: &str,
    ) -> Result<Chamber, StoreError> {
        let email = signed_in(session)?;
        let title = match title.trim() {
            "" => DEFAULT_TITLE,
            t => t,
        };
        self.store.rename_chamber(&email, chamber_id, title).await?;
        self.store.get_chamber(&email, chamber_id).await
    }

    /// Set or clear the chamber's persona and answer-language overrides.
    /// Blank values clear the override.
    pub async fn set_preferences(
        &self,
        session: &SessionState,
        chamber_id: ChamberId,
        persona: Option<&str>,
        language: Option<&str>,
    ) -> Result<Chamber, StoreError> {
        let email = signed_in(session)?;
        let persona = persona.map(str::trim).filter(|p| !p.is_empty());
        let language = language.map(str::trim).filter(|l| !l.is_empty());
        self.store
            .set_chamber_preferences(&email, chamber_id, persona, language)
            .await?;
        self.store.get_chamber(&email, chamber_id).await
    }

    /// Delete a chamber and its turns. Unknown ids are a no-op.
    pub async fn delete(
        &self,
        session: &mut SessionState,
        chamber_id: ChamberId,
    ) -> Result<(), StoreError> {
        let email = signed_in(session)?;
        self.store.delete_chamber(&email, chamber_id).await?;

        if session.current_chamber() == Some(chamber_id) {
            session.clear_chamber();
        }
        self.events.publish(DomainEvent::ChamberDeleted {
            email,
            chamber_id,
            timestamp: Utc::now(),
        });
        info!(chamber_id = chamber_id.0, "Chamber deleted");
        Ok(())
    }
}

fn signed_in(session: &SessionState) -> Result<String, StoreError> {
    session
        .user_email()
        .map(str::to_string)
        .ok_or_else(|| StoreError::NotAuthenticated(String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexchamber_core::consultation::Role;
    use lexchamber_store::InMemoryStore;

    async fn setup() -> (ChamberManager, Arc<InMemoryStore>, Arc<EventBus>, SessionState) {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_user("a@x", "Ada").await.unwrap();
        store.upsert_user("b@x", "Bob").await.unwrap();
        let events = Arc::new(EventBus::default());
        let manager = ChamberManager::new(store.clone(), events.clone());
        let mut session = SessionState::new();
        session.sign_in("a@x");
        (manager, store, events, session)
    }

    #[tokio::test]
    async fn create_selects_new_chamber() {
        let (manager, _, _, mut session) = setup().await;
        let chamber = manager.create(&mut session, "  Tort ").await.unwrap();
        assert_eq!(chamber.title, "Tort");
        assert_eq!(session.current_chamber(), Some(chamber.id));

        let untitled = manager.create(&mut session, "").await.unwrap();
        assert_eq!(untitled.title, DEFAULT_TITLE);
    }

    #[tokio::test]
    async fn requires_sign_in() {
        let (manager, _, _, _) = setup().await;
        let mut anonymous = SessionState::new();
        assert!(matches!(
            manager.create(&mut anonymous, "Tort").await,
            Err(StoreError::NotAuthenticated(_))
        ));
        assert!(manager.list(&anonymous).await.is_err());
    }

    #[tokio::test]
    async fn selecting_foreign_chamber_clears_selection() {
        let (manager, store, _, mut session) = setup().await;
        let mine = manager.create(&mut session, "Mine").await.unwrap();
        let theirs = store.create_chamber("b@x", "Theirs").await.unwrap();

        assert!(matches!(
            manager.select(&mut session, theirs).await,
            Err(StoreError::UnknownChamber { .. })
        ));
        assert!(session.current_chamber().is_none());

        manager.select(&mut session, mine.id).await.unwrap();
        assert_eq!(session.current_chamber(), Some(mine.id));
    }

    #[tokio::test]
    async fn get_leaves_selection_alone_unless_missing() {
        let (manager, store, _, mut session) = setup().await;
        let first = manager.create(&mut session, "First").await.unwrap();
        let second = manager.create(&mut session, "Second").await.unwrap();

        let fetched = manager.get(&mut session, first.id).await.unwrap();
        assert_eq!(fetched.title, "First");
        assert_eq!(session.current_chamber(), Some(second.id));

        store.delete_chamber("a@x", second.id).await.unwrap();
        assert!(matches!(
            manager.get(&mut session, second.id).await,
            Err(StoreError::UnknownChamber { .. })
        ));
        assert!(session.current_chamber().is_none());
    }

    #[tokio::test]
    async fn deleting_selected_chamber_clears_selection() {
        let (manager, store, events, mut session) = setup().await;
        let keep = manager.create(&mut session, "Keep").await.unwrap();
        let gone = manager.create(&mut session, "Gone").await.unwrap();
        store.append_turn("a@x", gone.id, Role::User, "q").await.unwrap();
        let mut rx = events.subscribe();

        manager.delete(&mut session, gone.id).await.unwrap();

        assert!(session.current_chamber().is_none());
        let listed: Vec<ChamberId> = manager.list(&session).await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(listed, vec![keep.id]);
        assert_eq!(rx.try_recv().unwrap().name(), "chamber_deleted");
    }

    #[tokio::test]
    async fn deleting_other_chamber_keeps_selection() {
        let (manager, _, _, mut session) = setup().await;
        let other = manager.create(&mut session, "Other").await.unwrap();
        let current = manager.create(&mut session, "Current").await.unwrap();

        manager.delete(&mut session, other.id).await.unwrap();
        assert_eq!(session.current_chamber(), Some(current.id));
    }

    #[tokio::test]
    async fn rename_and_preferences() {
        let (manager, _, _, mut session) = setup().await;
        let chamber = manager.create(&mut session, "Tort").await.unwrap();

        let renamed = manager.rename(&session, chamber.id, "Tort law").await.unwrap();
        assert_eq!(renamed.title, "Tort law");

        let updated = manager
            .set_preferences(&session, chamber.id, Some("Constitutional specialist"), Some("Hindi"))
            .await
            .unwrap();
        assert_eq!(updated.persona.as_deref(), Some("Constitutional specialist"));
        assert_eq!(updated.language.as_deref(), Some("Hindi"));

        let cleared = manager
            .set_preferences(&session, chamber.id, Some("  "), None)
            .await
            .unwrap();
        assert!(cleared.persona.is_none());
        assert!(cleared.language.is_none());
    }
}
