//! In-memory store — useful for testing and throwaway sessions.

use async_trait::async_trait;
use chrono::Utc;
use lexchamber_core::consultation::{Chamber, ChamberId, Role, Turn, UserRecord};
use lexchamber_core::error::StoreError;
use lexchamber_core::store::ConsultationStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    users: HashMap<String, UserRecord>,
    chambers: BTreeMap<ChamberId, Chamber>,
    turns: HashMap<ChamberId, Vec<Turn>>,
    next_id: i64,
}

impl State {
    fn owned(&self, email: &str, chamber_id: ChamberId) -> Result<&Chamber, StoreError> {
        self.chambers
            .get(&chamber_id)
            .filter(|c| c.email == email)
            .ok_or(StoreError::UnknownChamber {
                chamber_id: chamber_id.0,
            })
    }

    fn owned_mut(&mut self, email: &str, chamber_id: ChamberId) -> Result<&mut Chamber, StoreError> {
        self.chambers
            .get_mut(&chamber_id)
            .filter(|c| c.email == email)
            .ok_or(StoreError::UnknownChamber {
                chamber_id: chamber_id.0,
            })
    }
}

/// A store that keeps everything in process memory.
/// Same ownership and sequencing rules as the SQLite store, no durability.
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConsultationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn upsert_user(&self, email: &str, name: &str) -> Result<UserRecord, StoreError> {
        if email.trim().is_empty() {
            return Err(StoreError::NotAuthenticated(email.to_string()));
        }
        let mut state = self.state.write().await;
        let record = state
            .users
            .entry(email.to_string())
            .and_modify(|u| u.name = name.to_string())
            .or_insert_with(|| UserRecord {
                email: email.to_string(),
                name: name.to_string(),
                created_at: Utc::now(),
            });
        Ok(record.clone())
    }

    async fn create_chamber(&self, email: &str, title: &str) -> Result<ChamberId, StoreError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(email) {
            return Err(StoreError::NotAuthenticated(email.to_string()));
        }
        state.next_id += 1;
        let id = ChamberId(state.next_id);
        state.chambers.insert(
            id,
            Chamber {
                id,
                email: email.to_string(),
                title: title.to_string(),
                persona: None,
                language: None,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_chamber(
        &self,
        email: &str,
        chamber_id: ChamberId,
    ) -> Result<Chamber, StoreError> {
        self.state.read().await.owned(email, chamber_id).cloned()
    }

    async fn list_chambers(&self, email: &str) -> Result<Vec<Chamber>, StoreError> {
        let state = self.state.read().await;
        let mut chambers: Vec<Chamber> = state
            .chambers
            .values()
            .filter(|c| c.email == email)
            .cloned()
            .collect();
        chambers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(chambers)
    }

    async fn rename_chamber(
        &self,
        email: &str,
        chamber_id: ChamberId,
        title: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.owned_mut(email, chamber_id)?.title = title.to_string();
        Ok(())
    }

    async fn set_chamber_preferences(
        &self,
        email: &str,
        chamber_id: ChamberId,
        persona: Option<&str>,
        language: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let chamber = state.owned_mut(email, chamber_id)?;
        chamber.persona = persona.map(str::to_string);
        chamber.language = language.map(str::to_string);
        Ok(())
    }

    async fn delete_chamber(&self, email: &str, chamber_id: ChamberId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.owned(email, chamber_id).is_ok() {
            state.chambers.remove(&chamber_id);
            state.turns.remove(&chamber_id);
        }
        Ok(())
    }

    async fn append_turn(
        &self,
        email: &str,
        chamber_id: ChamberId,
        role: Role,
        content: &str,
    ) -> Result<i64, StoreError> {
        let mut state = self.state.write().await;
        state.owned(email, chamber_id)?;

        let turns = state.turns.entry(chamber_id).or_default();
        let seq = turns.last().map_or(1, |t| t.seq + 1);
        let now = Utc::now();
        let created_at = turns
            .last()
            .map_or(now, |t| t.created_at.max(now));
        turns.push(Turn {
            chamber_id,
            seq,
            role,
            content: content.to_string(),
            created_at,
        });
        Ok(seq)
    }

    async fn read_turns(&self, email: &str, chamber_id: ChamberId) -> Result<Vec<Turn>, StoreError> {
        let state = self.state.read().await;
        state.owned(email, chamber_id)?;
        Ok(state.turns.get(&chamber_id).cloned().unwrap_or_default())
    }
}
