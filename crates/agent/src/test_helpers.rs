//! Shared test helpers for controller and view tests.

use async_trait::async_trait;
use lexchamber_core::consultation::{Chamber, ChamberId, Role, Turn, UserRecord};
use lexchamber_core::error::{InferenceError, StoreError};
use lexchamber_core::inference::InferenceGateway;
use lexchamber_core::store::ConsultationStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A gateway that returns a sequence of scripted results.
///
/// Each call to `invoke` returns the next result in the queue.
/// Panics if more calls are made than results provided.
pub struct ScriptedGateway {
    results: Mutex<VecDeque<Result<String, InferenceError>>>,
    call_count: Mutex<usize>,
    last_instruction: Mutex<Option<String>>,
}

impl ScriptedGateway {
    pub fn new(results: Vec<Result<String, InferenceError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            call_count: Mutex::new(0),
            last_instruction: Mutex::new(None),
        }
    }

    /// Successful replies, in order.
    pub fn replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn last_instruction(&self) -> Option<String> {
        self.last_instruction.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn invoke(&self, instruction: &str) -> Result<String, InferenceError> {
        let mut count = self.call_count.lock().unwrap();
        *count += 1;
        *self.last_instruction.lock().unwrap() = Some(instruction.to_string());

        self.results.lock().unwrap().pop_front().unwrap_or_else(|| {
            panic!("ScriptedGateway: no more results (call #{})", *count)
        })
    }
}

/// A store whose turn writes for one role always fail. Everything else is
/// delegated to the wrapped store.
pub struct FailingTurnStore {
    inner: Arc<dyn ConsultationStore>,
    failing: Role,
}

impl FailingTurnStore {
    pub fn assistant(inner: Arc<dyn ConsultationStore>) -> Self {
        Self {
            inner,
            failing: Role::Assistant,
        }
    }

    pub fn user(inner: Arc<dyn ConsultationStore>) -> Self {
        Self {
            inner,
            failing: Role::User,
        }
    }
}

#[async_trait]
impl ConsultationStore for FailingTurnStore {
    fn name(&self) -> &str {
        "failing_turns"
    }

    async fn upsert_user(&self, email: &str, name: &str) -> Result<UserRecord, StoreError> {
        self.inner.upsert_user(email, name).await
    }

    async fn create_chamber(&self, email: &str, title: &str) -> Result<ChamberId, StoreError> {
        self.inner.create_chamber(email, title).await
    }

    async fn get_chamber(&self, email: &str, chamber_id: ChamberId) -> Result<Chamber, StoreError> {
        self.inner.get_chamber(email, chamber_id).await
    }

    async fn list_chambers(&self, email: &str) -> Result<Vec<Chamber>, StoreError> {
        self.inner.list_chambers(email).await
    }

    async fn rename_chamber(
        &self,
        email: &str,
        chamber_id: ChamberId,
        title: &str,
    ) -> Result<(), StoreError> {
        self.inner.rename_chamber(email, chamber_id, title).await
    }

    async fn set_chamber_preferences(
        &self,
        email: &str,
        chamber_id: ChamberId,
        persona: Option<&str>,
        language: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner
            .set_chamber_preferences(email, chamber_id, persona, language)
            .await
    }

    async fn delete_chamber(&self, email: &str, chamber_id: ChamberId) -> Result<(), StoreError> {
        self.inner.delete_chamber(email, chamber_id).await
    }

    async fn append_turn(
        &self,
        email: &str,
        chamber_id: ChamberId,
        role: Role,
        content: &str,
    ) -> Result<i64, StoreError> {
        if role == self.failing {
            return Err(StoreError::WriteFailed("simulated write failure".into()));
        }
        self.inner.append_turn(email, chamber_id, role, content).await
    }

    async fn read_turns(&self, email: &str, chamber_id: ChamberId) -> Result<Vec<Turn>, StoreError> {
        self.inner.read_turns(email, chamber_id).await
    }
}
