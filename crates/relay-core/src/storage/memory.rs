//! In-memory store backend
//!
//! Backs integration tests and embedders that do not need durability.

use crate::error::{RelayError, RelayResult};
use crate::storage::store::ConversationStore;
use crate::types::{SessionRecord, Turn};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryInner {
    next_session_id: i64,
    sessions: HashMap<i64, SessionRecord>,
    messages: HashMap<i64, Vec<Turn>>,
}

/// `ConversationStore` over process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All persisted turns for a session, oldest-first (test helper)
    pub async fn all_turns(&self, session_id: i64) -> Vec<Turn> {
        self.inner
            .read()
            .await
            .messages
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of sessions created so far
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn load_recent_turns(&self, session_id: i64, limit: usize) -> RelayResult<Vec<Turn>> {
        let inner = self.inner.read().await;
        let turns = inner.messages.get(&session_id).cloned().unwrap_or_default();
        let skip = turns.len().saturating_sub(limit);
        Ok(turns.into_iter().skip(skip).collect())
    }

    async fn append_turns(&self, session_id: i64, turns: &[Turn]) -> RelayResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .messages
            .entry(session_id)
            .or_default()
            .extend_from_slice(turns);
        Ok(())
    }

    async fn list_sessions(&self, user_id: &str) -> RelayResult<Vec<SessionRecord>> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<SessionRecord> = inner
            .sessions
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        // Ids are allocation-ordered, which breaks ties between sessions
        // created within the same timestamp tick.
        sessions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.session_id.cmp(&a.session_id))
        });
        Ok(sessions)
    }

    async fn load_session(
        &self,
        user_id: &str,
        session_id: i64,
    ) -> RelayResult<Option<SessionRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sessions
            .get(&session_id)
            .filter(|record| record.user_id == user_id)
            .cloned())
    }

    async fn create_session(&self, user_id: &str, user_name: &str) -> RelayResult<SessionRecord> {
        let mut inner = self.inner.write().await;
        inner.next_session_id += 1;
        let record = SessionRecord {
            session_id: inner.next_session_id,
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            title: None,
            created_at: Utc::now(),
        };
        inner.sessions.insert(record.session_id, record.clone());
        Ok(record)
    }

    async fn set_title(&self, session_id: i64, title: &str) -> RelayResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| RelayError::storage(format!("no session {session_id}")))?;
        record.title = Some(title.to_string());
        Ok(())
    }
}
