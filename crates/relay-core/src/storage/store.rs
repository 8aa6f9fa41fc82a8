//! Storage contract the relay depends on
//!
//! The relay never talks to a database directly; it goes through this
//! trait. Implementations are expected to keep messages ordered by
//! occurrence within a session.

use crate::error::RelayResult;
use crate::types::{SessionRecord, Turn};
use async_trait::async_trait;

/// Durable repository for sessions and their messages
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The last `limit` persisted turns for a session, oldest-first
    async fn load_recent_turns(&self, session_id: i64, limit: usize) -> RelayResult<Vec<Turn>>;

    /// Append a batch of turns to a session's history
    async fn append_turns(&self, session_id: i64, turns: &[Turn]) -> RelayResult<()>;

    /// All sessions owned by `user_id`, newest-first
    async fn list_sessions(&self, user_id: &str) -> RelayResult<Vec<SessionRecord>>;

    /// Session metadata, or `None` if the session does not exist or is not
    /// owned by `user_id`
    async fn load_session(
        &self,
        user_id: &str,
        session_id: i64,
    ) -> RelayResult<Option<SessionRecord>>;

    /// Create a new untitled session owned by `user_id`
    async fn create_session(&self, user_id: &str, user_name: &str) -> RelayResult<SessionRecord>;

    /// Persist the session title. The relay guarantees at most one call
    /// per session while the title is empty.
    async fn set_title(&self, session_id: i64, title: &str) -> RelayResult<()>;
}
