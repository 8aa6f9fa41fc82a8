//! In-process memo of session metadata
//!
//! Keyed identically to the conversation cache, populated lazily from the
//! store and never evicted during normal operation, so repeated requests
//! for the same session skip the store round-trip. A lookup that finds no
//! session is fatal for the calling request and caches nothing.

use crate::error::{RelayError, RelayResult};
use crate::types::{ConversationKey, SessionRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

#[derive(Debug)]
struct RegistryEntry {
    record: OnceCell<Mutex<SessionRecord>>,
}

/// Concurrency-safe read-mostly cache of session records
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: RwLock<HashMap<ConversationKey, Arc<RegistryEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached record for `key`, loading it through `loader` on
    /// first touch (at most once even under concurrent callers). A loader
    /// that reports no session yields `SessionNotFound` and installs no
    /// negative entry, so a later call consults the store again.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: &ConversationKey,
        loader: F,
    ) -> RelayResult<SessionRecord>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RelayResult<Option<SessionRecord>>>,
    {
        let entry = self.entry(key).await;
        let not_found = || RelayError::session_not_found(key.user_id.clone(), key.session_id);
        let record = entry
            .record
            .get_or_try_init(|| async move {
                match loader().await? {
                    Some(record) => Ok(Mutex::new(record)),
                    None => Err(not_found()),
                }
            })
            .await?;
        Ok(record.lock().clone())
    }

    /// Seed the registry with a freshly created session record
    pub async fn insert(&self, record: SessionRecord) {
        let key = record.key();
        let entry = Arc::new(RegistryEntry {
            record: OnceCell::new_with(Some(Mutex::new(record))),
        });
        self.entries.write().await.insert(key, entry);
    }

    /// Cached record, if this session has been touched in-process
    pub async fn get(&self, key: &ConversationKey) -> Option<SessionRecord> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        entry.record.get().map(|record| record.lock().clone())
    }

    /// Current title of the cached session, if any
    pub async fn title(&self, key: &ConversationKey) -> Option<String> {
        self.get(key).await.and_then(|record| record.title)
    }

    /// Set the title only if the cached session has none yet. Returns
    /// whether this call performed the write, which gates the at-most-once
    /// durable title update.
    pub async fn set_title_if_empty(&self, key: &ConversationKey, title: &str) -> bool {
        let entries = self.entries.read().await;
        let Some(entry) = entries.get(key) else {
            return false;
        };
        let Some(record) = entry.record.get() else {
            return false;
        };
        let mut record = record.lock();
        if record.has_title() {
            return false;
        }
        record.title = Some(title.to_string());
        true
    }

    /// Drop the cached record (used on session deletion)
    pub async fn remove(&self, key: &ConversationKey) {
        self.entries.write().await.remove(key);
    }

    async fn entry(&self, key: &ConversationKey) -> Arc<RegistryEntry> {
        if let Some(entry) = self.entries.read().await.get(key) {
            return entry.clone();
        }
        let mut entries = self.entries.write().await;
        entries
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(RegistryEntry {
                    record: OnceCell::new(),
                })
            })
            .clone()
    }
}
