//! Sliding-window conversation cache
//!
//! Process-wide, concurrency-safe map from a conversation key to the recent
//! message history of that conversation. Windows hold at most `capacity`
//! turns (default 20) with strict FIFO eviction, and are hydrated lazily
//! from durable storage on first touch.
//!
//! This is an intentional read-through cache with no invalidation: once a
//! key has a window, the underlying store is never consulted again for it
//! until the window is removed.

use crate::config::DEFAULT_WINDOW_TURNS;
use crate::error::RelayResult;
use crate::types::{ConversationKey, Turn};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

/// One cache slot. The `OnceCell` is the single-flight gate: concurrent
/// first-touches of the same key run the loader exactly once, and a failed
/// load leaves the cell empty so a later call retries hydration.
#[derive(Debug)]
struct CacheEntry {
    window: OnceCell<Mutex<VecDeque<Turn>>>,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            window: OnceCell::new(),
        }
    }
}

/// Concurrency-safe sliding-window store for conversation histories
#[derive(Debug)]
pub struct ConversationCache {
    capacity: usize,
    entries: RwLock<HashMap<ConversationKey, Arc<CacheEntry>>>,
}

impl ConversationCache {
    /// Create a cache whose windows retain at most `capacity` turns
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Window capacity in turns
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return the window for `key`, hydrating it from `loader` on first
    /// touch. The loader must yield persisted turns oldest-first; only the
    /// most recent `capacity` of them are kept.
    ///
    /// The loader runs at most once per key even under concurrent callers.
    /// If it fails, no window is installed and the error is propagated;
    /// a later call will invoke the loader again.
    pub async fn get_or_hydrate<F, Fut>(
        &self,
        key: &ConversationKey,
        loader: F,
    ) -> RelayResult<Vec<Turn>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RelayResult<Vec<Turn>>>,
    {
        let entry = self.entry(key).await;
        let capacity = self.capacity;
        let window = entry
            .window
            .get_or_try_init(|| async move {
                let turns = loader().await?;
                let skip = turns.len().saturating_sub(capacity);
                let window: VecDeque<Turn> = turns.into_iter().skip(skip).collect();
                RelayResult::Ok(Mutex::new(window))
            })
            .await?;
        Ok(window.lock().iter().cloned().collect())
    }

    /// Append a turn to the window for `key`, evicting from the front once
    /// the window exceeds capacity. No-op if the key has never been
    /// hydrated; callers hydrate before appending by protocol.
    pub async fn append(&self, key: &ConversationKey, turn: Turn) {
        let entry = {
            let entries = self.entries.read().await;
            entries.get(key).cloned()
        };
        let Some(entry) = entry else { return };
        let Some(window) = entry.window.get() else {
            return;
        };
        let mut window = window.lock();
        window.push_back(turn);
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    /// Read-only copy of the window, or `None` if the key is not cached
    pub async fn snapshot(&self, key: &ConversationKey) -> Option<Vec<Turn>> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        let window = entry.window.get()?;
        Some(window.lock().iter().cloned().collect())
    }

    /// Evict the window entirely. A subsequent `get_or_hydrate` reloads
    /// from the store.
    pub async fn remove(&self, key: &ConversationKey) {
        self.entries.write().await.remove(key);
    }

    /// Number of keys with a cache slot (hydrated or in-flight)
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Get or install the slot for `key`. Fast path takes the read lock
    /// only; the write lock is held for the map insert, never across the
    /// loader.
    async fn entry(&self, key: &ConversationKey) -> Arc<CacheEntry> {
        if let Some(entry) = self.entries.read().await.get(key) {
            return entry.clone();
        }
        let mut entries = self.entries.write().await;
        entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CacheEntry::new()))
            .clone()
    }
}

impl Default for ConversationCache {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_TURNS)
    }
}
