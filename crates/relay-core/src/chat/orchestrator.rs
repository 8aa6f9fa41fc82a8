//! Per-request orchestration: session resolution, hydration, streaming,
//! and guaranteed finalization
//!
//! One pump task drives each in-flight stream. The caller only holds the
//! receiving end of a bounded channel, so a client disconnect can never
//! cancel the pump; the pump observes the closed channel, stops pulling
//! from upstream, and still commits whatever assistant text accumulated.

use crate::cache::ConversationCache;
use crate::config::RelayConfig;
use crate::error::RelayResult;
use crate::llm::provider::LlmProvider;
use crate::llm::registry::ProviderRegistry;
use crate::session::SessionRegistry;
use crate::storage::ConversationStore;
use crate::stream::transcoder::StreamTranscoder;
use crate::stream::{StreamToken, TokenStream};
use crate::types::{ConversationKey, SessionRecord, Turn, UserContext};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::instrument;

/// Tokens buffered between the pump and a slow client
const TOKEN_CHANNEL_CAPACITY: usize = 32;

/// Composes cache, registry, store, and provider gateways into the
/// request-level chat flow.
pub struct ChatRelay {
    cache: Arc<ConversationCache>,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn ConversationStore>,
    providers: Arc<ProviderRegistry>,
    token_delay: Duration,
}

impl ChatRelay {
    pub fn new(
        config: &RelayConfig,
        store: Arc<dyn ConversationStore>,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            cache: Arc::new(ConversationCache::new(config.window_turns)),
            registry: Arc::new(SessionRegistry::new()),
            store,
            providers,
            token_delay: config.token_delay(),
        }
    }

    /// Conversation cache owned by this relay
    pub fn cache(&self) -> &Arc<ConversationCache> {
        &self.cache
    }

    /// Session registry owned by this relay
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Stream a chat completion for `prompt` within the caller's session.
    ///
    /// With no session id a new session is created; an unknown or foreign
    /// session id fails with `SessionNotFound`. The returned stream yields
    /// paced tokens ending in the `done` sentinel (or an error after the
    /// tokens produced so far). The exchange is committed to cache and
    /// store when the stream finishes, errors, or is dropped by the caller.
    #[instrument(skip(self, prompt), fields(provider = %provider_name, user = %user.user_id))]
    pub async fn stream_chat(
        &self,
        provider_name: &str,
        prompt: String,
        user: &UserContext,
        session_id: Option<i64>,
    ) -> RelayResult<TokenStream> {
        let provider = self.providers.get(provider_name)?;

        let session = self.resolve_session(user, session_id).await?;
        let key = session.key();

        self.hydrate(&key).await?;

        // The user turn enters the cache before the provider call; durable
        // persistence of both turns is deferred to finalization.
        self.cache.append(&key, Turn::user(prompt.clone())).await;
        let history = self.cache.snapshot(&key).await.unwrap_or_default();

        let extractor_provider = provider.clone();
        let transcoder =
            StreamTranscoder::new(move |value| extractor_provider.extract_delta(value));

        let fragments = match provider.stream_chat(&history, &user.user_name).await {
            Ok(fragments) => fragments,
            Err(error) => {
                // Submitting failed after retries; the exchange is still
                // committed, with an empty assistant reply.
                tracing::warn!(error = %error, "upstream submit failed");
                finalize(
                    self.cache.clone(),
                    self.registry.clone(),
                    self.store.clone(),
                    provider,
                    key,
                    session,
                    prompt,
                    transcoder.into_reply(),
                )
                .await;
                return Err(error);
            }
        };

        let (tx, rx) = mpsc::channel::<RelayResult<StreamToken>>(TOKEN_CHANNEL_CAPACITY);
        let pump = StreamPump {
            cache: self.cache.clone(),
            registry: self.registry.clone(),
            store: self.store.clone(),
            provider,
            key,
            session,
            prompt,
            token_delay: self.token_delay,
        };
        tokio::spawn(pump.run(fragments, transcoder, tx));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    /// Create a fresh untitled session for the caller
    pub async fn create_session(&self, user: &UserContext) -> RelayResult<SessionRecord> {
        let record = self
            .store
            .create_session(&user.user_id, &user.user_name)
            .await?;
        self.registry.insert(record.clone()).await;
        Ok(record)
    }

    /// All of the caller's sessions, newest-first
    pub async fn list_sessions(&self, user_id: &str) -> RelayResult<Vec<SessionRecord>> {
        self.store.list_sessions(user_id).await
    }

    /// Recent messages of a session, served from the cache and hydrating
    /// it on first touch
    pub async fn session_messages(
        &self,
        user_id: &str,
        session_id: i64,
    ) -> RelayResult<Vec<Turn>> {
        let key = ConversationKey::new(user_id, session_id);
        self.hydrate(&key).await
    }

    /// Drop all in-memory state for a session. The next touch rehydrates
    /// from the store.
    pub async fn evict_session(&self, user_id: &str, session_id: i64) {
        let key = ConversationKey::new(user_id, session_id);
        self.cache.remove(&key).await;
        self.registry.remove(&key).await;
    }

    async fn resolve_session(
        &self,
        user: &UserContext,
        session_id: Option<i64>,
    ) -> RelayResult<SessionRecord> {
        match session_id {
            None => self.create_session(user).await,
            Some(id) => {
                let key = ConversationKey::new(user.user_id.clone(), id);
                let store = self.store.clone();
                let user_id = user.user_id.clone();
                self.registry
                    .get_or_load(&key, move || async move {
                        store.load_session(&user_id, id).await
                    })
                    .await
            }
        }
    }

    async fn hydrate(&self, key: &ConversationKey) -> RelayResult<Vec<Turn>> {
        let store = self.store.clone();
        let session_id = key.session_id;
        let limit = self.cache.capacity();
        self.cache
            .get_or_hydrate(key, move || async move {
                store.load_recent_turns(session_id, limit).await
            })
            .await
    }
}

/// Everything the detached pump task needs to deliver and finalize one
/// exchange
struct StreamPump {
    cache: Arc<ConversationCache>,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn LlmProvider>,
    key: ConversationKey,
    session: SessionRecord,
    prompt: String,
    token_delay: Duration,
}

impl StreamPump {
    async fn run(
        self,
        mut fragments: crate::llm::FragmentStream,
        mut transcoder: StreamTranscoder,
        tx: mpsc::Sender<RelayResult<StreamToken>>,
    ) {
        let mut failed = false;
        let mut disconnected = false;

        'upstream: while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    for token in transcoder.transcode(&fragment) {
                        let done = token.is_done();
                        tokio::time::sleep(self.token_delay).await;
                        if tx.send(Ok(token)).await.is_err() {
                            disconnected = true;
                            break 'upstream;
                        }
                        if done {
                            break 'upstream;
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(error = %error, "upstream stream failed mid-flight");
                    failed = true;
                    let _ = tx.send(Err(error)).await;
                    break 'upstream;
                }
            }
        }

        // Upstream closed without an explicit sentinel: the client still
        // gets exactly one done token.
        if !failed && !disconnected {
            if let Some(token) = transcoder.finish() {
                tokio::time::sleep(self.token_delay).await;
                let _ = tx.send(Ok(token)).await;
            }
        }

        finalize(
            self.cache,
            self.registry,
            self.store,
            self.provider,
            self.key,
            self.session,
            self.prompt,
            transcoder.into_reply(),
        )
        .await;
    }
}

/// Guaranteed cleanup for one exchange: commit the assistant turn to the
/// cache, then hand durable writes and title generation to a task the
/// client cannot cancel.
#[allow(clippy::too_many_arguments)]
async fn finalize(
    cache: Arc<ConversationCache>,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn LlmProvider>,
    key: ConversationKey,
    session: SessionRecord,
    prompt: String,
    reply: String,
) {
    cache.append(&key, Turn::assistant(reply.clone())).await;

    tokio::spawn(async move {
        let turns = [Turn::user(prompt.clone()), Turn::assistant(reply)];
        if let Err(error) = store.append_turns(session.session_id, &turns).await {
            tracing::warn!(
                session_id = session.session_id,
                error = %error,
                "failed to persist exchange; cache remains ahead of the store"
            );
        }

        let has_title = registry
            .title(&key)
            .await
            .is_some_and(|title| !title.trim().is_empty());
        if has_title {
            return;
        }

        match provider.generate_title(&prompt).await {
            Ok(title) => {
                if registry.set_title_if_empty(&key, &title).await {
                    if let Err(error) = store.set_title(session.session_id, &title).await {
                        tracing::warn!(
                            session_id = session.session_id,
                            error = %error,
                            "failed to persist generated title"
                        );
                    }
                }
            }
            Err(error) => {
                tracing::warn!(
                    session_id = session.session_id,
                    error = %error,
                    "title generation failed"
                );
            }
        }
    });
}
