//! End-to-end chat flow over a scripted provider and the in-memory store

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use relay_core::{
    ChatRelay, ConversationStore, FragmentStream, LlmProvider, MemoryStore, ProviderRegistry,
    RelayConfig, RelayError, RelayResult, StreamToken, Turn, UserContext,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Provider double that plays back prepared fragment streams, one per
/// `stream_chat` call, and records the history it was asked to complete.
struct ScriptedProvider {
    streams: Mutex<VecDeque<FragmentStream>>,
    histories: Mutex<Vec<Vec<Turn>>>,
    submit_error: Mutex<Option<RelayError>>,
    title: String,
    title_calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(title: &str) -> Self {
        Self {
            streams: Mutex::new(VecDeque::new()),
            histories: Mutex::new(Vec::new()),
            submit_error: Mutex::new(None),
            title: title.to_string(),
            title_calls: AtomicUsize::new(0),
        }
    }

    fn with_fragments(title: &str, fragments: Vec<RelayResult<String>>) -> Self {
        let provider = Self::new(title);
        provider.push_script(fragments);
        provider
    }

    fn push_script(&self, fragments: Vec<RelayResult<String>>) {
        self.streams
            .lock()
            .push_back(Box::pin(futures::stream::iter(fragments)));
    }

    fn push_stream(&self, stream: FragmentStream) {
        self.streams.lock().push_back(stream);
    }

    fn failing_submit(title: &str, error: RelayError) -> Self {
        let provider = Self::new(title);
        *provider.submit_error.lock() = Some(error);
        provider
    }

    fn histories(&self) -> Vec<Vec<Turn>> {
        self.histories.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(&self, history: &[Turn], _user_name: &str) -> RelayResult<FragmentStream> {
        self.histories.lock().push(history.to_vec());
        if let Some(error) = self.submit_error.lock().take() {
            return Err(error);
        }
        self.streams
            .lock()
            .pop_front()
            .ok_or_else(|| RelayError::upstream("no scripted stream left"))
    }

    async fn generate_title(&self, _prompt: &str) -> RelayResult<String> {
        self.title_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.title.clone())
    }

    fn extract_delta(&self, value: &Value) -> Option<String> {
        value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
    }
}

fn delta(text: &str) -> RelayResult<String> {
    Ok(format!(
        r#"data: {{"choices":[{{"delta":{{"content":"{text}"}}}}]}}"#
    ))
}

fn done() -> RelayResult<String> {
    Ok("data: [DONE]".to_string())
}

fn relay(provider: Arc<ScriptedProvider>, store: Arc<MemoryStore>) -> ChatRelay {
    let mut providers = ProviderRegistry::new();
    providers.register(provider);
    let config = RelayConfig {
        token_delay_ms: 0,
        ..RelayConfig::default()
    };
    ChatRelay::new(&config, store, Arc::new(providers))
}

fn alice() -> UserContext {
    init_tracing();
    UserContext::new("user-1", "Alice", "alice@example.com")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn collect(stream: relay_core::TokenStream) -> Vec<RelayResult<StreamToken>> {
    stream.collect().await
}

/// Finalization runs on a detached task; poll until it lands.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within deadline");
}

#[tokio::test]
async fn full_exchange_streams_tokens_and_persists() {
    let provider = Arc::new(ScriptedProvider::with_fragments(
        "Rust Basics",
        vec![delta("Hello "), delta("world"), done()],
    ));
    let store = Arc::new(MemoryStore::new());
    let relay = relay(provider.clone(), store.clone());

    let stream = relay
        .stream_chat("scripted", "Hi".into(), &alice(), None)
        .await
        .unwrap();
    let tokens: Vec<StreamToken> = collect(stream)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(
        tokens,
        vec![
            StreamToken::Content("Hello ".into()),
            StreamToken::Content("world".into()),
            StreamToken::Done,
        ]
    );

    let store_check = store.clone();
    eventually(move || {
        let store = store_check.clone();
        async move { store.all_turns(1).await.len() == 2 }
    })
    .await;

    assert_eq!(
        store.all_turns(1).await,
        vec![Turn::user("Hi"), Turn::assistant("Hello world")]
    );

    let store_check = store.clone();
    eventually(move || {
        let store = store_check.clone();
        async move {
            store
                .load_session("user-1", 1)
                .await
                .unwrap()
                .is_some_and(|record| record.title.as_deref() == Some("Rust Basics"))
        }
    })
    .await;
    assert_eq!(provider.title_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stream_without_sentinel_still_ends_with_done() {
    let provider = Arc::new(ScriptedProvider::with_fragments(
        "Title",
        vec![delta("Hi "), delta("there")],
    ));
    let store = Arc::new(MemoryStore::new());
    let relay = relay(provider, store.clone());

    let stream = relay
        .stream_chat("scripted", "Hey".into(), &alice(), None)
        .await
        .unwrap();
    let tokens: Vec<StreamToken> = collect(stream)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(tokens.last(), Some(&StreamToken::Done));
    assert_eq!(
        tokens.iter().filter(|token| token.is_done()).count(),
        1
    );
}

#[tokio::test]
async fn mid_stream_error_surfaces_after_delivered_tokens() {
    let provider = Arc::new(ScriptedProvider::with_fragments(
        "Title",
        vec![
            delta("partial "),
            Err(RelayError::transport("connection reset")),
        ],
    ));
    let store = Arc::new(MemoryStore::new());
    let relay = relay(provider, store.clone());

    let stream = relay
        .stream_chat("scripted", "Hi".into(), &alice(), None)
        .await
        .unwrap();
    let items = collect(stream).await;

    assert_eq!(items.len(), 2);
    assert_eq!(
        items[0].as_ref().unwrap(),
        &StreamToken::Content("partial ".into())
    );
    assert!(matches!(items[1], Err(RelayError::Transport(_))));

    // The partial reply is still committed.
    let store_check = store.clone();
    eventually(move || {
        let store = store_check.clone();
        async move { store.all_turns(1).await.len() == 2 }
    })
    .await;
    assert_eq!(
        store.all_turns(1).await,
        vec![Turn::user("Hi"), Turn::assistant("partial ")]
    );
}

#[tokio::test]
async fn submit_failure_propagates_and_commits_empty_reply() {
    let provider = Arc::new(ScriptedProvider::failing_submit(
        "Title",
        RelayError::transport("connect refused"),
    ));
    let store = Arc::new(MemoryStore::new());
    let relay = relay(provider, store.clone());

    let result = relay
        .stream_chat("scripted", "Hi".into(), &alice(), None)
        .await;
    assert!(matches!(result, Err(RelayError::Transport(_))));

    let store_check = store.clone();
    eventually(move || {
        let store = store_check.clone();
        async move { store.all_turns(1).await.len() == 2 }
    })
    .await;
    assert_eq!(
        store.all_turns(1).await,
        vec![Turn::user("Hi"), Turn::assistant("")]
    );
}

#[tokio::test]
async fn client_disconnect_commits_partial_reply() {
    let provider = Arc::new(ScriptedProvider::new("Title"));
    let (fragment_tx, fragment_rx) = mpsc::channel::<RelayResult<String>>(8);
    provider.push_stream(Box::pin(ReceiverStream::new(fragment_rx)));

    let store = Arc::new(MemoryStore::new());
    let relay = relay(provider, store.clone());

    let mut stream = relay
        .stream_chat("scripted", "Hi".into(), &alice(), None)
        .await
        .unwrap();

    fragment_tx.send(delta("Hello ")).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first, StreamToken::Content("Hello ".into()));

    // Client goes away mid-stream.
    drop(stream);
    fragment_tx.send(delta("world")).await.unwrap();
    drop(fragment_tx);

    let store_check = store.clone();
    eventually(move || {
        let store = store_check.clone();
        async move { store.all_turns(1).await.len() == 2 }
    })
    .await;
    assert_eq!(
        store.all_turns(1).await,
        vec![Turn::user("Hi"), Turn::assistant("Hello world")]
    );
}

#[tokio::test]
async fn follow_up_request_carries_prior_turns_in_history() {
    let provider = Arc::new(ScriptedProvider::with_fragments(
        "Title",
        vec![delta("Hello "), delta("world"), done()],
    ));
    provider.push_script(vec![delta("Again"), done()]);
    let store = Arc::new(MemoryStore::new());
    let relay = relay(provider.clone(), store.clone());

    let stream = relay
        .stream_chat("scripted", "Hi".into(), &alice(), None)
        .await
        .unwrap();
    collect(stream).await;

    let store_check = store.clone();
    eventually(move || {
        let store = store_check.clone();
        async move { store.all_turns(1).await.len() == 2 }
    })
    .await;

    let stream = relay
        .stream_chat("scripted", "More".into(), &alice(), Some(1))
        .await
        .unwrap();
    collect(stream).await;

    let histories = provider.histories();
    assert_eq!(histories.len(), 2);
    assert_eq!(histories[0], vec![Turn::user("Hi")]);
    assert_eq!(
        histories[1],
        vec![
            Turn::user("Hi"),
            Turn::assistant("Hello world"),
            Turn::user("More"),
        ]
    );
}

#[tokio::test]
async fn title_is_generated_once_per_session() {
    let provider = Arc::new(ScriptedProvider::with_fragments(
        "Only Title",
        vec![delta("One"), done()],
    ));
    provider.push_script(vec![delta("Two"), done()]);
    let store = Arc::new(MemoryStore::new());
    let relay = relay(provider.clone(), store.clone());

    let stream = relay
        .stream_chat("scripted", "First".into(), &alice(), None)
        .await
        .unwrap();
    collect(stream).await;

    // Wait for the durable title write, which happens after the registry
    // gate, so the second exchange is guaranteed to see the title.
    let store_check = store.clone();
    eventually(move || {
        let store = store_check.clone();
        async move {
            store
                .load_session("user-1", 1)
                .await
                .unwrap()
                .is_some_and(|record| record.title.is_some())
        }
    })
    .await;

    let stream = relay
        .stream_chat("scripted", "Second".into(), &alice(), Some(1))
        .await
        .unwrap();
    collect(stream).await;

    let store_check = store.clone();
    eventually(move || {
        let store = store_check.clone();
        async move { store.all_turns(1).await.len() == 4 }
    })
    .await;

    assert_eq!(provider.title_calls.load(Ordering::SeqCst), 1);
    let record = store.load_session("user-1", 1).await.unwrap().unwrap();
    assert_eq!(record.title.as_deref(), Some("Only Title"));
}

#[tokio::test]
async fn unknown_provider_fails_before_creating_a_session() {
    let provider = Arc::new(ScriptedProvider::new("Title"));
    let store = Arc::new(MemoryStore::new());
    let relay = relay(provider, store.clone());

    let result = relay
        .stream_chat("mistral", "Hi".into(), &alice(), None)
        .await;
    assert!(matches!(result, Err(RelayError::UnknownProvider(name)) if name == "mistral"));
    assert_eq!(store.session_count().await, 0);
}

#[tokio::test]
async fn foreign_session_is_not_found() {
    let provider = Arc::new(ScriptedProvider::new("Title"));
    let store = Arc::new(MemoryStore::new());
    let record = store.create_session("someone-else", "Bob").await.unwrap();
    let relay = relay(provider, store.clone());

    let result = relay
        .stream_chat("scripted", "Hi".into(), &alice(), Some(record.session_id))
        .await;
    assert!(matches!(
        result,
        Err(RelayError::SessionNotFound { session_id, .. }) if session_id == record.session_id
    ));
}

#[tokio::test]
async fn list_sessions_returns_only_the_callers_newest_first() {
    let provider = Arc::new(ScriptedProvider::new("Title"));
    let store = Arc::new(MemoryStore::new());
    store.create_session("someone-else", "Bob").await.unwrap();
    let relay = relay(provider, store.clone());

    let first = relay.create_session(&alice()).await.unwrap();
    let second = relay.create_session(&alice()).await.unwrap();

    let sessions = relay.list_sessions("user-1").await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].session_id, second.session_id);
    assert_eq!(sessions[1].session_id, first.session_id);
    assert!(sessions.iter().all(|record| record.user_id == "user-1"));
}

#[tokio::test]
async fn session_messages_hydrates_from_the_store() {
    let provider = Arc::new(ScriptedProvider::new("Title"));
    let store = Arc::new(MemoryStore::new());
    let record = store.create_session("user-1", "Alice").await.unwrap();
    store
        .append_turns(
            record.session_id,
            &[Turn::user("earlier"), Turn::assistant("reply")],
        )
        .await
        .unwrap();
    let relay = relay(provider, store.clone());

    let messages = relay
        .session_messages("user-1", record.session_id)
        .await
        .unwrap();
    assert_eq!(messages, vec![Turn::user("earlier"), Turn::assistant("reply")]);
}
