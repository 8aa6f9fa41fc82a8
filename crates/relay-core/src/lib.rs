//! Chat Relay Core Library
//!
//! This crate provides the core functionality for the chat relay,
//! including the conversation cache, session registry, provider
//! gateways, the stream transcoder, and the chat orchestrator.

pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod prompts;
pub mod session;
pub mod storage;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use cache::ConversationCache;
pub use chat::ChatRelay;
pub use config::{ProviderSettings, RelayConfig};
pub use error::{RelayError, RelayResult};
pub use llm::{FragmentStream, LlmProvider, ProviderRegistry};
pub use session::SessionRegistry;
pub use storage::{ConversationStore, MemoryStore};
pub use stream::{StreamToken, TokenStream};
pub use types::{ConversationKey, MessageRole, SessionRecord, Turn, UserContext};
