//! In-memory conversation state

pub mod conversation;

pub use conversation::ConversationCache;
