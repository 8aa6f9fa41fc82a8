//! Client-visible token wire shape

use serde_json::json;

/// One unit delivered to the client: a word chunk or the end sentinel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamToken {
    /// Incremental content, spacing preserved verbatim
    Content(String),
    /// End-of-stream sentinel, emitted exactly once
    Done,
}

impl StreamToken {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Wire encoding: `{"content": "..."}` or `{"done": true}`
    pub fn to_wire(&self) -> String {
        match self {
            Self::Content(text) => json!({ "content": text }).to_string(),
            Self::Done => json!({ "done": true }).to_string(),
        }
    }
}
