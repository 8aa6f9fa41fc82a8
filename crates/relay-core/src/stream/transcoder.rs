//! Fragment-to-token transcoding
//!
//! Converts each opaque upstream fragment into zero or more client-visible
//! tokens while accumulating the full assistant reply for persistence. A
//! fragment that cannot be parsed yields zero tokens; a malformed fragment
//! must never abort the stream.

use crate::stream::token::StreamToken;
use serde_json::Value;
use std::sync::Arc;

/// Sentinel upstream providers send to mark end-of-stream
const DONE_MARKER: &str = "[DONE]";

/// Extracts the incremental text delta from a parsed fragment payload
pub type DeltaExtractor = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Stateful per-request transcoder
pub struct StreamTranscoder {
    extractor: DeltaExtractor,
    reply: String,
    finished: bool,
}

impl StreamTranscoder {
    pub fn new<F>(extractor: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            extractor: Arc::new(extractor),
            reply: String::new(),
            finished: false,
        }
    }

    /// Transcode one raw fragment into client tokens.
    ///
    /// A fragment carrying the end-of-stream sentinel yields the single
    /// `Done` token and terminates the sequence. Otherwise the JSON payload
    /// is located at the first `{` (skipping any event-stream prefix), the
    /// delta extracted and accumulated, then split immediately after each
    /// space so inter-word spacing survives on the wire.
    pub fn transcode(&mut self, fragment: &str) -> Vec<StreamToken> {
        if self.finished {
            return Vec::new();
        }
        if fragment.contains(DONE_MARKER) {
            self.finished = true;
            return vec![StreamToken::Done];
        }

        let Some(start) = fragment.find('{') else {
            return Vec::new();
        };
        let Ok(value) = serde_json::from_str::<Value>(&fragment[start..]) else {
            return Vec::new();
        };
        let Some(delta) = (self.extractor)(&value) else {
            return Vec::new();
        };
        if delta.is_empty() {
            return Vec::new();
        }

        self.reply.push_str(&delta);
        split_after_spaces(&delta)
            .into_iter()
            .map(StreamToken::Content)
            .collect()
    }

    /// Synthesize the `Done` token for an upstream that closed its stream
    /// without an explicit sentinel. Returns `None` if the sequence already
    /// terminated.
    pub fn finish(&mut self) -> Option<StreamToken> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(StreamToken::Done)
    }

    /// Full assistant reply accumulated so far
    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// Consume the transcoder, yielding the accumulated reply
    pub fn into_reply(self) -> String {
        self.reply
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Split text into word chunks, cutting immediately after each space
fn split_after_spaces(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        if ch == ' ' {
            chunks.push(text[start..=i].to_string());
            start = i + 1;
        }
    }
    if start < text.len() {
        chunks.push(text[start..].to_string());
    }
    chunks
}
