//! Event-stream reassembly for upstream responses
//!
//! Upstream providers deliver completions as server-sent events over a
//! chunked body. Network chunks do not align with event boundaries, and a
//! multi-byte UTF-8 character can be split across two chunks. The decoder
//! buffers both until a complete event block (text up to a blank line) is
//! available, and yields each block as one raw fragment for the
//! transcoder.

use crate::error::RelayResult;
use crate::llm::provider::FragmentStream;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

/// Buffering decoder that turns byte chunks into raw event fragments
#[derive(Debug, Default)]
pub struct FragmentDecoder {
    /// Complete UTF-8 text not yet terminated by a blank line
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence cut off at a chunk boundary
    pending: Vec<u8>,
}

impl FragmentDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning every event block it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let bytes = if self.pending.is_empty() {
            chunk.to_vec()
        } else {
            let mut combined = std::mem::take(&mut self.pending);
            combined.extend_from_slice(chunk);
            combined
        };

        let text = self.decode_utf8(&bytes);
        self.buffer.push_str(&text);
        self.drain_events()
    }

    /// Flush whatever remains after the byte stream ends. An upstream that
    /// closes without a trailing blank line still gets its last event
    /// delivered.
    pub fn finish(&mut self) -> Option<String> {
        self.pending.clear();
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }

    /// Decode as much valid UTF-8 as possible, stashing an incomplete
    /// trailing sequence for the next chunk and replacing truly invalid
    /// bytes.
    fn decode_utf8(&mut self, bytes: &[u8]) -> String {
        let mut out = String::new();
        let mut rest = bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(error) => {
                    let valid = error.valid_up_to();
                    out.push_str(std::str::from_utf8(&rest[..valid]).unwrap_or_default());
                    match error.error_len() {
                        // Invalid sequence in the middle: replace and move on
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + len..];
                        }
                        // Sequence cut off at the end of the chunk
                        None => {
                            self.pending = rest[valid..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Pop complete event blocks (delimited by a blank line) off the buffer
    fn drain_events(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        loop {
            let Some((end, delim_len)) = self.event_boundary() else {
                break;
            };
            let block: String = self.buffer.drain(..end + delim_len).collect();
            let block = block.trim();
            if !block.is_empty() {
                events.push(block.to_string());
            }
        }
        events
    }

    fn event_boundary(&self) -> Option<(usize, usize)> {
        let unix = self.buffer.find("\n\n").map(|pos| (pos, 2));
        let windows = self.buffer.find("\r\n\r\n").map(|pos| (pos, 4));
        match (unix, windows) {
            (Some(u), Some(w)) => Some(if u.0 <= w.0 { u } else { w }),
            (found, None) | (None, found) => found,
        }
    }
}

/// Adapt an HTTP byte stream into a stream of raw event fragments
pub(crate) fn sse_fragment_stream<S, B>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]>,
{
    struct State<S> {
        bytes: Option<Pin<Box<S>>>,
        decoder: FragmentDecoder,
        queue: VecDeque<RelayResult<String>>,
    }

    let state = State {
        bytes: Some(Box::pin(bytes)),
        decoder: FragmentDecoder::new(),
        queue: VecDeque::new(),
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some((item, state));
            }
            let stream = state.bytes.as_mut()?;
            match stream.next().await {
                Some(Ok(chunk)) => {
                    for fragment in state.decoder.feed(chunk.as_ref()) {
                        state.queue.push_back(Ok(fragment));
                    }
                }
                Some(Err(error)) => {
                    state.bytes = None;
                    state.queue.push_back(Err(error.into()));
                }
                None => {
                    state.bytes = None;
                    if let Some(rest) = state.decoder.finish() {
                        state.queue.push_back(Ok(rest));
                    }
                }
            }
        }
    }))
}
