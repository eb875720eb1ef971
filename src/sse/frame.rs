//! Event-stream framing
//!
//! A [`FrameDecoder`] accepts raw body bytes as they arrive and yields the
//! complete frames they close. Frames are separated by a blank line; bytes
//! after the last separator are carried over to the next push, so a frame or
//! a multi-byte character split across reads is reassembled intact.

use serde_json::Value;
use tracing::debug;

/// Prefix of a data frame
pub const DATA_PREFIX: &str = "data:";

/// Payload of the completion sentinel frame (`data: [DONE]`)
pub const DONE_SENTINEL: &str = "[DONE]";

/// Splits a byte stream into trimmed, non-empty frame strings
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next body chunk and return every frame it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        // Carried bytes hold no delimiter; only the last one can start one
        let mut search_from = self.pending.len().saturating_sub(1);
        self.pending
            .extend(bytes.iter().copied().filter(|&b| b != b'\r'));

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(pos) = find_delimiter(&self.pending[search_from..]) {
            let end = search_from + pos;
            if let Some(frame) = clean(&self.pending[start..end]) {
                frames.push(frame);
            }
            start = end + 2;
            search_from = start;
        }
        self.pending.drain(..start);
        frames
    }

    /// Flush whatever remains once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        clean(&rest)
    }
}

fn find_delimiter(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| w == b"\n\n")
}

fn clean(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Meaning of one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A JSON message for the message handler
    Message(Value),
    /// An application error reported by the server
    Error(String),
    /// The completion sentinel
    Done,
    /// Anything else; skipped
    Ignored,
}

impl Frame {
    /// Classify a trimmed frame string.
    pub fn parse(frame: &str) -> Frame {
        let Some(payload) = frame.strip_prefix(DATA_PREFIX) else {
            return Frame::Ignored;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload).trim();
        if payload == DONE_SENTINEL {
            return Frame::Done;
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Skipping non-JSON data frame");
                return Frame::Ignored;
            }
        };

        match value.get("error") {
            Some(Value::Null) | None => Frame::Message(value),
            Some(Value::String(message)) => Frame::Error(message.clone()),
            Some(other) => Frame::Error(other.to_string()),
        }
    }
}
