//! Server-sent event decoding for streamed answers
//!
//! The server writes one event per block, blocks separated by a blank line:
//!
//! ```text
//! data: {"content": "It's in "}
//!
//! data: {"type": "tool_call", "index": 0, "name": "search", "args": "{\"q\""}
//!
//! event: end
//! data: {}
//! ```
//!
//! [`SseDecoder`] buffers raw bytes across network chunks, so a block (or a
//! multi-byte character) split between chunks is decoded once it is complete.

use serde::Deserialize;
use serde_json::Value;

use crate::tool_calls::ToolCallFragment;

/// Event block delimiter
const BLOCK_DELIMITER: &[u8] = b"\n\n";

/// A decoded stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Answer text fragment
    Content(String),
    /// Partial tool invocation
    ToolCall(ToolCallFragment),
    /// Empty payload; keeps the connection alive
    Heartbeat,
    /// The server finished the answer
    End,
    /// The server failed while producing the answer
    Error(String),
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    content: Option<Value>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    index: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: String,
}

/// Incremental decoder from response bytes to [`StreamEvent`]s
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Creates an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk and returns every event it completed
    ///
    /// # Examples
    ///
    /// ```
    /// use travai::backend::{SseDecoder, StreamEvent};
    ///
    /// let mut decoder = SseDecoder::new();
    /// assert!(decoder.push(b"data: {\"content\": \"Sawa").is_empty());
    /// let events = decoder.push(b"sdee\"}\n\n");
    /// assert_eq!(events, vec![StreamEvent::Content("Sawasdee".to_string())]);
    /// ```
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = find_delimiter(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..pos + BLOCK_DELIMITER.len()).collect();
            let text = String::from_utf8_lossy(&block[..pos]);
            if let Some(event) = decode_block(&text) {
                events.push(event);
            }
        }
        events
    }

    /// Decodes whatever remains once the body has ended
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest);
        if text.trim().is_empty() {
            return Vec::new();
        }
        decode_block(&text).into_iter().collect()
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(BLOCK_DELIMITER.len())
        .position(|w| w == BLOCK_DELIMITER)
}

/// Decodes one event block
///
/// Returns `None` for blocks without a `data:` field and for payloads that
/// fail to parse; neither aborts the stream.
pub fn decode_block(block: &str) -> Option<StreamEvent> {
    let mut data_lines: Vec<&str> = Vec::new();
    let mut event_type: Option<&str> = None;

    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        } else if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim());
        }
        // Comments (`:`) and unknown fields are ignored.
    }

    if data_lines.is_empty() {
        tracing::debug!("Ignoring event block without data: {:?}", block);
        return None;
    }
    let data = data_lines.join("\n");

    match event_type {
        Some("end") => return Some(StreamEvent::End),
        Some("error") => {
            let message = serde_json::from_str::<ErrorPayload>(&data)
                .map(|p| p.error)
                .unwrap_or(data);
            return Some(StreamEvent::Error(message));
        }
        _ => {}
    }

    let value: Value = match serde_json::from_str(&data) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Skipping malformed stream event: {}", e);
            return None;
        }
    };
    if value.as_object().is_some_and(|o| o.is_empty()) {
        return Some(StreamEvent::Heartbeat);
    }

    let payload: EventPayload = match serde_json::from_value(value) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Skipping stream event with unexpected shape: {}", e);
            return None;
        }
    };

    if payload.kind.as_deref() == Some("tool_call") {
        return Some(StreamEvent::ToolCall(ToolCallFragment {
            index: payload.index,
            name: payload.name,
            args: payload.args.and_then(args_text),
        }));
    }

    match payload.content {
        Some(Value::String(text)) if !text.is_empty() => Some(StreamEvent::Content(text)),
        Some(other) => {
            tracing::debug!("Ignoring non-text content: {}", other);
            None
        }
        None => None,
    }
}

fn args_text(args: Value) -> Option<String> {
    match args {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}
