//! Backend abstraction and implementations
//!
//! This module defines the [`Backend`] trait the chat controller talks to.
//! Concrete implementations live in submodules:
//!
//! - [`http::HttpBackend`] -- the guide server over HTTP, streaming answers
//!   as server-sent events.
//! - [`fake::FakeBackend`] -- in-process fake whose streams are fed from
//!   test code through channels.
//!
//! Stream bodies are returned as raw byte streams; framing into events is
//! done by [`sse::SseDecoder`] so every backend shares one decoder.

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::conversation::{Message, Role, ThreadSummary};
use crate::error::Result;

pub mod fake;
pub mod http;
pub mod sse;

pub use fake::{FakeBackend, FakeStreamHandle};
pub use http::HttpBackend;
pub use sse::{SseDecoder, StreamEvent};

/// Raw response body of a streaming turn
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A message as sent to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Author role
    pub role: Role,
    /// Message text
    pub content: String,
}

/// Body of a streaming turn request
///
/// # Examples
///
/// ```
/// use travai::backend::TurnRequest;
///
/// let request = TurnRequest::new("thread-1", "Where is the Grand Palace?");
/// let json = serde_json::to_value(&request).unwrap();
/// assert_eq!(json["thread_id"], "thread-1");
/// assert_eq!(json["messages"][0]["role"], "user");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    /// New messages for this turn; the server holds prior history
    pub messages: Vec<OutgoingMessage>,
    /// Conversation the turn belongs to
    pub thread_id: String,
}

impl TurnRequest {
    /// Creates a request carrying one user message
    pub fn new(thread_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            messages: vec![OutgoingMessage {
                role: Role::User,
                content: text.into(),
            }],
            thread_id: thread_id.into(),
        }
    }

    /// Text of the first user message, if any
    pub fn user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Response body of a history request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryResponse {
    /// Persisted messages in conversation order
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Operations the chat client needs from the guide server
///
/// Used polymorphically through `Arc<dyn Backend>`.
#[async_trait::async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Starts a turn and returns the streaming response body
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TravaiError::Unauthorized`] when the API key is
    /// missing or rejected, and [`crate::error::TravaiError::Http`] for any
    /// other non-success status.
    async fn open_stream(&self, request: &TurnRequest) -> Result<ByteStream>;

    /// Lists persisted threads
    async fn list_threads(&self) -> Result<Vec<ThreadSummary>>;

    /// Fetches the full message history of a thread
    async fn history(&self, thread_id: &str) -> Result<Vec<Message>>;

    /// Sets a thread's title
    async fn rename_thread(&self, thread_id: &str, title: &str) -> Result<()>;

    /// Deletes a thread and its history
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Replaces the API key used for subsequent requests
    fn set_api_key(&self, _api_key: Option<String>) {}
}
