//! In-process fake backend for tests
//!
//! [`FakeBackend`] implements [`Backend`] with scripted responses. Each call
//! to [`FakeBackend::open_stream`] consumes the next scripted stream in order.
//!
//! A stream scripted with [`FakeBackend::script_stream`] is fed by the test
//! through the returned [`FakeStreamHandle`], which gives exact control over
//! when each chunk arrives:
//!
//! ```text
//! handle.send_content("...") -> channel -> controller consume loop
//! ```
//!
//! # Example
//!
//! ```
//! use travai::backend::{Backend, FakeBackend, TurnRequest};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let backend = FakeBackend::new();
//! let handle = backend.script_stream();
//! handle.send_content("It's in Bangkok.");
//! handle.end();
//! drop(handle);
//!
//! let stream = backend.open_stream(&TurnRequest::new("t1", "Hi")).await.unwrap();
//! assert_eq!(backend.requests()[0].thread_id, "t1");
//!
//! use futures::StreamExt;
//! let chunks: Vec<_> = stream.collect().await;
//! assert_eq!(chunks.len(), 2);
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::backend::{Backend, ByteStream, TurnRequest};
use crate::conversation::{Message, ThreadSummary};
use crate::error::{Result, TravaiError};

type ChunkSender = mpsc::UnboundedSender<Result<Bytes>>;
type ChunkReceiver = mpsc::UnboundedReceiver<Result<Bytes>>;

#[derive(Debug)]
enum ScriptedStream {
    Body(ChunkReceiver),
    Status(u16),
}

#[derive(Debug, Default)]
struct FakeState {
    streams: VecDeque<ScriptedStream>,
    requests: Vec<TurnRequest>,
    threads: Vec<ThreadSummary>,
    histories: HashMap<String, Vec<Message>>,
    renames: Vec<(String, String)>,
    deleted: Vec<String>,
    fail_rename: bool,
    fail_delete: bool,
    api_key: Option<String>,
}

/// Scripted [`Backend`] for tests
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

/// Test-side end of a scripted stream
#[derive(Debug, Clone)]
pub struct FakeStreamHandle {
    tx: ChunkSender,
}

impl FakeStreamHandle {
    /// Sends raw bytes as one network chunk
    pub fn send_raw(&self, chunk: impl Into<Bytes>) {
        let _ = self.tx.send(Ok(chunk.into()));
    }

    /// Sends one `data:` event carrying `payload`
    pub fn send_event(&self, payload: serde_json::Value) {
        self.send_raw(format!("data: {}\n\n", payload));
    }

    /// Sends a text fragment event
    pub fn send_content(&self, text: &str) {
        self.send_event(serde_json::json!({ "content": text }));
    }

    /// Sends a tool-call fragment event
    pub fn send_tool_call(&self, index: i64, name: Option<&str>, args: Option<&str>) {
        self.send_event(serde_json::json!({
            "type": "tool_call",
            "index": index,
            "name": name,
            "args": args,
        }));
    }

    /// Sends the end-of-answer event
    pub fn end(&self) {
        self.send_raw("event: end\ndata: {}\n\n");
    }

    /// Sends a server-side error event
    pub fn send_error_event(&self, message: &str) {
        self.send_raw(format!(
            "event: error\ndata: {}\n\n",
            serde_json::json!({ "error": message })
        ));
    }

    /// Fails the body with a transport error
    pub fn fail(&self, message: &str) {
        let _ = self
            .tx
            .send(Err(TravaiError::Transport(message.to_string()).into()));
    }

    /// Returns true once the consumer dropped the body
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Waits until the consumer drops the body
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

impl FakeBackend {
    /// Creates a backend with nothing scripted
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Scripts the next turn as a body fed through the returned handle
    ///
    /// The body ends when every clone of the handle is dropped.
    pub fn script_stream(&self) -> FakeStreamHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().streams.push_back(ScriptedStream::Body(rx));
        FakeStreamHandle { tx }
    }

    /// Scripts the next turn as a complete body of raw chunks
    pub fn script_chunks<I, S>(&self, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Bytes>,
    {
        let handle = self.script_stream();
        for chunk in chunks {
            handle.send_raw(chunk);
        }
    }

    /// Scripts the next turn to fail with an HTTP status
    pub fn script_status(&self, status: u16) {
        self.lock().streams.push_back(ScriptedStream::Status(status));
    }

    /// Sets the thread list
    pub fn set_threads(&self, threads: Vec<ThreadSummary>) {
        self.lock().threads = threads;
    }

    /// Sets the history returned for `thread_id`
    pub fn set_history(&self, thread_id: &str, messages: Vec<Message>) {
        self.lock().histories.insert(thread_id.to_string(), messages);
    }

    /// Makes rename calls fail
    pub fn fail_rename(&self, fail: bool) {
        self.lock().fail_rename = fail;
    }

    /// Makes delete calls fail
    pub fn fail_delete(&self, fail: bool) {
        self.lock().fail_delete = fail;
    }

    /// Turn requests received so far
    pub fn requests(&self) -> Vec<TurnRequest> {
        self.lock().requests.clone()
    }

    /// `(thread_id, title)` pairs received by rename
    pub fn renames(&self) -> Vec<(String, String)> {
        self.lock().renames.clone()
    }

    /// Thread ids received by delete
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    /// Key most recently installed with [`Backend::set_api_key`]
    pub fn api_key(&self) -> Option<String> {
        self.lock().api_key.clone()
    }
}

fn status_error(status: u16) -> anyhow::Error {
    match status {
        401 | 403 => TravaiError::Unauthorized("Invalid API Key".to_string()).into(),
        404 => TravaiError::NotFound("Not Found".to_string()).into(),
        _ => TravaiError::Http {
            status,
            message: String::new(),
        }
        .into(),
    }
}

#[async_trait::async_trait]
impl Backend for FakeBackend {
    async fn open_stream(&self, request: &TurnRequest) -> Result<ByteStream> {
        let scripted = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            state.streams.pop_front()
        };

        match scripted {
            Some(ScriptedStream::Body(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            Some(ScriptedStream::Status(status)) => Err(status_error(status)),
            None => Err(TravaiError::Transport("no scripted stream".to_string()).into()),
        }
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        Ok(self.lock().threads.clone())
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .lock()
            .histories
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn rename_thread(&self, thread_id: &str, title: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_rename {
            return Err(status_error(500));
        }
        state
            .renames
            .push((thread_id.to_string(), title.to_string()));
        if let Some(thread) = state.threads.iter_mut().find(|t| t.id == thread_id) {
            thread.title = title.to_string();
        } else {
            state.threads.push(ThreadSummary {
                id: thread_id.to_string(),
                title: title.to_string(),
                created_at: None,
            });
        }
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_delete {
            return Err(status_error(500));
        }
        state.deleted.push(thread_id.to_string());
        state.threads.retain(|t| t.id != thread_id);
        state.histories.remove(thread_id);
        Ok(())
    }

    fn set_api_key(&self, api_key: Option<String>) {
        self.lock().api_key = api_key;
    }
}
