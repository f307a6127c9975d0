//! Conversation state held by the client
//!
//! The [`ConversationStore`] owns the active conversation's ordered message
//! list, the thread list fetched from the backend, and the reference-page state
//! that follows the latest citations. Streaming code only touches the trailing
//! assistant message, through [`ConversationStore::trailing_assistant_mut`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::citations::{extract_citations, Citation, CitationPolicy};
use crate::tool_calls::ToolInvocation;

/// Greeting shown in a conversation with no history
pub const DEFAULT_GREETING: &str =
    "Hello! I am your Thailand Guide. Ask me anything about traveling in Thailand!";

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The traveller
    User,
    /// The guide agent
    Assistant,
    /// Backend-injected instructions
    System,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message
///
/// Only assistant messages carry citations or tool invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author of the message
    pub role: Role,
    /// Visible text
    pub content: String,
    /// Guide pages cited by an assistant answer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// Tool invocations reported while the answer streamed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            citations: Vec::new(),
            tool_calls: Vec::new(),
        }
    }

    /// Creates a user message
    ///
    /// # Examples
    ///
    /// ```
    /// use travai::conversation::{Message, Role};
    ///
    /// let msg = Message::user("Where is the Grand Palace?");
    /// assert_eq!(msg.role, Role::User);
    /// assert!(msg.citations.is_empty());
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Returns true for assistant messages
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Splits a trailing citation block off an assistant message
    ///
    /// Non-assistant messages are returned unchanged.
    pub fn with_extracted_citations(mut self, policy: CitationPolicy) -> Self {
        if self.is_assistant() {
            let extraction = extract_citations(&self.content, policy);
            self.content = extraction.text;
            self.citations = extraction.citations;
        }
        self
    }
}

/// A persisted thread as listed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// Opaque thread id
    pub id: String,
    /// Display title
    pub title: String,
    /// Creation timestamp as reported by the backend
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
}

/// The conversation currently shown to the user
#[derive(Debug, Clone)]
pub struct Conversation {
    id: String,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
}

impl Conversation {
    /// Creates an empty conversation with the given id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Creates an empty conversation with a fresh client-generated id
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Conversation id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Messages in conversation order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// When this conversation was created or opened locally
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// The guide page currently shown alongside the chat
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceState {
    /// Page to display, if any
    pub page: Option<u32>,
    /// Citations the page was chosen from
    pub citations: Vec<Citation>,
}

/// Client-side owner of conversation state
#[derive(Debug, Clone)]
pub struct ConversationStore {
    active: Conversation,
    threads: Vec<ThreadSummary>,
    reference: ReferenceState,
    greeting: String,
}

impl ConversationStore {
    /// Creates a store holding a fresh conversation that opens with `greeting`
    ///
    /// # Examples
    ///
    /// ```
    /// use travai::conversation::ConversationStore;
    ///
    /// let store = ConversationStore::new("Sawasdee!");
    /// assert_eq!(store.messages().len(), 1);
    /// assert_eq!(store.messages()[0].content, "Sawasdee!");
    /// ```
    pub fn new(greeting: impl Into<String>) -> Self {
        let mut store = Self {
            active: Conversation::generate(),
            threads: Vec::new(),
            reference: ReferenceState::default(),
            greeting: greeting.into(),
        };
        store.greet();
        store
    }

    fn greet(&mut self) {
        self.active.messages = vec![Message::assistant(self.greeting.clone())];
    }

    /// Id of the active conversation
    pub fn active_id(&self) -> &str {
        self.active.id()
    }

    /// The active conversation
    pub fn active(&self) -> &Conversation {
        &self.active
    }

    /// Messages of the active conversation
    pub fn messages(&self) -> &[Message] {
        self.active.messages()
    }

    /// Replaces the active conversation with a new, greeted one
    ///
    /// Returns the new conversation id.
    pub fn start_new(&mut self) -> String {
        self.active = Conversation::generate();
        self.greet();
        self.reference = ReferenceState::default();
        self.active.id.clone()
    }

    /// Makes `id` the active conversation with no messages loaded yet
    pub fn open(&mut self, id: &str) {
        self.active = Conversation::new(id);
        self.reference = ReferenceState::default();
    }

    /// Installs loaded history for `conversation_id`
    ///
    /// Empty history shows the greeting. Returns `false` when the conversation
    /// is no longer active and nothing was changed.
    pub fn replace_history(&mut self, conversation_id: &str, messages: Vec<Message>) -> bool {
        if self.active.id != conversation_id {
            return false;
        }
        if messages.is_empty() {
            self.greet();
        } else {
            self.active.messages = messages;
        }
        true
    }

    /// Appends a message to `conversation_id` if it is active
    pub fn push(&mut self, conversation_id: &str, message: Message) -> bool {
        if self.active.id != conversation_id {
            return false;
        }
        self.active.messages.push(message);
        true
    }

    /// The trailing assistant message of `conversation_id`
    pub fn trailing_assistant(&self, conversation_id: &str) -> Option<&Message> {
        if self.active.id != conversation_id {
            return None;
        }
        self.active.messages.last().filter(|m| m.is_assistant())
    }

    /// Mutable access to the trailing assistant message of `conversation_id`
    ///
    /// Returns `None` if the conversation is not active or its last message
    /// is not from the assistant.
    pub fn trailing_assistant_mut(&mut self, conversation_id: &str) -> Option<&mut Message> {
        if self.active.id != conversation_id {
            return None;
        }
        self.active.messages.last_mut().filter(|m| m.is_assistant())
    }

    /// Threads known to the backend
    pub fn threads(&self) -> &[ThreadSummary] {
        &self.threads
    }

    /// Replaces the thread list
    pub fn set_threads(&mut self, threads: Vec<ThreadSummary>) {
        self.threads = threads;
    }

    /// Returns true if the backend already lists `id`
    pub fn is_persisted(&self, id: &str) -> bool {
        self.threads.iter().any(|t| t.id == id)
    }

    /// Removes `id` from the thread list
    pub fn remove_thread(&mut self, id: &str) -> Option<ThreadSummary> {
        let position = self.threads.iter().position(|t| t.id == id)?;
        Some(self.threads.remove(position))
    }

    /// Current reference page state
    pub fn reference(&self) -> &ReferenceState {
        &self.reference
    }

    /// Shows `citations` and jumps to the first one
    ///
    /// Empty citations leave the reference state unchanged.
    pub fn view_sources(&mut self, citations: &[Citation]) {
        if let Some(first) = citations.first() {
            self.reference = ReferenceState {
                page: Some(first.page),
                citations: citations.to_vec(),
            };
        }
    }

    /// Jumps to a specific page of the guide
    pub fn set_reference_page(&mut self, page: u32) {
        self.reference.page = Some(page);
    }

    /// Hides the reference page
    pub fn clear_reference(&mut self) {
        self.reference = ReferenceState::default();
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_GREETING)
    }
}
