//! Stream session controller
//!
//! [`StreamController`] is the single entry point for everything that mutates
//! conversation state: starting and cancelling turns, selecting, creating,
//! renaming and deleting conversations.
//!
//! Locks are always taken in the same order, the session slot first and the
//! conversation store second.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, SseDecoder, StreamEvent, TurnRequest};
use crate::citations::{extract_citations, Citation, CitationPolicy};
use crate::config::Config;
use crate::conversation::{
    ConversationStore, Message, ReferenceState, Role, ThreadSummary, DEFAULT_GREETING,
};
use crate::error::{Result, TravaiError};
use crate::session::state::{SessionPhase, StreamSession};
use crate::session::typewriter::TickAction;
use crate::session::{ChatEvent, TurnOutcome};

/// Text shown in place of the answer when the API key is rejected
pub const AUTHORIZATION_NOTICE: &str =
    "Authorization required. Please provide a valid API key to continue.";

/// Tunables for the controller
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Interval between reveal ticks
    pub tick_interval: Duration,
    /// Characters revealed per tick
    pub chars_per_tick: usize,
    /// Characters of the first message used as a thread title
    pub title_max_chars: usize,
    /// Which cited pages are kept
    pub citation_policy: CitationPolicy,
    /// Greeting for conversations with no history
    pub greeting: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10),
            chars_per_tick: 2,
            title_max_chars: 30,
            citation_policy: CitationPolicy::default(),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

impl ControllerSettings {
    /// Builds settings from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick_interval: config.stream.tick_interval(),
            chars_per_tick: config.stream.chars_per_tick,
            title_max_chars: config.stream.title_max_chars,
            citation_policy: config.citations.policy,
            greeting: config.chat.greeting.clone(),
        }
    }
}

/// Derives a thread title from the first user message
///
/// # Examples
///
/// ```
/// use travai::session::derive_title;
///
/// assert_eq!(derive_title("Best street food?", 30), "Best street food?");
/// assert_eq!(
///     derive_title("What should I pack for a week in Chiang Mai?", 30),
///     "What should I pack for a week ..."
/// );
/// ```
pub fn derive_title(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let mut title: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        title.push_str("...");
    }
    title
}

/// Handle to a running turn
#[derive(Debug)]
pub struct TurnHandle {
    conversation_id: String,
    task: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    /// Conversation the turn belongs to
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Returns true once the turn has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the turn to end
    pub async fn wait(self) -> TurnOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Turn task for {} failed: {}", self.conversation_id, e);
                TurnOutcome::Failed(format!("Turn task failed: {}", e))
            }
        }
    }
}

#[derive(Debug)]
struct Shared {
    backend: Arc<dyn Backend>,
    store: RwLock<ConversationStore>,
    session: Mutex<Option<StreamSession>>,
    events: mpsc::UnboundedSender<ChatEvent>,
    settings: ControllerSettings,
    generation: AtomicU64,
}

/// Owner of the conversation store and the single in-flight turn
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use travai::backend::FakeBackend;
/// use travai::session::{ControllerSettings, StreamController, TurnOutcome};
///
/// # #[tokio::main]
/// # async fn main() {
/// let backend = FakeBackend::new();
/// let stream = backend.script_stream();
/// stream.send_content("Take the BTS Skytrain.");
/// stream.end();
///
/// let (controller, _events) =
///     StreamController::new(Arc::new(backend.clone()), ControllerSettings::default());
/// let conversation = controller.active_id().await;
/// let turn = controller.start(&conversation, "How do I get around Bangkok?").await.unwrap();
///
/// match turn.wait().await {
///     TurnOutcome::Completed(message) => assert_eq!(message.content, "Take the BTS Skytrain."),
///     other => panic!("unexpected outcome: {:?}", other),
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StreamController {
    shared: Arc<Shared>,
}

impl StreamController {
    /// Creates a controller and the receiver for its [`ChatEvent`]s
    pub fn new(
        backend: Arc<dyn Backend>,
        settings: ControllerSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let store = ConversationStore::new(settings.greeting.clone());
        let controller = Self {
            shared: Arc::new(Shared {
                backend,
                store: RwLock::new(store),
                session: Mutex::new(None),
                events,
                settings,
                generation: AtomicU64::new(0),
            }),
        };
        (controller, rx)
    }

    /// Starts a turn in `conversation_id`
    ///
    /// Any turn already in flight is cancelled first. The user message and an
    /// empty assistant placeholder are appended before the request is sent.
    ///
    /// # Errors
    ///
    /// Returns [`TravaiError::NotFound`] if `conversation_id` is not the
    /// active conversation. Backend failures are reported through the
    /// returned handle, not here.
    pub async fn start(&self, conversation_id: &str, text: &str) -> Result<TurnHandle> {
        let shared = &self.shared;
        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut slot = shared.session.lock().await;
        if let Some(mut previous) = slot.take() {
            tracing::debug!(
                "Cancelling turn {} for a new submission",
                previous.generation()
            );
            previous.cancel();
        }

        let needs_title = {
            let mut store = shared.store.write().await;
            if store.active_id() != conversation_id {
                return Err(TravaiError::NotFound(format!(
                    "Conversation {} is not open",
                    conversation_id
                ))
                .into());
            }
            let first_turn = !store.messages().iter().any(|m| m.role == Role::User);
            let needs_title = first_turn && !store.is_persisted(conversation_id);
            store.push(conversation_id, Message::user(text));
            store.push(conversation_id, Message::assistant(""));
            needs_title
        };

        let session =
            StreamSession::new(generation, conversation_id, shared.settings.chars_per_tick);
        let token = session.token();
        *slot = Some(session);
        drop(slot);

        tracing::info!("Starting turn {} in {}", generation, conversation_id);

        let title = needs_title.then(|| derive_title(text, shared.settings.title_max_chars));
        let request = TurnRequest::new(conversation_id, text);
        tokio::spawn(consume(
            Arc::clone(shared),
            generation,
            token.clone(),
            request,
            title,
        ));
        let task = tokio::spawn(drive(
            Arc::clone(shared),
            generation,
            token,
            conversation_id.to_string(),
        ));

        Ok(TurnHandle {
            conversation_id: conversation_id.to_string(),
            task,
        })
    }

    /// Cancels the turn in flight, if any
    ///
    /// The partially revealed answer stays on the trailing message. Returns
    /// true if a streaming turn was aborted.
    pub async fn cancel(&self) -> bool {
        let mut slot = self.shared.session.lock().await;
        match slot.take() {
            Some(mut session) => {
                let was_streaming = session.phase == SessionPhase::Streaming;
                session.cancel();
                tracing::debug!("Cancelled turn {}", session.generation());
                was_streaming
            }
            None => false,
        }
    }

    /// Returns true while a turn is streaming
    pub async fn is_streaming(&self) -> bool {
        self.shared
            .session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.phase == SessionPhase::Streaming)
    }

    /// Opens `conversation_id` and loads its history
    ///
    /// Assistant messages have their citation blocks extracted. When the most
    /// recent assistant message cites pages, the first one becomes the
    /// reference page. History arriving after another conversation was
    /// selected is discarded.
    pub async fn select_conversation(&self, conversation_id: &str) -> Result<()> {
        self.cancel().await;
        self.shared.store.write().await.open(conversation_id);

        let history = match self.shared.backend.history(conversation_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!("Failed to load history for {}: {}", conversation_id, e);
                self.shared
                    .store
                    .write()
                    .await
                    .replace_history(conversation_id, Vec::new());
                return Err(e);
            }
        };

        let policy = self.shared.settings.citation_policy;
        let messages: Vec<Message> = history
            .into_iter()
            .map(|m| m.with_extracted_citations(policy))
            .collect();
        let latest_citations: Vec<Citation> = messages
            .iter()
            .rev()
            .find(|m| m.is_assistant())
            .map(|m| m.citations.clone())
            .unwrap_or_default();

        {
            let mut store = self.shared.store.write().await;
            if !store.replace_history(conversation_id, messages) {
                tracing::debug!("Discarding history for {}; no longer active", conversation_id);
                return Ok(());
            }
            store.view_sources(&latest_citations);
        }

        self.shared.emit(ChatEvent::HistoryLoaded {
            conversation_id: conversation_id.to_string(),
        });
        Ok(())
    }

    /// Starts a fresh conversation and returns its id
    pub async fn new_conversation(&self) -> String {
        self.cancel().await;
        let id = self.shared.store.write().await.start_new();
        tracing::debug!("Started new conversation {}", id);
        id
    }

    /// Deletes a conversation
    ///
    /// The thread is removed locally first. If it was active, the first
    /// remaining thread is opened, or a new conversation is started. A failed
    /// remote delete refreshes the thread list and returns the error.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let was_active = self.shared.store.read().await.active_id() == conversation_id;
        if was_active {
            self.cancel().await;
        }

        let next = {
            let mut store = self.shared.store.write().await;
            store.remove_thread(conversation_id);
            store.threads().first().map(|t| t.id.clone())
        };
        self.shared.emit(ChatEvent::ThreadsUpdated);

        if was_active {
            match next {
                Some(id) => {
                    if let Err(e) = self.select_conversation(&id).await {
                        tracing::warn!("Failed to open {} after delete: {}", id, e);
                    }
                }
                None => {
                    self.new_conversation().await;
                }
            }
        }

        if let Err(e) = self.shared.backend.delete_thread(conversation_id).await {
            tracing::warn!("Failed to delete thread {}: {}", conversation_id, e);
            if let Err(refresh) = self.refresh_threads().await {
                tracing::warn!("Failed to refresh threads: {}", refresh);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Renames a conversation and refreshes the thread list
    pub async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(anyhow::anyhow!("Title must not be empty"));
        }
        self.shared
            .backend
            .rename_thread(conversation_id, title)
            .await?;
        self.refresh_threads().await?;
        Ok(())
    }

    /// Reloads the thread list from the backend
    pub async fn refresh_threads(&self) -> Result<Vec<ThreadSummary>> {
        self.shared.refresh_threads().await
    }

    /// Replaces the API key used for subsequent requests
    pub fn set_api_key(&self, api_key: Option<String>) {
        self.shared.backend.set_api_key(api_key);
    }

    /// Id of the active conversation
    pub async fn active_id(&self) -> String {
        self.shared.store.read().await.active_id().to_string()
    }

    /// Messages of the active conversation
    pub async fn messages(&self) -> Vec<Message> {
        self.shared.store.read().await.messages().to_vec()
    }

    /// Threads known to the backend
    pub async fn threads(&self) -> Vec<ThreadSummary> {
        self.shared.store.read().await.threads().to_vec()
    }

    /// Current reference page state
    pub async fn reference(&self) -> ReferenceState {
        self.shared.store.read().await.reference().clone()
    }

    /// Jumps to a page of the guide
    pub async fn set_reference_page(&self, page: u32) {
        self.shared.store.write().await.set_reference_page(page);
    }

    /// Shows the citations of a message and jumps to the first one
    pub async fn view_sources(&self, citations: &[Citation]) {
        self.shared.store.write().await.view_sources(citations);
    }
}

impl Shared {
    fn emit(&self, event: ChatEvent) {
        // The UI may have gone away; state stays consistent without it.
        let _ = self.events.send(event);
    }

    async fn refresh_threads(&self) -> Result<Vec<ThreadSummary>> {
        let threads = self.backend.list_threads().await?;
        self.store.write().await.set_threads(threads.clone());
        self.emit(ChatEvent::ThreadsUpdated);
        Ok(threads)
    }

    /// Applies one decoded event to the live session
    async fn apply_event(
        &self,
        generation: u64,
        conversation_id: &str,
        event: StreamEvent,
    ) -> ControlFlow<()> {
        let mut slot = self.session.lock().await;
        let Some(session) = slot.as_mut().filter(|s| s.is_live(generation)) else {
            return ControlFlow::Break(());
        };

        match event {
            StreamEvent::Content(text) => {
                tracing::trace!("Received {} bytes of content", text.len());
                session.typewriter.push(&text);
            }
            StreamEvent::ToolCall(fragment) => {
                if session.tool_calls.apply(&fragment) {
                    let tool_calls = session.tool_calls.snapshot();
                    if let Some(trailing) = self
                        .store
                        .write()
                        .await
                        .trailing_assistant_mut(conversation_id)
                    {
                        trailing.tool_calls = tool_calls.clone();
                    }
                    self.emit(ChatEvent::ToolCallsUpdated {
                        conversation_id: conversation_id.to_string(),
                        tool_calls,
                    });
                }
            }
            StreamEvent::Heartbeat => {}
            StreamEvent::End => {
                tracing::debug!("Network complete for turn {}", generation);
                session.typewriter.mark_complete();
                return ControlFlow::Break(());
            }
            StreamEvent::Error(message) => {
                let error = anyhow::Error::from(TravaiError::Stream(message));
                self.record_failure(session, conversation_id, &error).await;
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn fail_turn(&self, generation: u64, conversation_id: &str, error: &anyhow::Error) {
        let mut slot = self.session.lock().await;
        match slot.as_mut().filter(|s| s.is_live(generation)) {
            Some(session) => self.record_failure(session, conversation_id, error).await,
            None => tracing::debug!("Ignoring failure from stale turn {}: {}", generation, error),
        }
    }

    /// Replaces the trailing message with the error and stops revealing
    async fn record_failure(
        &self,
        session: &mut StreamSession,
        conversation_id: &str,
        error: &anyhow::Error,
    ) {
        let unauthorized = TravaiError::is_unauthorized_error(error);
        let message = error.to_string();
        session.fail(unauthorized, message.clone());

        let content = if unauthorized {
            AUTHORIZATION_NOTICE.to_string()
        } else {
            format!("Error: {}", message)
        };
        if let Some(trailing) = self
            .store
            .write()
            .await
            .trailing_assistant_mut(conversation_id)
        {
            trailing.content = content;
            trailing.citations.clear();
            trailing.tool_calls.clear();
        }

        if unauthorized {
            tracing::warn!("Backend rejected the API key: {}", message);
            self.emit(ChatEvent::AuthorizationRequired {
                conversation_id: conversation_id.to_string(),
            });
        } else {
            tracing::warn!("Turn in {} failed: {}", conversation_id, message);
            self.emit(ChatEvent::Failed {
                conversation_id: conversation_id.to_string(),
                message,
            });
        }
    }

    /// Advances the typewriter once; returns the outcome when the turn is over
    async fn tick(&self, generation: u64, conversation_id: &str) -> Option<TurnOutcome> {
        let mut slot = self.session.lock().await;
        let session = match slot.as_mut() {
            Some(session) if session.generation() == generation => session,
            _ => return Some(TurnOutcome::Cancelled),
        };

        let finished = match &session.phase {
            SessionPhase::Streaming => None,
            SessionPhase::Failed {
                unauthorized: true, ..
            } => Some(TurnOutcome::Unauthorized),
            SessionPhase::Failed { message, .. } => Some(TurnOutcome::Failed(message.clone())),
            SessionPhase::Cancelled => Some(TurnOutcome::Cancelled),
        };
        if let Some(outcome) = finished {
            *slot = None;
            return Some(outcome);
        }

        match session.typewriter.tick() {
            TickAction::Reveal(delta) => {
                if let Some(trailing) = self
                    .store
                    .write()
                    .await
                    .trailing_assistant_mut(conversation_id)
                {
                    trailing.content.push_str(&delta);
                }
                self.emit(ChatEvent::Revealed {
                    conversation_id: conversation_id.to_string(),
                    delta,
                });
                None
            }
            TickAction::Wait => None,
            TickAction::Finalize => {
                let extraction =
                    extract_citations(session.typewriter.buffer(), self.settings.citation_policy);
                let message = Message {
                    role: Role::Assistant,
                    content: extraction.text,
                    citations: extraction.citations,
                    tool_calls: session.tool_calls.snapshot(),
                };

                let reference_page = {
                    let mut store = self.store.write().await;
                    if let Some(trailing) = store.trailing_assistant_mut(conversation_id) {
                        *trailing = message.clone();
                    }
                    store.view_sources(&message.citations);
                    store.reference().page
                };
                *slot = None;

                tracing::info!(
                    "Turn {} finalized with {} citation(s)",
                    generation,
                    message.citations.len()
                );
                self.emit(ChatEvent::Finalized {
                    conversation_id: conversation_id.to_string(),
                    message: message.clone(),
                    reference_page,
                });
                Some(TurnOutcome::Completed(message))
            }
            TickAction::Stopped => {
                *slot = None;
                Some(TurnOutcome::Cancelled)
            }
        }
    }
}

/// Reads the response body into the session
async fn consume(
    shared: Arc<Shared>,
    generation: u64,
    token: CancellationToken,
    request: TurnRequest,
    title: Option<String>,
) {
    let conversation_id = request.thread_id.clone();

    let opened = tokio::select! {
        biased;

        _ = token.cancelled() => return,
        opened = shared.backend.open_stream(&request) => opened,
    };
    let mut body = match opened {
        Ok(body) => body,
        Err(e) => {
            shared.fail_turn(generation, &conversation_id, &e).await;
            return;
        }
    };

    if let Some(title) = title {
        tokio::spawn(update_title(
            Arc::clone(&shared),
            conversation_id.clone(),
            title,
        ));
    }

    let mut decoder = SseDecoder::new();
    loop {
        let chunk = tokio::select! {
            biased;

            _ = token.cancelled() => {
                tracing::debug!("Turn {} aborted; dropping response body", generation);
                return;
            }
            chunk = body.next() => chunk,
        };

        let events = match chunk {
            Some(Ok(bytes)) => decoder.push(&bytes),
            Some(Err(e)) => {
                shared.fail_turn(generation, &conversation_id, &e).await;
                return;
            }
            None => {
                let mut events = decoder.finish();
                events.push(StreamEvent::End);
                events
            }
        };

        for event in events {
            if shared
                .apply_event(generation, &conversation_id, event)
                .await
                .is_break()
            {
                return;
            }
        }
    }
}

/// Ticks the typewriter until the turn ends
async fn drive(
    shared: Arc<Shared>,
    generation: u64,
    token: CancellationToken,
    conversation_id: String,
) -> TurnOutcome {
    // A zero period panics in tokio.
    let period = shared.settings.tick_interval.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break TurnOutcome::Cancelled,
            _ = interval.tick() => {
                if let Some(outcome) = shared.tick(generation, &conversation_id).await {
                    break outcome;
                }
            }
        }
    };

    // Make sure the consume loop has let go of the body.
    token.cancel();
    outcome
}

/// Titles a new thread; failures never affect the turn
async fn update_title(shared: Arc<Shared>, conversation_id: String, title: String) {
    if let Err(e) = shared.backend.rename_thread(&conversation_id, &title).await {
        tracing::warn!("Failed to set title for {}: {}", conversation_id, e);
        return;
    }
    if let Err(e) = shared.refresh_threads().await {
        tracing::warn!("Failed to refresh threads after titling: {}", e);
    }
}
