//! Streaming turn management
//!
//! A turn is driven by two tasks that share one [`StreamSession`]:
//!
//! - the consume loop reads the response body, decodes events, appends text
//!   to the typewriter buffer and folds tool-call fragments;
//! - the display driver ticks the [`Typewriter`] on a fixed interval and
//!   publishes revealed text, then finalizes the message once everything has
//!   been revealed.
//!
//! [`StreamController`] owns the session slot and guarantees at most one
//! session exists at any time. Results reach the UI as [`ChatEvent`]s and the
//! caller of [`StreamController::start`] gets a [`TurnOutcome`].

use crate::conversation::Message;
use crate::tool_calls::ToolInvocation;

pub mod controller;
pub mod state;
pub mod typewriter;

pub use controller::{derive_title, ControllerSettings, StreamController, TurnHandle};
pub use state::{SessionPhase, StreamSession};
pub use typewriter::{TickAction, Typewriter, TypewriterState};

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The answer was fully revealed and finalized
    Completed(Message),
    /// The user aborted the turn
    Cancelled,
    /// The backend or transport failed
    Failed(String),
    /// The backend rejected the API key
    Unauthorized,
}

impl TurnOutcome {
    /// Returns true for [`TurnOutcome::Completed`]
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed(_))
    }
}

/// State changes published to the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Characters appended to the trailing assistant message
    Revealed {
        /// Conversation the text belongs to
        conversation_id: String,
        /// Newly revealed characters
        delta: String,
    },
    /// The trailing message's tool invocations changed
    ToolCallsUpdated {
        /// Conversation the calls belong to
        conversation_id: String,
        /// Current records in first-seen order
        tool_calls: Vec<ToolInvocation>,
    },
    /// The trailing message was finalized with its citations
    Finalized {
        /// Conversation the message belongs to
        conversation_id: String,
        /// The final message
        message: Message,
        /// Reference page after finalization
        reference_page: Option<u32>,
    },
    /// The turn failed; the error text replaced the trailing message
    Failed {
        /// Conversation the turn belongs to
        conversation_id: String,
        /// Error text
        message: String,
    },
    /// The API key must be re-entered
    AuthorizationRequired {
        /// Conversation the turn belongs to
        conversation_id: String,
    },
    /// History for a selected conversation is in the store
    HistoryLoaded {
        /// Selected conversation
        conversation_id: String,
    },
    /// The thread list in the store was refreshed
    ThreadsUpdated,
}
