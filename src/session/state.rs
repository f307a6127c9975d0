//! Per-turn streaming state

use tokio_util::sync::CancellationToken;

use crate::session::typewriter::Typewriter;
use crate::tool_calls::ToolCallAggregator;

/// Lifecycle of a [`StreamSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Receiving and revealing text
    Streaming,
    /// The turn failed; the error is already on the trailing message
    Failed {
        /// The backend rejected the API key
        unauthorized: bool,
        /// Error text for the caller
        message: String,
    },
    /// The turn was aborted by the user
    Cancelled,
}

/// State of the single in-flight turn
///
/// The consume loop writes the typewriter buffer and the tool-call
/// aggregator; the display driver advances the reveal cursor. Both check
/// [`StreamSession::is_live`] for their generation before every write.
#[derive(Debug)]
pub struct StreamSession {
    generation: u64,
    conversation_id: String,
    /// Current phase
    pub phase: SessionPhase,
    /// Received text and reveal cursor
    pub typewriter: Typewriter,
    /// Tool invocations seen this turn
    pub tool_calls: ToolCallAggregator,
    token: CancellationToken,
}

impl StreamSession {
    /// Creates a streaming session with a started typewriter and empty aggregator
    pub fn new(generation: u64, conversation_id: impl Into<String>, chars_per_tick: usize) -> Self {
        let mut typewriter = Typewriter::new(chars_per_tick);
        typewriter.start();
        Self {
            generation,
            conversation_id: conversation_id.into(),
            phase: SessionPhase::Streaming,
            typewriter,
            tool_calls: ToolCallAggregator::new(),
            token: CancellationToken::new(),
        }
    }

    /// Monotonic id distinguishing this session from earlier ones
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Conversation the turn belongs to
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Token cancelled when the session is aborted
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns true if `generation` names this session and it is still streaming
    pub fn is_live(&self, generation: u64) -> bool {
        self.generation == generation && self.phase == SessionPhase::Streaming
    }

    /// Aborts the session
    ///
    /// After this returns no task of this generation writes any more state.
    pub fn cancel(&mut self) {
        self.phase = SessionPhase::Cancelled;
        self.typewriter.abort();
        self.token.cancel();
    }

    /// Marks the session failed and stops revealing
    pub fn fail(&mut self, unauthorized: bool, message: impl Into<String>) {
        self.phase = SessionPhase::Failed {
            unauthorized,
            message: message.into(),
        };
        self.typewriter.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::typewriter::TickAction;

    #[test]
    fn test_new_session_is_live() {
        let session = StreamSession::new(3, "t1", 2);
        assert!(session.is_live(3));
        assert!(!session.is_live(2));
        assert_eq!(session.conversation_id(), "t1");
        assert!(session.tool_calls.is_empty());
    }

    #[test]
    fn test_cancel_stops_everything() {
        let mut session = StreamSession::new(1, "t1", 2);
        let token = session.token();
        session.typewriter.push("text");

        session.cancel();
        assert!(!session.is_live(1));
        assert!(token.is_cancelled());
        assert_eq!(session.typewriter.tick(), TickAction::Stopped);
    }

    #[test]
    fn test_fail_keeps_token_uncancelled() {
        let mut session = StreamSession::new(1, "t1", 2);
        session.fail(false, "HTTP error! status: 500");
        assert!(!session.is_live(1));
        assert!(!session.token().is_cancelled());
        assert!(matches!(
            session.phase,
            SessionPhase::Failed { unauthorized: false, .. }
        ));
    }
}
