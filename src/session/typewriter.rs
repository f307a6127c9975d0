//! Rate-limited reveal of streamed text
//!
//! Network chunks arrive in bursts. The [`Typewriter`] holds everything
//! received so far and hands out a fixed number of characters per tick, so
//! the reader sees a steady flow. It never reports [`TickAction::Finalize`]
//! while unrevealed text remains, even after the network has finished.

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypewriterState {
    /// Not revealing anything
    #[default]
    Idle,
    /// Revealing buffered text on each tick
    Draining,
}

/// What the driver should do after a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickAction {
    /// Publish these newly revealed characters
    Reveal(String),
    /// Caught up; the network is still open
    Wait,
    /// Everything is revealed and the network is done
    Finalize,
    /// The typewriter is idle
    Stopped,
}

/// Buffered text plus a reveal cursor
///
/// # Examples
///
/// ```
/// use travai::session::{TickAction, Typewriter};
///
/// let mut typewriter = Typewriter::new(2);
/// typewriter.start();
/// typewriter.push("Hello");
/// typewriter.mark_complete();
///
/// assert_eq!(typewriter.tick(), TickAction::Reveal("He".to_string()));
/// assert_eq!(typewriter.tick(), TickAction::Reveal("ll".to_string()));
/// assert_eq!(typewriter.tick(), TickAction::Reveal("o".to_string()));
/// assert_eq!(typewriter.tick(), TickAction::Finalize);
/// ```
#[derive(Debug, Clone)]
pub struct Typewriter {
    state: TypewriterState,
    buffer: String,
    // Byte offset into `buffer`, always on a char boundary.
    revealed: usize,
    network_complete: bool,
    chars_per_tick: usize,
}

impl Typewriter {
    /// Creates an idle typewriter revealing `chars_per_tick` characters per tick
    ///
    /// A rate of zero is treated as one.
    pub fn new(chars_per_tick: usize) -> Self {
        Self {
            state: TypewriterState::Idle,
            buffer: String::new(),
            revealed: 0,
            network_complete: false,
            chars_per_tick: chars_per_tick.max(1),
        }
    }

    /// Clears all state and starts draining
    pub fn start(&mut self) {
        self.buffer.clear();
        self.revealed = 0;
        self.network_complete = false;
        self.state = TypewriterState::Draining;
    }

    /// Appends received text to the buffer
    pub fn push(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Records that no more text will arrive
    pub fn mark_complete(&mut self) {
        self.network_complete = true;
    }

    /// Stops draining and drops buffered text without finalizing
    pub fn abort(&mut self) {
        self.state = TypewriterState::Idle;
        self.buffer.clear();
        self.revealed = 0;
    }

    /// Advances the reveal cursor by one tick
    pub fn tick(&mut self) -> TickAction {
        if self.state == TypewriterState::Idle {
            return TickAction::Stopped;
        }

        if self.revealed < self.buffer.len() {
            let rest = &self.buffer[self.revealed..];
            let end = rest
                .char_indices()
                .nth(self.chars_per_tick)
                .map(|(offset, _)| offset)
                .unwrap_or(rest.len());
            let delta = rest[..end].to_string();
            self.revealed += end;
            return TickAction::Reveal(delta);
        }

        if !self.network_complete {
            return TickAction::Wait;
        }

        self.state = TypewriterState::Idle;
        TickAction::Finalize
    }

    /// Current state
    pub fn state(&self) -> TypewriterState {
        self.state
    }

    /// Everything received so far
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Text revealed so far
    pub fn displayed(&self) -> &str {
        &self.buffer[..self.revealed]
    }

    /// Number of received characters not yet revealed
    pub fn backlog(&self) -> usize {
        self.buffer[self.revealed..].chars().count()
    }

    /// Returns true once the network side has finished
    pub fn is_network_complete(&self) -> bool {
        self.network_complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(typewriter: &mut Typewriter) -> Vec<TickAction> {
        let mut actions = Vec::new();
        loop {
            let action = typewriter.tick();
            let done = matches!(action, TickAction::Finalize | TickAction::Stopped);
            actions.push(action);
            if done {
                return actions;
            }
        }
    }

    #[test]
    fn test_hello_reveals_in_three_ticks() {
        let mut typewriter = Typewriter::new(2);
        typewriter.start();
        typewriter.push("Hello");

        for _ in 0..3 {
            assert!(matches!(typewriter.tick(), TickAction::Reveal(_)));
        }
        assert_eq!(typewriter.displayed(), "Hello");
        assert_eq!(typewriter.tick(), TickAction::Wait);

        typewriter.mark_complete();
        assert_eq!(typewriter.tick(), TickAction::Finalize);
        assert_eq!(typewriter.state(), TypewriterState::Idle);
        assert_eq!(typewriter.tick(), TickAction::Stopped);
    }

    #[test]
    fn test_no_finalize_while_backlog_remains() {
        let mut typewriter = Typewriter::new(3);
        typewriter.start();
        typewriter.push("Wat Arun at dusk");
        typewriter.mark_complete();

        let actions = drain(&mut typewriter);
        let (last, reveals) = actions.split_last().unwrap();
        assert_eq!(last, &TickAction::Finalize);
        assert!(reveals.iter().all(|a| matches!(a, TickAction::Reveal(_))));
        assert_eq!(reveals.len(), 6);
        assert_eq!(typewriter.backlog(), 0);
    }

    #[test]
    fn test_interleaved_pushes_keep_order() {
        let mut typewriter = Typewriter::new(2);
        typewriter.start();
        let mut shown = String::new();

        for chunk in ["It's in ", "", "Bangkok."] {
            typewriter.push(chunk);
            if let TickAction::Reveal(delta) = typewriter.tick() {
                shown.push_str(&delta);
            }
            assert_eq!(shown, typewriter.displayed());
        }
        typewriter.mark_complete();
        for action in drain(&mut typewriter) {
            if let TickAction::Reveal(delta) = action {
                shown.push_str(&delta);
            }
        }
        assert_eq!(shown, "It's in Bangkok.");
    }

    #[test]
    fn test_reveal_respects_char_boundaries() {
        let mut typewriter = Typewriter::new(2);
        typewriter.start();
        typewriter.push("สวัสดี");
        assert_eq!(typewriter.backlog(), 6);

        assert_eq!(typewriter.tick(), TickAction::Reveal("สว".to_string()));
        assert_eq!(typewriter.backlog(), 4);
    }

    #[test]
    fn test_abort_discards_without_finalizing() {
        let mut typewriter = Typewriter::new(2);
        typewriter.start();
        typewriter.push("partial");
        typewriter.mark_complete();
        typewriter.tick();

        typewriter.abort();
        assert_eq!(typewriter.tick(), TickAction::Stopped);
        assert_eq!(typewriter.buffer(), "");
    }

    #[test]
    fn test_start_resets_previous_turn() {
        let mut typewriter = Typewriter::new(10);
        typewriter.start();
        typewriter.push("old");
        typewriter.mark_complete();
        drain(&mut typewriter);

        typewriter.start();
        assert!(!typewriter.is_network_complete());
        assert_eq!(typewriter.displayed(), "");
        assert_eq!(typewriter.tick(), TickAction::Wait);
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        let mut typewriter = Typewriter::new(0);
        typewriter.start();
        typewriter.push("ab");
        assert_eq!(typewriter.tick(), TickAction::Reveal("a".to_string()));
    }
}
